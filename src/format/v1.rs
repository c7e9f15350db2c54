//! Schema version 1.
//!
//! ```text
//! {
//!   "version": 1,
//!   "records": [
//!     { "username": "...", "ciphertext": "<b64>", "nonce": "<b64, 12 bytes>",
//!       "authTag": "<b64, 16 bytes>", "createdAt": "<RFC 3339>" }
//!   ]
//! }
//! ```
//!
//! Files written by the upstream toolkit name the collection `users` and the
//! record fields `ct`, `iv` and `tag`; those names are accepted on read.

use std::collections::HashSet;

use serde_json::Value;

use super::FormatError;
use crate::store::StoreDocument;

/// Schema version 1.
pub const VERSION_V1: u32 = 1;

/// Parses a v1 document from an already-decoded JSON value.
///
/// # Errors
///
/// Returns an error if a record is missing fields, a binary field is not
/// valid base64 of the right length, or a username appears twice.
pub fn parse(value: Value) -> Result<StoreDocument, FormatError> {
    let document: StoreDocument = serde_json::from_value(value)
        .map_err(|e| FormatError::Malformed(format!("invalid v1 document: {e}")))?;
    check_unique_usernames(&document)?;
    Ok(document)
}

/// Serializes a v1 document as pretty-printed JSON.
pub fn serialize(document: &StoreDocument) -> Result<Vec<u8>, serde_json::Error> {
    serde_json::to_vec_pretty(document)
}

pub(super) fn check_unique_usernames(document: &StoreDocument) -> Result<(), FormatError> {
    let mut seen = HashSet::new();
    for record in document.records() {
        if !seen.insert(record.username()) {
            return Err(FormatError::Malformed(format!(
                "duplicate username '{}'",
                record.username()
            )));
        }
    }
    Ok(())
}
