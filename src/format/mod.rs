//! On-disk schema of the credential store.
//!
//! The file is one JSON document. The current shape is a versioned object
//! (see [`v1`]); a bare array of records written by older tooling is
//! recognised by its JSON type and migrated explicitly (see [`legacy`]).

use serde_json::Value;
use thiserror::Error;

use crate::store::StoreDocument;

pub mod b64;
pub mod legacy;
pub mod v1;

/// Latest schema version
pub const CURRENT_VERSION: u32 = v1::VERSION_V1;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("{0}")]
    Malformed(String),
    #[error("unsupported schema version {0}")]
    UnsupportedVersion(u64),
}

/// A parsed document plus whether it had to be migrated from an older shape.
#[derive(Debug)]
pub struct Parsed {
    pub document: StoreDocument,
    pub migrated: bool,
}

/// Parses store file contents, dispatching on the document shape and version.
///
/// # Errors
///
/// Returns an error if:
/// - The content is not JSON, or not an object or array
/// - The object has no integer `version`
/// - The version is unknown
/// - The records do not match the schema
pub fn parse(data: &[u8]) -> Result<Parsed, FormatError> {
    let value: Value = serde_json::from_slice(data)
        .map_err(|e| FormatError::Malformed(format!("invalid JSON: {e}")))?;

    let version = match &value {
        Value::Array(_) => {
            return Ok(Parsed {
                document: legacy::migrate(value)?,
                migrated: true,
            });
        }
        Value::Object(map) => match map.get("version") {
            Some(v) => v.as_u64().ok_or_else(|| {
                FormatError::Malformed("schema version is not a non-negative integer".to_string())
            })?,
            None => return Err(FormatError::Malformed("missing schema version".to_string())),
        },
        _ => {
            return Err(FormatError::Malformed(
                "expected a JSON object or array".to_string(),
            ));
        }
    };

    match version {
        1 => Ok(Parsed {
            document: v1::parse(value)?,
            migrated: false,
        }),
        other => Err(FormatError::UnsupportedVersion(other)),
    }
}

/// Serializes a document in its own schema version.
pub fn serialize(document: &StoreDocument) -> Result<Vec<u8>, serde_json::Error> {
    match document.version() {
        v1::VERSION_V1 => v1::serialize(document),
        other => Err(serde::ser::Error::custom(format!(
            "unsupported schema version {other}"
        ))),
    }
}
