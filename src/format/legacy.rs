//! Migration of the pre-versioning layout: a bare JSON array of records.

use serde_json::Value;
use tracing::info;

use super::{FormatError, v1};
use crate::store::{CredentialRecord, StoreDocument};

/// Converts a legacy array document into the current schema.
///
/// # Errors
///
/// Returns an error if an element is not a valid record or usernames repeat.
pub fn migrate(value: Value) -> Result<StoreDocument, FormatError> {
    let records: Vec<CredentialRecord> = serde_json::from_value(value)
        .map_err(|e| FormatError::Malformed(format!("invalid legacy record list: {e}")))?;

    let document = StoreDocument::from_records(records);
    v1::check_unique_usernames(&document)?;

    info!(
        records = document.len(),
        "migrated legacy array store to schema v{}",
        document.version()
    );
    Ok(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::CURRENT_VERSION;

    #[test]
    fn legacy_records_keep_their_order() {
        let value = serde_json::json!([
            {
                "username": "first",
                "ct": "AQID",
                "iv": "BAQEBAQEBAQEBAQE",
                "tag": "BQUFBQUFBQUFBQUFBQUFBQ==",
                "createdAt": "2024-05-01T10:00:00.000Z"
            },
            {
                "username": "second",
                "ct": "AQID",
                "iv": "BAQEBAQEBAQEBAQE",
                "tag": "BQUFBQUFBQUFBQUFBQUFBQ==",
                "createdAt": "2024-05-02T10:00:00.000Z"
            }
        ]);

        let doc = migrate(value).unwrap();
        assert_eq!(doc.version(), CURRENT_VERSION);
        assert_eq!(doc.len(), 2);
        assert_eq!(doc.latest().unwrap().username(), "second");
    }

    #[test]
    fn non_record_elements_are_malformed() {
        let value = serde_json::json!([1, 2, 3]);
        assert!(matches!(migrate(value), Err(FormatError::Malformed(_))));
    }
}
