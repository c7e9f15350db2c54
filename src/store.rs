use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::crypto::{NONCE_LEN, SealedSecret, TAG_LEN};
use crate::format::{CURRENT_VERSION, b64};

/// The whole store file as held in memory between a read and a write.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct StoreDocument {
    version: u32,
    #[serde(alias = "users")]
    records: Vec<CredentialRecord>,
}

/// One saved credential. The password only exists here in sealed form.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    username: String,
    #[serde(with = "b64::bytes", alias = "ct")]
    ciphertext: Vec<u8>,
    #[serde(with = "b64::fixed", alias = "iv")]
    nonce: [u8; NONCE_LEN],
    #[serde(with = "b64::fixed", alias = "tag")]
    auth_tag: [u8; TAG_LEN],
    created_at: DateTime<Utc>,
}

impl CredentialRecord {
    pub(crate) fn new(username: String, sealed: SealedSecret) -> Self {
        Self {
            username,
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce,
            auth_tag: sealed.tag,
            created_at: Utc::now(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Ciphertext, nonce and tag bundled for a single decrypt call.
    pub(crate) fn sealed(&self) -> SealedSecret {
        SealedSecret {
            ciphertext: self.ciphertext.clone(),
            nonce: self.nonce,
            tag: self.auth_tag,
        }
    }
}

impl Default for StoreDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl StoreDocument {
    pub fn new() -> Self {
        StoreDocument {
            version: CURRENT_VERSION,
            records: Vec::new(),
        }
    }

    pub(crate) fn from_records(records: Vec<CredentialRecord>) -> Self {
        StoreDocument {
            version: CURRENT_VERSION,
            records,
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Replace the record with the same username in place, or append.
    pub fn upsert(&mut self, record: CredentialRecord) {
        match self
            .records
            .iter_mut()
            .find(|r| r.username == record.username)
        {
            Some(existing) => *existing = record,
            None => self.records.push(record),
        }
    }

    pub fn find(&self, username: &str) -> Option<&CredentialRecord> {
        self.records.iter().find(|r| r.username == username)
    }

    pub fn latest(&self) -> Option<&CredentialRecord> {
        self.records.last()
    }

    pub fn latest_with_prefix(&self, prefix: &str) -> Option<&CredentialRecord> {
        self.records
            .iter()
            .rev()
            .find(|r| r.username.starts_with(prefix))
    }

    /// Returns `true` if a record was removed.
    pub fn remove(&mut self, username: &str) -> bool {
        let before = self.records.len();
        self.records.retain(|r| r.username != username);
        self.records.len() != before
    }

    pub fn records(&self) -> impl Iterator<Item = &CredentialRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
