//! Encrypted local store for generated account credentials.
//!
//! Usernames are kept in clear text; passwords are sealed with AES-256-GCM
//! under a key derived from `SECRET_KEY`. Every call reads the whole store
//! file and every mutation rewrites it atomically.
//!
//! There is no locking: concurrent writers (threads or processes) racing on
//! the same file can lose updates.

mod config;
mod crypto;
mod error;
mod format;
mod storage;
mod store;

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use tracing::debug;
use zeroize::Zeroizing;

pub use crate::config::{
    CorruptPolicy, DEFAULT_STORE_FILE, ON_CORRUPT_VAR, SECRET_KEY_VAR, STORE_FILE_VAR, StoreConfig,
};
pub use crate::crypto::{DerivedKey, SealedSecret, derive_key};
pub use crate::error::{Result, StoreError};
pub use crate::storage::Storage;
pub use crate::store::{CredentialRecord, StoreDocument};

/// A decrypted username/password pair.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub password: Zeroizing<String>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &mask(&self.password, 0))
            .finish()
    }
}

/// Listing entry; never carries the password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialSummary {
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// Handle on one credential store file.
///
/// Construct one per configuration and pass it to whoever needs it. The key
/// is derived on first use and cached for the lifetime of the handle; the
/// document itself is never cached.
pub struct CredentialStore {
    storage: Storage,
    secret: Option<Zeroizing<String>>,
    on_corrupt: CorruptPolicy,
    key: OnceLock<DerivedKey>,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("path", self.storage.path())
            .field("on_corrupt", &self.on_corrupt)
            .finish_non_exhaustive()
    }
}

impl CredentialStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            storage: Storage::new(config.path().clone()),
            secret: config.secret().map(|s| Zeroizing::new(s.to_string())),
            on_corrupt: config.corrupt_policy(),
            key: OnceLock::new(),
        }
    }

    /// Resolved path of the store file.
    pub fn path(&self) -> &PathBuf {
        self.storage.path()
    }

    /// Encrypts `password` and saves it under `username`, replacing any
    /// existing record for that username.
    pub fn save(&self, username: &str, password: &str) -> Result<()> {
        let key = self.key()?;
        let sealed = crypto::encrypt(key, password.as_bytes())?;

        let mut document = self.read()?;
        document.upsert(CredentialRecord::new(username.to_string(), sealed));
        self.storage.write_document(&document)?;

        debug!(%username, records = document.len(), "saved credential");
        Ok(())
    }

    /// Returns the most recently added credential.
    pub fn load_latest(&self) -> Result<Credential> {
        let key = self.key()?;
        let document = self.read()?;
        let record = document.latest().ok_or(StoreError::EmptyStore)?;
        self.open(key, record)
    }

    /// Returns the credential saved under exactly `username`.
    pub fn load_by_username(&self, username: &str) -> Result<Credential> {
        let key = self.key()?;
        let document = self.read()?;
        let record = document
            .find(username)
            .ok_or_else(|| StoreError::NotFound(format!("user '{username}'")))?;
        self.open(key, record)
    }

    /// Returns the most recently added credential whose username starts
    /// with `prefix`.
    pub fn load_latest_by_prefix(&self, prefix: &str) -> Result<Credential> {
        let key = self.key()?;
        let document = self.read()?;
        let record = document
            .latest_with_prefix(prefix)
            .ok_or_else(|| StoreError::NotFound(format!("users with prefix '{prefix}'")))?;
        self.open(key, record)
    }

    /// Usernames and creation times, oldest first.
    pub fn list(&self) -> Result<Vec<CredentialSummary>> {
        let document = self.read()?;
        Ok(document
            .records()
            .map(|r| CredentialSummary {
                username: r.username().to_string(),
                created_at: r.created_at(),
            })
            .collect())
    }

    /// Removes the record for `username`, if any.
    ///
    /// Returns `true` if a record was removed. The file is rewritten either way.
    pub fn delete_by_username(&self, username: &str) -> Result<bool> {
        let mut document = self.read()?;
        let removed = document.remove(username);
        self.storage.write_document(&document)?;

        debug!(%username, removed, "deleted credential");
        Ok(removed)
    }

    /// Discards every record.
    pub fn clear(&self) -> Result<()> {
        self.storage.write_document(&StoreDocument::new())?;
        debug!(path = %self.storage.path().display(), "cleared credential store");
        Ok(())
    }

    fn read(&self) -> Result<StoreDocument> {
        self.storage.read_document(self.on_corrupt)
    }

    fn key(&self) -> Result<&DerivedKey> {
        if let Some(key) = self.key.get() {
            return Ok(key);
        }
        let material = self.secret.as_ref().map(|s| s.as_str()).unwrap_or_default();
        let key = derive_key(material)?;
        Ok(self.key.get_or_init(|| key))
    }

    fn open(&self, key: &DerivedKey, record: &CredentialRecord) -> Result<Credential> {
        let plaintext = crypto::decrypt(key, &record.sealed())?;
        let password = std::str::from_utf8(&plaintext).map_err(|_| StoreError::CorruptStore {
            path: self.storage.path().clone(),
            reason: format!("password of '{}' is not valid UTF-8", record.username()),
        })?;

        Ok(Credential {
            username: record.username().to_string(),
            password: Zeroizing::new(password.to_string()),
        })
    }
}

/// Masks all but the last `keep` characters of `s` with `*`.
///
/// Strings of at most `keep` characters are masked entirely.
pub fn mask(s: &str, keep: usize) -> String {
    let len = s.chars().count();
    if len <= keep {
        return "*".repeat(len);
    }
    let tail: String = s.chars().skip(len - keep).collect();
    format!("{}{}", "*".repeat(len - keep), tail)
}
