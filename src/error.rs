use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("credential store '{}' is corrupt: {reason}", .path.display())]
    CorruptStore { path: PathBuf, reason: String },

    #[error("credential store '{}' has unsupported schema version {version}", .path.display())]
    UnsupportedVersion { path: PathBuf, version: u64 },

    #[error("authentication failed: wrong key or tampered record")]
    Authentication,

    #[error("no credentials saved in the store")]
    EmptyStore,

    #[error("credential not found: {0}")]
    NotFound(String),

    #[error("I/O error on '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize store document: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("OS random generator unavailable")]
    Random,

    #[error("encryption failed")]
    Encryption,
}

impl StoreError {
    pub(crate) fn io(path: &Path) -> impl FnOnce(io::Error) -> StoreError + '_ {
        move |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}
