//! Store configuration, normally read from the process environment.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use zeroize::Zeroizing;

use crate::error::StoreError;

/// Secret key material (hex, base64 or passphrase).
pub const SECRET_KEY_VAR: &str = "SECRET_KEY";
/// Optional override of the store file location.
pub const STORE_FILE_VAR: &str = "SECURE_STORE_FILE";
/// Optional corrupt-file policy, `fail` or `reset`.
pub const ON_CORRUPT_VAR: &str = "SECURE_STORE_ON_CORRUPT";

/// Store file used when no path is configured, relative to the working directory.
pub const DEFAULT_STORE_FILE: &str = ".secure/users.json";

/// What to do when the store file exists but cannot be parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptPolicy {
    /// Surface `StoreError::CorruptStore` and leave the file untouched.
    #[default]
    Fail,
    /// Move the unreadable file aside and start from an empty document.
    Reset,
}

impl FromStr for CorruptPolicy {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(CorruptPolicy::Fail),
            "reset" => Ok(CorruptPolicy::Reset),
            other => Err(StoreError::Configuration(format!(
                "invalid corrupt-store policy '{other}', expected 'fail' or 'reset'"
            ))),
        }
    }
}

impl fmt::Display for CorruptPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorruptPolicy::Fail => f.write_str("fail"),
            CorruptPolicy::Reset => f.write_str("reset"),
        }
    }
}

/// Everything a [`CredentialStore`](crate::CredentialStore) needs.
///
/// The secret is optional here: operations that never decrypt (listing,
/// deleting, clearing) work without it, and the ones that do fail with a
/// configuration error before touching disk.
#[derive(Clone)]
pub struct StoreConfig {
    path: PathBuf,
    secret: Option<Zeroizing<String>>,
    on_corrupt: CorruptPolicy,
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreConfig")
            .field("path", &self.path)
            .field("secret", &self.secret.as_ref().map(|_| "<redacted>"))
            .field("on_corrupt", &self.on_corrupt)
            .finish()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new(PathBuf::from(DEFAULT_STORE_FILE))
    }
}

impl StoreConfig {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            secret: None,
            on_corrupt: CorruptPolicy::default(),
        }
    }

    pub fn with_path(mut self, path: PathBuf) -> Self {
        self.path = path;
        self
    }

    pub fn with_secret(mut self, secret: Zeroizing<String>) -> Self {
        self.secret = Some(secret);
        self
    }

    pub fn with_corrupt_policy(mut self, policy: CorruptPolicy) -> Self {
        self.on_corrupt = policy;
        self
    }

    /// Reads configuration from the process environment.
    pub fn from_env() -> Result<Self, StoreError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds configuration from an arbitrary variable lookup.
    ///
    /// Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, StoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.is_empty());

        let mut config = match get(STORE_FILE_VAR) {
            Some(path) => Self::new(PathBuf::from(path)),
            None => Self::default(),
        };

        if let Some(secret) = get(SECRET_KEY_VAR) {
            config = config.with_secret(Zeroizing::new(secret));
        }

        if let Some(policy) = get(ON_CORRUPT_VAR) {
            config = config.with_corrupt_policy(policy.parse()?);
        }

        Ok(config)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    pub fn secret(&self) -> Option<&str> {
        self.secret.as_ref().map(|s| s.as_str())
    }

    pub fn corrupt_policy(&self) -> CorruptPolicy {
        self.on_corrupt
    }
}
