//! Cryptographic primitives for the credential store.
//!
//! Provides key derivation from operator-supplied secret material and
//! AES-256-GCM sealing of individual passwords.

pub mod aead;
pub mod kdf;

use std::fmt;

use zeroize::Zeroize;

pub use aead::{SealedSecret, decrypt, encrypt};
pub use kdf::derive_key;

/// Length of the encryption key (32 bytes / 256 bits).
pub const KEY_LEN: usize = 32;
/// Length of the nonce (12 bytes / 96 bits for AES-GCM).
pub const NONCE_LEN: usize = 12;
/// Length of the authentication tag (16 bytes).
pub const TAG_LEN: usize = 16;

/// A 256-bit symmetric key, held only in memory.
///
/// The bytes are wiped when the key is dropped.
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl Drop for DerivedKey {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(<redacted>)")
    }
}

impl PartialEq for DerivedKey {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for DerivedKey {}
