use base64::{
    Engine,
    engine::general_purpose::{STANDARD, STANDARD_NO_PAD},
};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use super::{DerivedKey, KEY_LEN};
use crate::error::{Result, StoreError};

const HEX_KEY_CHARS: usize = KEY_LEN * 2;

/// Derive the store key from operator-supplied secret material.
///
/// Accepted encodings, checked in order:
/// 1. 64 hex characters, decoded directly
/// 2. base64 (43 or 44 characters) that decodes to exactly 32 bytes
/// 3. any other UTF-8 text, hashed with SHA-256
///
/// Empty material is a configuration error; there is no default key.
pub fn derive_key(material: &str) -> Result<DerivedKey> {
    if material.is_empty() {
        return Err(StoreError::Configuration(
            "SECRET_KEY is missing or empty; provide 32 bytes as hex, base64 or a passphrase"
                .to_string(),
        ));
    }

    if let Some(key) = decode_hex(material) {
        return Ok(key);
    }

    if let Some(key) = decode_base64(material) {
        return Ok(key);
    }

    let digest = Sha256::digest(material.as_bytes());
    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&digest);
    Ok(DerivedKey::from_bytes(key))
}

fn decode_hex(material: &str) -> Option<DerivedKey> {
    if material.len() != HEX_KEY_CHARS || !material.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }

    let mut key = [0u8; KEY_LEN];
    hex::decode_to_slice(material, &mut key).ok()?;
    Some(DerivedKey::from_bytes(key))
}

fn decode_base64(material: &str) -> Option<DerivedKey> {
    if !(43..=44).contains(&material.len())
        || !material
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'+' | b'/' | b'='))
    {
        return None;
    }

    let decoded = Zeroizing::new(
        STANDARD
            .decode(material)
            .or_else(|_| STANDARD_NO_PAD.decode(material))
            .ok()?,
    );
    let key: [u8; KEY_LEN] = decoded.as_slice().try_into().ok()?;
    Some(DerivedKey::from_bytes(key))
}
