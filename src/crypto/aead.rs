use aes_gcm::{
    Aes256Gcm, Key, Nonce, Tag,
    aead::{AeadInPlace, KeyInit},
};
use getrandom::fill;
use zeroize::Zeroizing;

use super::{DerivedKey, NONCE_LEN, TAG_LEN};
use crate::error::{Result, StoreError};

/// Output of one AES-256-GCM call: ciphertext, the nonce it was sealed
/// under, and the detached authentication tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SealedSecret {
    pub ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_LEN],
    pub tag: [u8; TAG_LEN],
}

/// Fill buffer with cryptographically secure random bytes
pub(crate) fn secure_random(buf: &mut [u8]) -> Result<()> {
    fill(buf).map_err(|_| StoreError::Random)
}

/// Encrypt plaintext under a fresh random nonce
pub fn encrypt(key: &DerivedKey, plaintext: &[u8]) -> Result<SealedSecret> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut nonce = [0u8; NONCE_LEN];
    secure_random(&mut nonce)?;

    let mut buffer = plaintext.to_vec();
    let tag = cipher
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), b"", &mut buffer)
        .map_err(|_| StoreError::Encryption)?;

    let mut tag_bytes = [0u8; TAG_LEN];
    tag_bytes.copy_from_slice(&tag);

    Ok(SealedSecret {
        ciphertext: buffer,
        nonce,
        tag: tag_bytes,
    })
}

/// Verify and decrypt a sealed secret.
///
/// The tag is checked before any plaintext leaves this function; on failure
/// the working buffer is wiped and only the error is returned.
pub fn decrypt(key: &DerivedKey, sealed: &SealedSecret) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let mut buffer = Zeroizing::new(sealed.ciphertext.clone());
    cipher
        .decrypt_in_place_detached(
            Nonce::from_slice(&sealed.nonce),
            b"",
            &mut *buffer,
            Tag::from_slice(&sealed.tag),
        )
        .map_err(|_| StoreError::Authentication)?;

    Ok(buffer)
}
