//! Authenticated symmetric encryption
//!
//! ChaCha20-Poly1305 with a fresh random 96-bit nonce per call and a
//! detached 128-bit tag. A rejected tag never yields partial plaintext.

use chacha20poly1305::aead::{AeadInPlace, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce, Tag};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

use crate::codec::{hex_array, hex_bytes};
use crate::error::{CryptoError, CryptoResult};
use crate::kdf::SymmetricKey;

/// Nonce size (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Authentication tag size (128 bits)
pub const TAG_SIZE: usize = 16;

/// Output of [`seal`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedPayload {
    #[serde(with = "hex_array")]
    pub nonce: [u8; NONCE_SIZE],
    #[serde(with = "hex_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "hex_array")]
    pub tag: [u8; TAG_SIZE],
}

/// Generate a fresh random nonce
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    rand::rng().fill_bytes(&mut nonce);
    nonce
}

fn cipher(key: &SymmetricKey) -> ChaCha20Poly1305 {
    ChaCha20Poly1305::new(Key::from_slice(key.as_bytes()))
}

/// Encrypt `plaintext` under `key`, authenticating `aad` alongside it
pub fn seal(key: &SymmetricKey, plaintext: &[u8], aad: &[u8]) -> CryptoResult<SealedPayload> {
    let nonce = generate_nonce();
    let mut buffer = plaintext.to_vec();
    let tag = cipher(key)
        .encrypt_in_place_detached(Nonce::from_slice(&nonce), aad, &mut buffer)
        .map_err(|_| {
            buffer.zeroize();
            CryptoError::EncryptionFailed("ChaCha20-Poly1305 encryption failed".to_string())
        })?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(&tag);
    Ok(SealedPayload {
        nonce,
        ciphertext: buffer,
        tag: tag_bytes,
    })
}

/// Decrypt and authenticate a sealed payload
///
/// Any change to the nonce, ciphertext, tag or `aad` fails with
/// [`CryptoError::AuthenticationFailed`].
pub fn open(key: &SymmetricKey, sealed: &SealedPayload, aad: &[u8]) -> CryptoResult<Vec<u8>> {
    let mut buffer = sealed.ciphertext.clone();
    let result = cipher(key).decrypt_in_place_detached(
        Nonce::from_slice(&sealed.nonce),
        aad,
        &mut buffer,
        Tag::from_slice(&sealed.tag),
    );
    match result {
        Ok(()) => Ok(buffer),
        Err(_) => {
            buffer.zeroize();
            Err(CryptoError::AuthenticationFailed)
        }
    }
}
