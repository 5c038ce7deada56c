//! Key derivation from KEM shared secrets
//!
//! HKDF-SHA256 extract-then-expand. The salt keys the extract step and is
//! generated fresh when the caller does not supply one; the context string
//! is the expand info and must be agreed by both parties.

use std::fmt;

use hkdf::Hkdf;
use rand::RngCore;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};

/// Protocol context shared by channels and hybrid packages
pub const KDF_CONTEXT: &[u8] = b"QuantumShield-v1";

/// Size of derived symmetric keys (256 bits)
pub const DERIVED_KEY_SIZE: usize = 32;

/// Size of derivation salts
pub const SALT_SIZE: usize = 32;

/// Derivation salt
pub type Salt = [u8; SALT_SIZE];

/// A derived 256-bit symmetric key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct SymmetricKey([u8; DERIVED_KEY_SIZE]);

impl SymmetricKey {
    pub fn from_bytes(bytes: [u8; DERIVED_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; DERIVED_KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SymmetricKey([REDACTED])")
    }
}

/// A derived key together with the salt it was derived with
#[derive(Debug, Clone)]
pub struct DerivedKey {
    pub key: SymmetricKey,
    pub salt: Salt,
}

/// Generate a fresh random salt
pub fn generate_salt() -> Salt {
    let mut salt = [0u8; SALT_SIZE];
    rand::rng().fill_bytes(&mut salt);
    salt
}

/// Derive a symmetric key from `secret`
///
/// Identical `(secret, context, salt)` always yields the identical key, so a
/// recipient holding the transmitted salt reconstructs the sender's key.
pub fn derive(secret: &[u8], context: &[u8], salt: Option<&Salt>) -> CryptoResult<DerivedKey> {
    if secret.is_empty() {
        return Err(CryptoError::KeyDerivation("empty input secret".to_string()));
    }
    let salt = match salt {
        Some(salt) => *salt,
        None => generate_salt(),
    };

    let hk = Hkdf::<Sha256>::new(Some(&salt), secret);
    let mut okm = [0u8; DERIVED_KEY_SIZE];
    hk.expand(context, &mut okm)
        .map_err(|e| CryptoError::KeyDerivation(format!("expand failed: {}", e)))?;

    let key = SymmetricKey(okm);
    okm.zeroize();
    Ok(DerivedKey { key, salt })
}
