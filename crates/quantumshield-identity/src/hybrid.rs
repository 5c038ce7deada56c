//! Hybrid encryption to a recipient's public KEM key
//!
//! Each package encapsulates a fresh shared secret, derives a key with a
//! fresh salt, and seals the payload with ChaCha20-Poly1305 under a fresh
//! nonce. The KEM ciphertext and salt are bound as associated data. When a
//! sender is named, the canonical bytes of the unsigned package are signed
//! and the proof travels with the package.

use chrono::{DateTime, Utc};
use quantumshield_crypto::codec::{hex_array, hex_bytes};
use quantumshield_crypto::{
    aead, kdf, CryptoError, KemCiphertext, PublicKey, Salt, SealedPayload, KDF_CONTEXT,
    NONCE_SIZE, TAG_SIZE,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{IdentityError, IdentityResult};
use crate::identity::IdentityId;
use crate::manager::IdentityManager;
use crate::proof::SignatureProof;

/// Self-contained hybrid ciphertext
///
/// Decryption needs only the recipient's private KEM key and these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedPackage {
    pub kem_ciphertext: KemCiphertext,
    #[serde(with = "hex_bytes")]
    pub ciphertext: Vec<u8>,
    #[serde(with = "hex_array")]
    pub nonce: [u8; NONCE_SIZE],
    #[serde(with = "hex_array")]
    pub tag: [u8; TAG_SIZE],
    #[serde(with = "hex_array")]
    pub salt: Salt,
    pub created_at: DateTime<Utc>,
    /// Sender signature over [`EncryptedPackage::signing_bytes`]
    pub sender: Option<SignatureProof>,
}

/// Borrowed view of every package field except the sender proof
#[derive(Serialize)]
struct UnsignedPackage<'a> {
    kem_ciphertext: &'a KemCiphertext,
    ciphertext: &'a [u8],
    nonce: &'a [u8; NONCE_SIZE],
    tag: &'a [u8; TAG_SIZE],
    salt: &'a Salt,
    created_at: &'a DateTime<Utc>,
}

impl EncryptedPackage {
    /// Canonical bytes of the package minus its sender proof
    pub fn signing_bytes(&self) -> IdentityResult<Vec<u8>> {
        let view = UnsignedPackage {
            kem_ciphertext: &self.kem_ciphertext,
            ciphertext: &self.ciphertext,
            nonce: &self.nonce,
            tag: &self.tag,
            salt: &self.salt,
            created_at: &self.created_at,
        };
        Ok(postcard::to_allocvec(&view)?)
    }

    pub fn is_signed(&self) -> bool {
        self.sender.is_some()
    }

    fn associated_data(&self) -> Vec<u8> {
        associated_data(&self.kem_ciphertext, &self.salt)
    }

    pub fn to_json(&self) -> IdentityResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> IdentityResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Compact binary encoding
    pub fn to_bytes(&self) -> IdentityResult<Vec<u8>> {
        Ok(postcard::to_allocvec(self)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> IdentityResult<Self> {
        Ok(postcard::from_bytes(bytes)?)
    }
}

fn associated_data(kem_ciphertext: &KemCiphertext, salt: &Salt) -> Vec<u8> {
    let mut aad = Vec::with_capacity(kem_ciphertext.len() + salt.len());
    aad.extend_from_slice(kem_ciphertext.as_bytes());
    aad.extend_from_slice(salt);
    aad
}

/// Hybrid encryption over identities of one manager
pub struct HybridCipher<'a> {
    manager: &'a IdentityManager,
}

impl<'a> HybridCipher<'a> {
    pub fn new(manager: &'a IdentityManager) -> Self {
        Self { manager }
    }

    /// Encrypt `plaintext` to `recipient_kem_key`, optionally signed by `signer`
    pub fn encrypt(
        &self,
        recipient_kem_key: &PublicKey,
        plaintext: &[u8],
        signer: Option<IdentityId>,
    ) -> IdentityResult<EncryptedPackage> {
        if let Some(signer) = signer {
            if !self.manager.contains(signer) {
                return Err(IdentityError::not_found(signer));
            }
        }

        let (kem_ciphertext, shared_secret) =
            self.manager.provider().encapsulate(recipient_kem_key)?;
        let derived = kdf::derive(shared_secret.as_bytes(), KDF_CONTEXT, None)?;
        let sealed = aead::seal(
            &derived.key,
            plaintext,
            &associated_data(&kem_ciphertext, &derived.salt),
        )?;

        let mut package = EncryptedPackage {
            kem_ciphertext,
            ciphertext: sealed.ciphertext,
            nonce: sealed.nonce,
            tag: sealed.tag,
            salt: derived.salt,
            created_at: self.manager.clock().now_utc(),
            sender: None,
        };
        if let Some(signer) = signer {
            let proof = self.manager.prove(signer, &package.signing_bytes()?)?;
            package.sender = Some(proof);
        }

        debug!(
            kem = %recipient_kem_key.algorithm(),
            size = plaintext.len(),
            signed = package.is_signed(),
            "package encrypted"
        );
        Ok(package)
    }

    /// Decrypt a package addressed to `recipient`
    ///
    /// An attached sender proof is checked first; a proof that does not
    /// verify fails with [`IdentityError::TamperedPackage`] before any
    /// decapsulation. A rejected tag fails with
    /// [`CryptoError::AuthenticationFailed`] and yields no plaintext.
    pub fn decrypt(
        &self,
        recipient: IdentityId,
        package: &EncryptedPackage,
    ) -> IdentityResult<Vec<u8>> {
        if !self.manager.contains(recipient) {
            return Err(IdentityError::not_found(recipient));
        }

        if let Some(proof) = &package.sender {
            if !self.check_proof(proof, package)? {
                warn!(recipient = %recipient, "package sender proof rejected");
                return Err(IdentityError::TamperedPackage(
                    "sender signature does not cover this package".to_string(),
                ));
            }
        }

        let shared_secret = self
            .manager
            .decapsulate(recipient, &package.kem_ciphertext)?;
        let derived = kdf::derive(shared_secret.as_bytes(), KDF_CONTEXT, Some(&package.salt))?;

        let sealed = SealedPayload {
            nonce: package.nonce,
            ciphertext: package.ciphertext.clone(),
            tag: package.tag,
        };
        let plaintext = aead::open(&derived.key, &sealed, &package.associated_data()).map_err(|e| {
            warn!(recipient = %recipient, error = %e, "package authentication failed");
            e
        })?;

        debug!(recipient = %recipient, size = plaintext.len(), "package decrypted");
        Ok(plaintext)
    }

    /// Whether the package carries a valid proof made by `expected_key`
    ///
    /// Unsigned packages return `false`.
    pub fn verify_sender(
        &self,
        package: &EncryptedPackage,
        expected_key: &PublicKey,
    ) -> IdentityResult<bool> {
        match &package.sender {
            Some(proof) if &proof.public_key == expected_key => self.check_proof(proof, package),
            _ => Ok(false),
        }
    }

    fn check_proof(
        &self,
        proof: &SignatureProof,
        package: &EncryptedPackage,
    ) -> IdentityResult<bool> {
        let bytes = package.signing_bytes()?;
        match proof.verify(self.manager.provider(), &bytes) {
            Ok(valid) => Ok(valid),
            Err(IdentityError::Crypto(CryptoError::InvalidParameters(_))) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
