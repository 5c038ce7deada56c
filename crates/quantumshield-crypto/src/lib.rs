//! # QuantumShield Crypto
//!
//! Post-quantum primitives for QuantumShield identities and channels.
//!
//! Wraps the NIST ML-DSA (Dilithium) and ML-KEM (Kyber) parameter sets behind
//! a pluggable provider, and supplies the key derivation and authenticated
//! symmetric encryption used by channels and hybrid packages.
//!
//! ## Features
//!
//! - ML-DSA-44/65/87 signatures and ML-KEM-512/768/1024 encapsulation
//! - Local or externally custodied signing keys
//! - HKDF-SHA256 key derivation with per-call salts
//! - ChaCha20-Poly1305 authenticated encryption with detached tags
//! - One hex codec for every serialized byte field
//!
//! ## Key Types
//!
//! - [`PrimitiveProvider`]: The six primitive operations, per named level
//! - [`PqcryptoProvider`]: Default provider backed by the `pqcrypto` crates
//! - [`ExternalSigner`]: Signing-key custody outside the process
//! - [`Keypair`] / [`PrivateKey`]: Keys tagged `Local` or `External`
//! - [`Signature`]: Signature bytes with payload hash and timestamp
//!
//! ## Example
//!
//! ```rust,ignore
//! use quantumshield_crypto::{kdf, Algorithm, PqcryptoProvider, PrimitiveProvider};
//!
//! let provider = PqcryptoProvider::new();
//!
//! // Sign and verify
//! let signing = provider.generate_signing_keypair(Algorithm::MlDsa65)?;
//! let sig = provider.sign(signing.private_key(), b"ping")?;
//! assert!(provider.verify(signing.public_key(), b"ping", &sig)?);
//!
//! // Encapsulate a secret and derive a symmetric key from it
//! let kem = provider.generate_kem_keypair(Algorithm::MlKem768)?;
//! let (ciphertext, secret) = provider.encapsulate(kem.public_key())?;
//! let derived = kdf::derive(secret.as_bytes(), kdf::KDF_CONTEXT, None)?;
//!
//! let recovered = provider.decapsulate(kem.private_key(), &ciphertext)?;
//! let again = kdf::derive(recovered.as_bytes(), kdf::KDF_CONTEXT, Some(&derived.salt))?;
//! assert_eq!(derived.key, again.key);
//! ```

pub mod aead;
pub mod algorithm;
pub mod codec;
pub mod error;
pub mod external;
pub mod kdf;
pub mod keys;
pub mod provider;

// Re-exports
pub use aead::{SealedPayload, NONCE_SIZE, TAG_SIZE};
pub use algorithm::{Algorithm, AlgorithmKind, AlgorithmParams};
pub use error::{CryptoError, CryptoResult};
pub use external::{ExternalSigner, InMemoryVault};
pub use kdf::{DerivedKey, Salt, SymmetricKey, DERIVED_KEY_SIZE, KDF_CONTEXT, SALT_SIZE};
pub use keys::{
    payload_hash, KemCiphertext, KeyHandle, Keypair, PrivateKey, PublicKey, SecureBytes,
    SharedSecret, Signature, PAYLOAD_HASH_SIZE,
};
pub use provider::{parameter_set, PqcryptoProvider, PrimitiveProvider};
