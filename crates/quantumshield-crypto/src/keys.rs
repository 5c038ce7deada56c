//! Key, signature and ciphertext types
//!
//! Private key material is either held locally in [`SecureBytes`] (zeroized
//! on drop) or lives behind an opaque [`KeyHandle`] owned by an external
//! signer. The two cases are an explicit tagged variant of [`PrivateKey`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::algorithm::Algorithm;
use crate::codec::{self, hex_array, hex_bytes};
use crate::error::{CryptoError, CryptoResult};

/// Size of the payload hash recorded in a [`Signature`]
pub const PAYLOAD_HASH_SIZE: usize = 32;

/// Secure byte container that zeroizes on drop
///
/// Use this for storing sensitive key material that should not
/// persist in memory after use. Serializes as hex.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SecureBytes(Vec<u8>);

impl SecureBytes {
    /// Create new secure bytes
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Copy a slice into secure storage
    pub fn from_slice(bytes: &[u8]) -> Self {
        Self(bytes.to_vec())
    }

    /// Get the inner bytes (borrowed)
    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    /// Get the length
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for SecureBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl AsRef<[u8]> for SecureBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for SecureBytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecureBytes([REDACTED; {}])", self.0.len())
    }
}

impl Serialize for SecureBytes {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        hex_bytes::serialize(&self.0, serializer)
    }
}

impl<'de> Deserialize<'de> for SecureBytes {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        hex_bytes::deserialize(deserializer).map(Self)
    }
}

/// Opaque reference to a private key held by an external signer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyHandle(String);

impl KeyHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Public half of a signing or KEM keypair. Can be freely shared.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicKey {
    algorithm: Algorithm,
    #[serde(with = "hex_bytes")]
    bytes: Vec<u8>,
}

impl PublicKey {
    pub fn new(algorithm: Algorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    /// Parse from a hex string
    pub fn from_hex(algorithm: Algorithm, hex: &str) -> CryptoResult<Self> {
        Ok(Self::new(algorithm, codec::decode(hex)?))
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_hex(&self) -> String {
        codec::encode(&self.bytes)
    }

    /// Get a short identifier (first 8 bytes hex encoded)
    pub fn short_id(&self) -> String {
        let end = self.bytes.len().min(8);
        codec::encode(&self.bytes[..end])
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("algorithm", &self.algorithm)
            .field("id", &self.short_id())
            .finish()
    }
}

/// Private half of a keypair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "custody", rename_all = "snake_case")]
pub enum PrivateKey {
    /// Raw key bytes held in process memory
    Local { algorithm: Algorithm, key: SecureBytes },
    /// Key held by an external signer, referenced by handle only
    External { algorithm: Algorithm, handle: KeyHandle },
}

impl PrivateKey {
    pub fn algorithm(&self) -> Algorithm {
        match self {
            PrivateKey::Local { algorithm, .. } | PrivateKey::External { algorithm, .. } => {
                *algorithm
            }
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, PrivateKey::External { .. })
    }

    /// The external handle, if this key is externally managed
    pub fn handle(&self) -> Option<&KeyHandle> {
        match self {
            PrivateKey::External { handle, .. } => Some(handle),
            PrivateKey::Local { .. } => None,
        }
    }
}

/// A signing or KEM keypair. Immutable once generated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Keypair {
    public: PublicKey,
    private: PrivateKey,
}

impl Keypair {
    /// Pair a public and private key of the same algorithm
    pub fn new(public: PublicKey, private: PrivateKey) -> CryptoResult<Self> {
        if public.algorithm() != private.algorithm() {
            return Err(CryptoError::invalid(format!(
                "keypair halves disagree: public {} vs private {}",
                public.algorithm(),
                private.algorithm()
            )));
        }
        Ok(Self { public, private })
    }

    pub fn algorithm(&self) -> Algorithm {
        self.public.algorithm()
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private
    }

    pub fn is_external(&self) -> bool {
        self.private.is_external()
    }
}

/// Compute the SHA-256 hash recorded alongside a signature
pub fn payload_hash(payload: &[u8]) -> [u8; PAYLOAD_HASH_SIZE] {
    Sha256::digest(payload).into()
}

/// A post-quantum signature
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Signature {
    algorithm: Algorithm,
    #[serde(with = "hex_bytes")]
    bytes: Vec<u8>,
    #[serde(with = "hex_array")]
    payload_hash: [u8; PAYLOAD_HASH_SIZE],
    created_at: DateTime<Utc>,
}

impl Signature {
    /// Wrap freshly produced signature bytes over `payload`
    pub fn new(algorithm: Algorithm, bytes: Vec<u8>, payload: &[u8]) -> Self {
        Self {
            algorithm,
            bytes,
            payload_hash: payload_hash(payload),
            created_at: Utc::now(),
        }
    }

    /// Reassemble a signature from its transported fields
    pub fn from_parts(
        algorithm: Algorithm,
        bytes: Vec<u8>,
        payload_hash: [u8; PAYLOAD_HASH_SIZE],
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            algorithm,
            bytes,
            payload_hash,
            created_at,
        }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }

    pub fn payload_hash(&self) -> &[u8; PAYLOAD_HASH_SIZE] {
        &self.payload_hash
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Whether the recorded hash matches `payload`
    pub fn covers(&self, payload: &[u8]) -> bool {
        self.payload_hash == payload_hash(payload)
    }

    pub fn to_hex(&self) -> String {
        codec::encode(&self.bytes)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signature")
            .field("algorithm", &self.algorithm)
            .field("size", &self.bytes.len())
            .field("payload_hash", &codec::encode(&self.payload_hash[..8]))
            .field("created_at", &self.created_at)
            .finish()
    }
}

/// A KEM ciphertext
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KemCiphertext {
    algorithm: Algorithm,
    #[serde(with = "hex_bytes")]
    bytes: Vec<u8>,
}

impl KemCiphertext {
    pub fn new(algorithm: Algorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn to_hex(&self) -> String {
        codec::encode(&self.bytes)
    }
}

impl fmt::Debug for KemCiphertext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KemCiphertext")
            .field("algorithm", &self.algorithm)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// KEM shared secret. Zeroized on drop.
#[derive(Clone)]
pub struct SharedSecret(SecureBytes);

impl SharedSecret {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(SecureBytes::new(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret([REDACTED; {}])", self.0.len())
    }
}
