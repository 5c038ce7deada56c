//! Error types for quantumshield-identity

use quantumshield_crypto::CryptoError;
use thiserror::Error;

/// Errors that can occur in identity, channel and package operations
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Unknown id passed to an identity-scoped operation
    #[error("Identity not found: {0}")]
    IdentityNotFound(String),

    /// Channel signature did not verify; nothing was decapsulated
    #[error("Channel tampered: {0}")]
    ChannelTampered(String),

    /// Package signature did not verify; nothing was decrypted
    #[error("Package tampered: {0}")]
    TamperedPackage(String),

    /// Identity store I/O failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Error while (de)serializing snapshots, channels or packages
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error from the crypto layer
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// Result type for identity operations
pub type IdentityResult<T> = Result<T, IdentityError>;

impl From<std::io::Error> for IdentityError {
    fn from(err: std::io::Error) -> Self {
        IdentityError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for IdentityError {
    fn from(err: serde_json::Error) -> Self {
        IdentityError::Serialization(err.to_string())
    }
}

impl From<postcard::Error> for IdentityError {
    fn from(err: postcard::Error) -> Self {
        IdentityError::Serialization(err.to_string())
    }
}

impl IdentityError {
    /// Create a new IdentityNotFound error
    pub fn not_found(id: impl std::fmt::Display) -> Self {
        Self::IdentityNotFound(id.to_string())
    }

    /// Only transient primitive failures are retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Crypto(err) if err.is_retryable())
    }

    /// Whether this is an invalid-parameters error from the crypto layer
    pub fn is_invalid_parameters(&self) -> bool {
        matches!(self, Self::Crypto(CryptoError::InvalidParameters(_)))
    }
}
