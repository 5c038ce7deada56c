//! Error types for quantumshield-crypto

use thiserror::Error;

/// Errors that can occur during cryptographic operations
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key, signature or ciphertext does not match the algorithm or level
    /// of the operation. Not retried; the caller must fix its configuration.
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The authenticated cipher rejected the ciphertext or tag
    #[error("Authentication failed: ciphertext or tag rejected")]
    AuthenticationFailed,

    /// The underlying primitive library or external signer failed
    #[error("Primitive failure: {context}")]
    PrimitiveFailure {
        /// What was being attempted and why it failed
        context: String,
        /// Whether the failure is worth retrying (e.g. signer unavailable)
        transient: bool,
    },

    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;

impl CryptoError {
    /// Create an InvalidParameters error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidParameters(message.into())
    }

    /// Create a PrimitiveFailure that a caller may retry
    pub fn transient(context: impl Into<String>) -> Self {
        Self::PrimitiveFailure {
            context: context.into(),
            transient: true,
        }
    }

    /// Create a PrimitiveFailure that will not succeed on retry
    pub fn permanent(context: impl Into<String>) -> Self {
        Self::PrimitiveFailure {
            context: context.into(),
            transient: false,
        }
    }

    /// Only transient primitive failures are retryable
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::PrimitiveFailure { transient: true, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crypto_error_display() {
        let err = CryptoError::invalid("ML-KEM-768 key used for signing");
        assert!(format!("{}", err).contains("Invalid parameters"));
        assert!(format!("{}", err).contains("ML-KEM-768"));

        let err = CryptoError::AuthenticationFailed;
        assert!(format!("{}", err).contains("Authentication failed"));

        let err = CryptoError::transient("vault unavailable");
        let msg = format!("{}", err);
        assert!(msg.contains("Primitive failure"));
        assert!(msg.contains("vault unavailable"));

        let err = CryptoError::KeyDerivation("output too long".to_string());
        assert!(format!("{}", err).contains("Key derivation failed"));

        let err = CryptoError::Encoding("odd length".to_string());
        assert!(format!("{}", err).contains("Encoding error"));
    }

    #[test]
    fn test_only_transient_failures_retry() {
        assert!(CryptoError::transient("timeout").is_retryable());
        assert!(!CryptoError::permanent("bad key").is_retryable());
        assert!(!CryptoError::AuthenticationFailed.is_retryable());
        assert!(!CryptoError::invalid("level mismatch").is_retryable());
    }
}
