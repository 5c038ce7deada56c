//! External custody of signing keys
//!
//! An [`ExternalSigner`] owns private signing keys and exposes them only
//! through opaque [`KeyHandle`]s. [`InMemoryVault`] is an in-process
//! implementation with switchable availability, used for local development
//! and to exercise the transient failure path.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::algorithm::{Algorithm, AlgorithmKind};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{KeyHandle, SecureBytes};
use crate::provider::{dsa_keypair, dsa_sign};

/// A signer that holds private keys outside the process' key material
pub trait ExternalSigner: Send + Sync {
    /// Create a new signing key, returning its handle and public key bytes
    fn create_key(&self, algorithm: Algorithm) -> CryptoResult<(KeyHandle, Vec<u8>)>;

    /// Sign `message` with the key behind `handle`, returning raw signature bytes
    fn sign(&self, handle: &KeyHandle, message: &[u8]) -> CryptoResult<Vec<u8>>;
}

struct VaultKey {
    algorithm: Algorithm,
    secret: SecureBytes,
}

/// In-process [`ExternalSigner`]
///
/// While unavailable, or while injected failures remain, every call fails
/// with a transient [`CryptoError::PrimitiveFailure`].
pub struct InMemoryVault {
    keys: DashMap<KeyHandle, VaultKey>,
    available: AtomicBool,
    pending_failures: AtomicU32,
    sign_calls: AtomicU64,
}

impl InMemoryVault {
    pub fn new() -> Self {
        Self {
            keys: DashMap::new(),
            available: AtomicBool::new(true),
            pending_failures: AtomicU32::new(0),
            sign_calls: AtomicU64::new(0),
        }
    }

    /// Toggle availability
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Make the next `count` calls fail transiently
    pub fn fail_next(&self, count: u32) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Number of successful sign operations
    pub fn sign_count(&self) -> u64 {
        self.sign_calls.load(Ordering::SeqCst)
    }

    /// Number of keys held
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    fn check_available(&self, operation: &str) -> CryptoResult<()> {
        if !self.is_available() {
            warn!(operation, "external signer unavailable");
            return Err(CryptoError::transient(format!(
                "external signer unavailable during {}",
                operation
            )));
        }
        let injected = self
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            warn!(operation, "external signer call failed");
            return Err(CryptoError::transient(format!(
                "external signer timed out during {}",
                operation
            )));
        }
        Ok(())
    }
}

impl Default for InMemoryVault {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVault")
            .field("keys", &self.keys.len())
            .field("available", &self.is_available())
            .finish_non_exhaustive()
    }
}

impl ExternalSigner for InMemoryVault {
    fn create_key(&self, algorithm: Algorithm) -> CryptoResult<(KeyHandle, Vec<u8>)> {
        algorithm.expect_kind(AlgorithmKind::Signature)?;
        self.check_available("create_key")?;

        let (public, secret) = dsa_keypair(algorithm)?;
        let handle = KeyHandle::new(format!("vault-{}", Uuid::new_v4()));
        self.keys
            .insert(handle.clone(), VaultKey { algorithm, secret });
        debug!(handle = %handle, algorithm = %algorithm, "vault key created");
        Ok((handle, public))
    }

    fn sign(&self, handle: &KeyHandle, message: &[u8]) -> CryptoResult<Vec<u8>> {
        self.check_available("sign")?;

        let key = self
            .keys
            .get(handle)
            .ok_or_else(|| CryptoError::permanent(format!("unknown key handle: {}", handle)))?;
        let signature = dsa_sign(key.algorithm, key.secret.as_slice(), message)?;
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        Ok(signature)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_sign() {
        let vault = InMemoryVault::new();
        let (handle, public) = vault.create_key(Algorithm::MlDsa44).unwrap();
        assert!(handle.as_str().starts_with("vault-"));
        assert!(!public.is_empty());
        assert_eq!(vault.len(), 1);

        let sig = vault.sign(&handle, b"payload").unwrap();
        assert!(!sig.is_empty());
        assert_eq!(vault.sign_count(), 1);
    }

    #[test]
    fn test_unavailable_is_transient() {
        let vault = InMemoryVault::new();
        let (handle, _) = vault.create_key(Algorithm::MlDsa65).unwrap();

        vault.set_available(false);
        let err = vault.sign(&handle, b"payload").unwrap_err();
        assert!(err.is_retryable());

        vault.set_available(true);
        assert!(vault.sign(&handle, b"payload").is_ok());
    }

    #[test]
    fn test_fail_next_counts_down() {
        let vault = InMemoryVault::new();
        let (handle, _) = vault.create_key(Algorithm::MlDsa65).unwrap();

        vault.fail_next(2);
        assert!(vault.sign(&handle, b"x").unwrap_err().is_retryable());
        assert!(vault.sign(&handle, b"x").unwrap_err().is_retryable());
        assert!(vault.sign(&handle, b"x").is_ok());
        assert_eq!(vault.sign_count(), 1);
    }

    #[test]
    fn test_unknown_handle_is_permanent() {
        let vault = InMemoryVault::new();
        let err = vault.sign(&KeyHandle::new("nope"), b"x").unwrap_err();
        assert!(matches!(err, CryptoError::PrimitiveFailure { transient: false, .. }));
    }

    #[test]
    fn test_kem_algorithm_rejected() {
        let vault = InMemoryVault::new();
        assert!(matches!(
            vault.create_key(Algorithm::MlKem768),
            Err(CryptoError::InvalidParameters(_))
        ));
    }
}
