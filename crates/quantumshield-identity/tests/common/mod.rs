//! Shared fixtures for identity integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use quantumshield_crypto::{
    Algorithm, AlgorithmParams, CryptoResult, KemCiphertext, Keypair, PqcryptoProvider,
    PrimitiveProvider, PrivateKey, PublicKey, SharedSecret, Signature,
};
use quantumshield_identity::{IdentityManager, InMemoryIdentityStore, ShieldConfig};

/// Provider that counts decapsulations
#[derive(Default)]
pub struct CountingProvider {
    inner: PqcryptoProvider,
    decapsulations: AtomicUsize,
}

impl CountingProvider {
    pub fn decapsulations(&self) -> usize {
        self.decapsulations.load(Ordering::SeqCst)
    }
}

impl PrimitiveProvider for CountingProvider {
    fn params(&self, algorithm: Algorithm) -> AlgorithmParams {
        self.inner.params(algorithm)
    }

    fn generate_signing_keypair(&self, algorithm: Algorithm) -> CryptoResult<Keypair> {
        self.inner.generate_signing_keypair(algorithm)
    }

    fn sign(&self, private: &PrivateKey, message: &[u8]) -> CryptoResult<Signature> {
        self.inner.sign(private, message)
    }

    fn verify(
        &self,
        public: &PublicKey,
        message: &[u8],
        signature: &Signature,
    ) -> CryptoResult<bool> {
        self.inner.verify(public, message, signature)
    }

    fn generate_kem_keypair(&self, algorithm: Algorithm) -> CryptoResult<Keypair> {
        self.inner.generate_kem_keypair(algorithm)
    }

    fn encapsulate(&self, public: &PublicKey) -> CryptoResult<(KemCiphertext, SharedSecret)> {
        self.inner.encapsulate(public)
    }

    fn decapsulate(
        &self,
        private: &PrivateKey,
        ciphertext: &KemCiphertext,
    ) -> CryptoResult<SharedSecret> {
        self.decapsulations.fetch_add(1, Ordering::SeqCst);
        self.inner.decapsulate(private, ciphertext)
    }
}

/// Smallest parameter sets, for speed
pub fn fast_config() -> ShieldConfig {
    ShieldConfig::default()
        .with_signature_algorithm(Algorithm::MlDsa44)
        .with_kem_algorithm(Algorithm::MlKem512)
}

pub fn memory_manager() -> IdentityManager {
    IdentityManager::builder()
        .config(fast_config())
        .store(Arc::new(InMemoryIdentityStore::new()))
        .build()
        .unwrap()
}

pub fn counting_manager() -> (IdentityManager, Arc<CountingProvider>) {
    let provider = Arc::new(CountingProvider::default());
    let manager = IdentityManager::builder()
        .config(fast_config())
        .provider(provider.clone())
        .store(Arc::new(InMemoryIdentityStore::new()))
        .build()
        .unwrap();
    (manager, provider)
}
