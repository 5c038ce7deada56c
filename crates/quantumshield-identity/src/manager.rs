//! Identity manager
//!
//! Owns every live [`Identity`] and is the only component that touches
//! private key material. Identities live in a sharded map, so distinct ids
//! never contend; each entry sits behind its own read/write lock so readers
//! always see a consistent snapshot. Store I/O (`persist`, `load`, `purge`)
//! for a given id is serialized by a per-id async lock.

use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use quantumshield_crypto::{
    AlgorithmKind, CryptoError, ExternalSigner, KemCiphertext, PqcryptoProvider,
    PrimitiveProvider, PublicKey, SharedSecret, Signature,
};
use quantumshield_logging::IdentityContextGuard;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info, info_span, instrument, warn};

use crate::channel::ChannelProtocol;
use crate::clock::{Clock, SystemClock};
use crate::config::ShieldConfig;
use crate::error::{IdentityError, IdentityResult};
use crate::hybrid::HybridCipher;
use crate::identity::{Identity, IdentityHandle, IdentityId, IdentityStatus};
use crate::proof::SignatureProof;
use crate::store::{FileIdentityStore, IdentityStore};

type Entry = Arc<RwLock<Identity>>;
type IoLocks = DashMap<IdentityId, Arc<AsyncMutex<()>>>;

/// Drop the lock entry for `id` unless some task still holds a clone of it
fn release_io_lock(locks: &IoLocks, id: IdentityId) {
    locks.remove_if(&id, |_, lock| Arc::strong_count(lock) == 1);
}

/// Exclusive store access for one id
///
/// The lock entry outlives every holder and waiter and is removed by the last
/// one to finish.
struct IoGuard<'a> {
    locks: &'a IoLocks,
    id: IdentityId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for IoGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        release_io_lock(self.locks, self.id);
    }
}

/// Lifecycle owner of named post-quantum identities
pub struct IdentityManager {
    config: ShieldConfig,
    provider: Arc<dyn PrimitiveProvider>,
    store: Arc<dyn IdentityStore>,
    clock: Arc<dyn Clock>,
    identities: DashMap<IdentityId, Entry>,
    io_locks: IoLocks,
}

impl IdentityManager {
    /// Manager with the default provider, a file store at the configured
    /// key-store path, and the system clock
    pub fn new(config: ShieldConfig) -> IdentityResult<Self> {
        Self::builder().config(config).build()
    }

    pub fn builder() -> IdentityManagerBuilder {
        IdentityManagerBuilder::new()
    }

    pub fn config(&self) -> &ShieldConfig {
        &self.config
    }

    pub fn provider(&self) -> &dyn PrimitiveProvider {
        self.provider.as_ref()
    }

    pub fn clock(&self) -> &dyn Clock {
        self.clock.as_ref()
    }

    /// Channel handshakes between identities of this manager
    pub fn channels(&self) -> ChannelProtocol<'_> {
        ChannelProtocol::new(self)
    }

    /// Hybrid encryption to and from identities of this manager
    pub fn hybrid(&self) -> HybridCipher<'_> {
        HybridCipher::new(self)
    }

    fn entry(&self, id: IdentityId) -> IdentityResult<Entry> {
        self.identities
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| IdentityError::not_found(id))
    }

    async fn lock_io(&self, id: IdentityId) -> IoGuard<'_> {
        let lock = Arc::clone(self.io_locks.entry(id).or_default().value());
        IoGuard {
            locks: &self.io_locks,
            id,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Generate a new identity and return its public handle
    pub fn create(&self, name: &str) -> IdentityResult<IdentityHandle> {
        let id = IdentityId::generate();
        let _ctx = IdentityContextGuard::with_label(id, name);
        let _span = info_span!(
            "create_identity",
            identity_id = %id,
            signature = %self.config.signature_algorithm,
            kem = %self.config.kem_algorithm
        )
        .entered();

        let signing_keys = self
            .provider
            .generate_signing_keypair(self.config.signature_algorithm)?;
        let kem_keys = self
            .provider
            .generate_kem_keypair(self.config.kem_algorithm)?;

        let identity = Identity::new(
            id,
            name.to_string(),
            self.clock.now_utc(),
            self.config.rotation_days,
            signing_keys,
            kem_keys,
        );
        let handle = identity.handle();

        self.identities.insert(id, Arc::new(RwLock::new(identity)));
        info!(external = self.config.external_signing, "identity created");
        Ok(handle)
    }

    /// Public handle of a live identity
    pub fn handle(&self, id: IdentityId) -> IdentityResult<IdentityHandle> {
        Ok(self.entry(id)?.read().handle())
    }

    pub fn contains(&self, id: IdentityId) -> bool {
        self.identities.contains_key(&id)
    }

    /// Handles of all live identities, oldest first
    pub fn list(&self) -> Vec<IdentityHandle> {
        let mut handles: Vec<_> = self
            .identities
            .iter()
            .map(|entry| entry.value().read().handle())
            .collect();
        handles.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        handles
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Sign `data` with an identity's signing key
    ///
    /// Transient signer failures are retried with exponential backoff per the
    /// configured [`RetryPolicy`](crate::RetryPolicy). The backoff blocks the
    /// calling thread.
    pub fn sign(&self, id: IdentityId, data: &[u8]) -> IdentityResult<Signature> {
        let entry = self.entry(id)?;
        let _ctx = IdentityContextGuard::new(id);
        let _span = info_span!("sign_payload", identity_id = %id, size = data.len()).entered();
        let retry = self.config.retry;

        let mut attempt = 1;
        loop {
            // The entry lock is released before any backoff
            let result = {
                let identity = entry.read();
                self.provider.sign(identity.signing_private(), data)
            };
            match result {
                Ok(signature) => {
                    debug!(identity_id = %id, size = signature.size(), attempt, "payload signed");
                    return Ok(signature);
                }
                Err(e) if e.is_retryable() && attempt < retry.max_attempts => {
                    let delay = retry.backoff(attempt);
                    warn!(
                        identity_id = %id,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient signing failure, retrying"
                    );
                    std::thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => {
                    warn!(identity_id = %id, attempt, error = %e, "signing failed");
                    return Err(e.into());
                }
            }
        }
    }

    /// Sign `data` and package the result as a self-contained proof
    pub fn prove(&self, id: IdentityId, data: &[u8]) -> IdentityResult<SignatureProof> {
        let signature = self.sign(id, data)?;
        let public_key = self.entry(id)?.read().signing_public_key().clone();
        Ok(SignatureProof::new(Some(id), public_key, signature))
    }

    /// Verify a signature against a public signing key
    pub fn verify(
        &self,
        public: &PublicKey,
        data: &[u8],
        signature: &Signature,
    ) -> IdentityResult<bool> {
        let valid = self.provider.verify(public, data, signature)?;
        debug!(
            algorithm = %public.algorithm(),
            key = %public.short_id(),
            valid,
            "signature verified"
        );
        Ok(valid)
    }

    pub(crate) fn decapsulate(
        &self,
        id: IdentityId,
        ciphertext: &KemCiphertext,
    ) -> IdentityResult<SharedSecret> {
        let entry = self.entry(id)?;
        let identity = entry.read();
        Ok(self.provider.decapsulate(identity.kem_private(), ciphertext)?)
    }

    /// Whether an identity is due for rotation. Advisory only.
    pub fn needs_rotation(&self, id: IdentityId) -> IdentityResult<bool> {
        let now = self.clock.now_utc();
        Ok(self.entry(id)?.read().needs_rotation(now))
    }

    /// Flag an identity as due for rotation regardless of age
    pub fn mark_rotation_due(&self, id: IdentityId) -> IdentityResult<()> {
        self.entry(id)?.write().mark_rotation_due();
        info!(identity_id = %id, "identity marked for rotation");
        Ok(())
    }

    /// Ids of all identities that need rotation
    pub fn rotation_candidates(&self) -> Vec<IdentityId> {
        let now = self.clock.now_utc();
        let mut ids: Vec<_> = self
            .identities
            .iter()
            .filter(|entry| entry.value().read().needs_rotation(now))
            .map(|entry| *entry.key())
            .collect();
        ids.sort();
        ids
    }

    pub fn status(&self, id: IdentityId) -> IdentityResult<IdentityStatus> {
        let now = self.clock.now_utc();
        Ok(self.entry(id)?.read().status(now))
    }

    /// Drop a live identity; its private key material is zeroized
    pub fn delete(&self, id: IdentityId) -> IdentityResult<()> {
        self.identities
            .remove(&id)
            .ok_or_else(|| IdentityError::not_found(id))?;
        release_io_lock(&self.io_locks, id);
        info!(identity_id = %id, "identity deleted");
        Ok(())
    }

    /// Write an identity's snapshot to the store
    #[instrument(skip(self), fields(identity_id = %id))]
    pub async fn persist(&self, id: IdentityId) -> IdentityResult<()> {
        let _io = self.lock_io(id).await;

        let snapshot = self.entry(id)?.read().clone();
        self.store.save(&snapshot).await?;
        info!(
            external = snapshot.is_externally_managed(),
            "identity persisted"
        );
        Ok(())
    }

    /// Reinstate an identity from the store and return its handle
    #[instrument(skip(self), fields(identity_id = %id))]
    pub async fn load(&self, id: IdentityId) -> IdentityResult<IdentityHandle> {
        let _io = self.lock_io(id).await;

        let identity = self
            .store
            .load(id)
            .await?
            .ok_or_else(|| IdentityError::not_found(id))?;
        self.check_snapshot(id, &identity)?;

        let handle = identity.handle();
        self.identities.insert(id, Arc::new(RwLock::new(identity)));
        info!(name = %handle.name, "identity loaded");
        Ok(handle)
    }

    fn check_snapshot(&self, id: IdentityId, identity: &Identity) -> IdentityResult<()> {
        if identity.id() != id {
            return Err(IdentityError::Storage(format!(
                "snapshot for {} contains identity {}",
                id,
                identity.id()
            )));
        }
        identity
            .signature_algorithm()
            .expect_kind(AlgorithmKind::Signature)?;
        identity.kem_algorithm().expect_kind(AlgorithmKind::Kem)?;
        self.provider.validate_keypair(identity.signing_keys())?;
        self.provider.validate_keypair(identity.kem_keys())?;
        if identity.kem_private().is_external() {
            return Err(CryptoError::invalid("KEM private key must be held locally").into());
        }
        Ok(())
    }

    /// Delete an identity and its persisted snapshot
    #[instrument(skip(self), fields(identity_id = %id))]
    pub async fn purge(&self, id: IdentityId) -> IdentityResult<()> {
        let _io = self.lock_io(id).await;

        let live = self.identities.remove(&id).is_some();
        let stored = self.store.remove(id).await?;
        if !live && !stored {
            return Err(IdentityError::not_found(id));
        }
        info!(live, stored, "identity purged");
        Ok(())
    }
}

impl fmt::Debug for IdentityManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityManager")
            .field("config", &self.config)
            .field("identities", &self.identities.len())
            .field("clock", &self.clock)
            .finish_non_exhaustive()
    }
}

/// Builder for [`IdentityManager`]
#[derive(Default)]
pub struct IdentityManagerBuilder {
    config: ShieldConfig,
    provider: Option<Arc<dyn PrimitiveProvider>>,
    signer: Option<Arc<dyn ExternalSigner>>,
    store: Option<Arc<dyn IdentityStore>>,
    clock: Option<Arc<dyn Clock>>,
}

impl IdentityManagerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ShieldConfig) -> Self {
        self.config = config;
        self
    }

    /// Use a custom primitive provider (overrides any external signer)
    pub fn provider(mut self, provider: Arc<dyn PrimitiveProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Signer used for signing keys when external signing is enabled
    pub fn external_signer(mut self, signer: Arc<dyn ExternalSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Validate the configuration and assemble the manager
    pub fn build(self) -> IdentityResult<IdentityManager> {
        self.config.validate()?;

        let provider: Arc<dyn PrimitiveProvider> = match self.provider {
            Some(provider) => provider,
            None if self.config.external_signing => {
                let signer = self.signer.ok_or_else(|| {
                    CryptoError::invalid(
                        "external signing is enabled but no external signer was configured",
                    )
                })?;
                Arc::new(PqcryptoProvider::external(signer))
            }
            None => Arc::new(PqcryptoProvider::new()),
        };
        let store = self.store.unwrap_or_else(|| {
            Arc::new(FileIdentityStore::new(self.config.key_store_path.clone()))
        });
        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));

        debug!(
            signature = %self.config.signature_algorithm,
            kem = %self.config.kem_algorithm,
            external = self.config.external_signing,
            rotation_days = self.config.rotation_days,
            "identity manager ready"
        );
        Ok(IdentityManager {
            config: self.config,
            provider,
            store,
            clock,
            identities: DashMap::new(),
            io_locks: DashMap::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::InMemoryIdentityStore;
    use chrono::Duration;
    use quantumshield_crypto::{Algorithm, InMemoryVault};

    fn fast_config() -> ShieldConfig {
        ShieldConfig::default()
            .with_signature_algorithm(Algorithm::MlDsa44)
            .with_kem_algorithm(Algorithm::MlKem512)
    }

    fn manager() -> IdentityManager {
        IdentityManager::builder()
            .config(fast_config())
            .store(Arc::new(InMemoryIdentityStore::new()))
            .build()
            .unwrap()
    }

    #[test]
    fn test_create_and_sign() {
        let manager = manager();
        let alice = manager.create("Alice").unwrap();
        assert_eq!(alice.name, "Alice");
        assert_eq!(alice.signing_key.algorithm(), Algorithm::MlDsa44);
        assert_eq!(alice.kem_key.algorithm(), Algorithm::MlKem512);

        let sig = manager.sign(alice.id, b"ping").unwrap();
        assert!(manager.verify(&alice.signing_key, b"ping", &sig).unwrap());
        assert!(!manager.verify(&alice.signing_key, b"pong", &sig).unwrap());
    }

    #[test]
    fn test_unknown_identity() {
        let manager = manager();
        let unknown = IdentityId::generate();
        assert!(matches!(
            manager.sign(unknown, b"data"),
            Err(IdentityError::IdentityNotFound(_))
        ));
        assert!(matches!(
            manager.needs_rotation(unknown),
            Err(IdentityError::IdentityNotFound(_))
        ));
        assert!(matches!(manager.delete(unknown), Err(IdentityError::IdentityNotFound(_))));
    }

    #[test]
    fn test_rotation_follows_clock() {
        let clock = Arc::new(ManualClock::starting_now());
        let manager = IdentityManager::builder()
            .config(fast_config().with_rotation_days(30))
            .store(Arc::new(InMemoryIdentityStore::new()))
            .clock(clock.clone())
            .build()
            .unwrap();

        let id = manager.create("Rotating").unwrap().id;
        assert!(!manager.needs_rotation(id).unwrap());
        assert!(manager.rotation_candidates().is_empty());

        clock.advance(Duration::days(30));
        assert!(manager.needs_rotation(id).unwrap());
        assert_eq!(manager.rotation_candidates(), vec![id]);
    }

    #[test]
    fn test_mark_rotation_due() {
        let manager = manager();
        let id = manager.create("Marked").unwrap().id;
        manager.mark_rotation_due(id).unwrap();
        assert!(manager.needs_rotation(id).unwrap());
        assert!(manager.status(id).unwrap().needs_rotation);
    }

    #[test]
    fn test_status_fields() {
        let manager = manager();
        let id = manager.create("Status").unwrap().id;
        let status = manager.status(id).unwrap();
        assert_eq!(status.name, "Status");
        assert_eq!(status.signature_algorithm, Algorithm::MlDsa44);
        assert_eq!(status.kem_algorithm, Algorithm::MlKem512);
        assert!(!status.externally_managed);
        assert!(!status.needs_rotation);
    }

    #[test]
    fn test_delete_and_list() {
        let manager = manager();
        let a = manager.create("A").unwrap().id;
        let b = manager.create("B").unwrap().id;
        assert_eq!(manager.len(), 2);
        assert_eq!(manager.list().len(), 2);

        manager.delete(a).unwrap();
        assert!(!manager.contains(a));
        assert!(manager.contains(b));
        assert_eq!(manager.len(), 1);
    }

    #[test]
    fn test_external_mode_requires_signer() {
        let err = IdentityManager::builder()
            .config(fast_config().with_external_signing(true))
            .store(Arc::new(InMemoryIdentityStore::new()))
            .build()
            .unwrap_err();
        assert!(err.is_invalid_parameters());
    }

    #[test]
    fn test_external_signing_retries_transient_failures() {
        let vault = Arc::new(InMemoryVault::new());
        let manager = IdentityManager::builder()
            .config(fast_config().with_external_signing(true).with_retry(crate::RetryPolicy {
                max_attempts: 3,
                initial_backoff_ms: 1,
                max_backoff_ms: 2,
            }))
            .external_signer(vault.clone())
            .store(Arc::new(InMemoryIdentityStore::new()))
            .build()
            .unwrap();

        let alice = manager.create("Alice").unwrap();
        assert!(manager.status(alice.id).unwrap().externally_managed);

        vault.fail_next(2);
        let sig = manager.sign(alice.id, b"ledger").unwrap();
        assert!(manager.verify(&alice.signing_key, b"ledger", &sig).unwrap());

        vault.fail_next(3);
        let err = manager.sign(alice.id, b"ledger").unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_invalid_config_rejected_at_build() {
        let err = IdentityManager::builder()
            .config(ShieldConfig::default().with_rotation_days(0))
            .build()
            .unwrap_err();
        assert!(err.is_invalid_parameters());
    }

    #[tokio::test]
    async fn test_persist_load_roundtrip() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let manager = IdentityManager::builder()
            .config(fast_config())
            .store(store.clone())
            .build()
            .unwrap();

        let alice = manager.create("Alice").unwrap();
        manager.persist(alice.id).await.unwrap();
        manager.delete(alice.id).unwrap();
        assert!(!manager.contains(alice.id));

        let restored = manager.load(alice.id).await.unwrap();
        assert_eq!(restored, alice);

        let sig = manager.sign(alice.id, b"after reload").unwrap();
        assert!(manager.verify(&alice.signing_key, b"after reload", &sig).unwrap());
    }

    #[tokio::test]
    async fn test_load_unknown_is_not_found() {
        let manager = manager();
        assert!(matches!(
            manager.load(IdentityId::generate()).await,
            Err(IdentityError::IdentityNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_purge_removes_snapshot() {
        let store = Arc::new(InMemoryIdentityStore::new());
        let manager = IdentityManager::builder()
            .config(fast_config())
            .store(store.clone())
            .build()
            .unwrap();

        let id = manager.create("Gone").unwrap().id;
        manager.persist(id).await.unwrap();
        assert_eq!(store.len(), 1);

        manager.purge(id).await.unwrap();
        assert!(store.is_empty());
        assert!(!manager.contains(id));
        assert!(matches!(manager.purge(id).await, Err(IdentityError::IdentityNotFound(_))));
    }

    fn io_lock_holders(manager: &IdentityManager, id: IdentityId) -> usize {
        manager
            .io_locks
            .get(&id)
            .map(|lock| Arc::strong_count(lock.value()))
            .unwrap_or(0)
    }

    #[tokio::test]
    async fn test_purge_keeps_lock_for_waiters() {
        let manager = Arc::new(manager());
        let id = manager.create("Shared").unwrap().id;
        manager.persist(id).await.unwrap();
        assert!(manager.io_locks.is_empty());

        let held = manager.lock_io(id).await;
        let purge = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.purge(id).await }
        });
        // map entry, our guard and the queued purge
        while io_lock_holders(&manager, id) < 3 {
            tokio::task::yield_now().await;
        }

        drop(held);
        assert_eq!(io_lock_holders(&manager, id), 2);

        // a clone taken now shares the lock the purge still owns
        let late = manager.io_locks.get(&id).map(|lock| Arc::clone(lock.value())).unwrap();
        purge.await.unwrap().unwrap();
        assert_eq!(Arc::strong_count(&late), 2);
        assert!(manager.io_locks.contains_key(&id));

        drop(late);
        assert!(matches!(manager.load(id).await, Err(IdentityError::IdentityNotFound(_))));
        assert!(manager.io_locks.is_empty());
    }

    #[tokio::test]
    async fn test_store_io_is_serialized_per_id() {
        let manager = Arc::new(manager());
        let id = manager.create("Busy").unwrap().id;

        let held = manager.lock_io(id).await;
        let persist = tokio::spawn({
            let manager = Arc::clone(&manager);
            async move { manager.persist(id).await }
        });
        while io_lock_holders(&manager, id) < 3 {
            tokio::task::yield_now().await;
        }
        assert!(!persist.is_finished());

        drop(held);
        persist.await.unwrap().unwrap();
        assert!(manager.io_locks.is_empty());
    }

    #[tokio::test]
    async fn test_delete_releases_io_lock() {
        let manager = manager();
        let id = manager.create("Brief").unwrap().id;
        manager.io_locks.entry(id).or_default();

        manager.delete(id).unwrap();
        assert!(manager.io_locks.is_empty());
    }
}
