//! In-memory identity store

use async_trait::async_trait;
use dashmap::DashMap;
use zeroize::Zeroizing;

use super::IdentityStore;
use crate::error::IdentityResult;
use crate::identity::{Identity, IdentityId};

/// Identity store backed by a concurrent map
///
/// Snapshots are kept in their serialized form so a load always yields an
/// independent copy, exactly as a durable store would.
#[derive(Default)]
pub struct InMemoryIdentityStore {
    snapshots: DashMap<IdentityId, Zeroizing<String>>,
}

impl InMemoryIdentityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored snapshots
    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}

impl std::fmt::Debug for InMemoryIdentityStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryIdentityStore")
            .field("snapshots", &self.snapshots.len())
            .finish()
    }
}

#[async_trait]
impl IdentityStore for InMemoryIdentityStore {
    async fn save(&self, identity: &Identity) -> IdentityResult<()> {
        let json = Zeroizing::new(serde_json::to_string(identity)?);
        self.snapshots.insert(identity.id(), json);
        Ok(())
    }

    async fn load(&self, id: IdentityId) -> IdentityResult<Option<Identity>> {
        match self.snapshots.get(&id) {
            Some(json) => Ok(Some(serde_json::from_str(json.as_str())?)),
            None => Ok(None),
        }
    }

    async fn remove(&self, id: IdentityId) -> IdentityResult<bool> {
        Ok(self.snapshots.remove(&id).is_some())
    }

    async fn list_ids(&self) -> IdentityResult<Vec<IdentityId>> {
        let mut ids: Vec<_> = self.snapshots.iter().map(|entry| *entry.key()).collect();
        ids.sort();
        Ok(ids)
    }
}
