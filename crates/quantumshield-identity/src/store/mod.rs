//! Identity snapshot stores
//!
//! The [`IdentityManager`](crate::IdentityManager) owns one store for its
//! lifetime. Stores hold full snapshots, including local private keys, so
//! implementations must treat their contents as secret.

mod file;
mod memory;

pub use file::FileIdentityStore;
pub use memory::InMemoryIdentityStore;

use async_trait::async_trait;

use crate::error::IdentityResult;
use crate::identity::{Identity, IdentityId};

/// Durable storage for identity snapshots
#[async_trait]
pub trait IdentityStore: Send + Sync {
    /// Write (or overwrite) the snapshot of an identity
    async fn save(&self, identity: &Identity) -> IdentityResult<()>;

    /// Read a snapshot, `None` if none was saved for `id`
    async fn load(&self, id: IdentityId) -> IdentityResult<Option<Identity>>;

    /// Delete a snapshot, returning whether one existed
    async fn remove(&self, id: IdentityId) -> IdentityResult<bool>;

    /// Ids of all saved snapshots
    async fn list_ids(&self) -> IdentityResult<Vec<IdentityId>>;
}
