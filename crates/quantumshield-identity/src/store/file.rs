//! File-backed identity store
//!
//! One pretty-printed JSON file per identity, `<dir>/<id>.json`. Writes go to
//! an owner-only temporary file first and are renamed into place.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::IdentityStore;
use crate::error::IdentityResult;
use crate::identity::{Identity, IdentityId};

const SNAPSHOT_EXTENSION: &str = "json";

/// Identity store writing one JSON file per identity
#[derive(Debug, Clone)]
pub struct FileIdentityStore {
    directory: PathBuf,
}

impl FileIdentityStore {
    /// Store rooted at `directory` (created on first save)
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the snapshot file for `id`
    pub fn snapshot_path(&self, id: IdentityId) -> PathBuf {
        self.directory.join(format!("{id}.{SNAPSHOT_EXTENSION}"))
    }
}

/// Write `contents` to a fresh file readable by the owner only
///
/// A leftover file at `path` from an interrupted save is replaced, never
/// reused, so its permissions cannot leak into the new snapshot.
async fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(contents).await?;
    file.sync_all().await
}

#[async_trait]
impl IdentityStore for FileIdentityStore {
    async fn save(&self, identity: &Identity) -> IdentityResult<()> {
        fs::create_dir_all(&self.directory).await?;

        let path = self.snapshot_path(identity.id());
        let tmp = path.with_extension("json.tmp");
        let json = Zeroizing::new(serde_json::to_string_pretty(identity)?);

        write_private(&tmp, json.as_bytes()).await?;
        fs::rename(&tmp, &path).await?;

        debug!(
            identity_id = %identity.id(),
            path = %path.display(),
            "identity snapshot written"
        );
        Ok(())
    }

    async fn load(&self, id: IdentityId) -> IdentityResult<Option<Identity>> {
        let path = self.snapshot_path(id);
        let json = match fs::read_to_string(&path).await {
            Ok(json) => Zeroizing::new(json),
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(serde_json::from_str(json.as_str())?))
    }

    async fn remove(&self, id: IdentityId) -> IdentityResult<bool> {
        match fs::remove_file(self.snapshot_path(id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_ids(&self) -> IdentityResult<Vec<IdentityId>> {
        let mut entries = match fs::read_dir(&self.directory).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(SNAPSHOT_EXTENSION) {
                continue;
            }
            let parsed = path
                .file_stem()
                .and_then(|stem| stem.to_str())
                .map(str::parse::<IdentityId>);
            match parsed {
                Some(Ok(id)) => ids.push(id),
                _ => warn!(path = %path.display(), "ignoring unrecognised file in key store"),
            }
        }
        ids.sort();
        Ok(ids)
    }
}
