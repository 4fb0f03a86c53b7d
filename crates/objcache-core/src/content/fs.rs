//! Filesystem-backed content store.

use super::{relative_path, ContentStore};
use crate::metadata::atomic::{atomic_write, is_temp_file, read_optional};
use crate::{ObjCacheError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Stores each id as a file at `<root>/<id>`.
///
/// `root` is the namespace's own directory; nothing outside it is touched,
/// including by [`ContentStore::delete_all`].
#[derive(Debug, Clone)]
pub struct FsContentStore {
    root: PathBuf,
}

impl FsContentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the store, making sure the root directory exists and sweeping
    /// temp files left behind by interrupted writes.
    pub async fn create(root: impl Into<PathBuf>) -> Result<Self> {
        let store = Self::new(root);
        fs::create_dir_all(&store.root)
            .await
            .map_err(|e| ObjCacheError::io_with_path(e, &store.root))?;

        let root = store.root.clone();
        let swept = tokio::task::spawn_blocking(move || sweep_temp_files(&root))
            .await
            .map_err(|e| ObjCacheError::Other(format!("Temp sweep task failed: {}", e)))?;
        if swept > 0 {
            info!("Removed {} orphaned temp files under {}", swept, store.root.display());
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk location for `id`.
    pub fn path_for(&self, id: &str) -> Result<PathBuf> {
        Ok(self.root.join(relative_path(id)?))
    }

    /// Remove now-empty directories between `path` and the root.
    async fn prune_empty_parents(&self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir == self.root || !dir.starts_with(&self.root) {
                break;
            }
            // Fails on non-empty directories, which is where we stop.
            if fs::remove_dir(dir).await.is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    async fn write(&self, id: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path_for(id)?;
        atomic_write(&path, bytes).await
    }

    async fn read(&self, id: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path_for(id)?;
        let result = read_optional(&path).await;
        if result.is_err() && is_dir(&path).await {
            // A directory here means other ids nest under this one; no file.
            debug!("{} is a directory, treating as missing", path.display());
            return Ok(None);
        }
        result
    }

    async fn delete(&self, id: &str) -> Result<()> {
        let path = self.path_for(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted {}", path.display());
                self.prune_empty_parents(&path).await;
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ObjCacheError::Io {
                message: format!("Failed to delete {}", path.display()),
                path: Some(path),
                source: Some(e),
            }),
        }
    }

    async fn delete_all(&self) -> Result<()> {
        let root = self.root.clone();
        let failures = tokio::task::spawn_blocking(move || clear_dir(&root))
            .await
            .map_err(|e| ObjCacheError::Other(format!("Clear task failed: {}", e)))?;

        if failures > 0 {
            warn!(
                "Cleared {} with {} entries left behind",
                self.root.display(),
                failures
            );
        }

        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| ObjCacheError::io_with_path(e, &self.root))
    }
}

/// Delete everything under `root` (but not `root`), returning the failure count.
fn clear_dir(root: &Path) -> usize {
    if !root.exists() {
        return 0;
    }

    let mut failures = 0;
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Failed to walk {}: {}", root.display(), e);
                failures += 1;
                continue;
            }
        };

        let path = entry.path();
        let result = if entry.file_type().is_dir() {
            std::fs::remove_dir(path)
        } else {
            std::fs::remove_file(path)
        };

        match result {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                warn!("Failed to delete {}: {}", path.display(), e);
                failures += 1;
            }
        }
    }
    failures
}

/// Delete `.{name}.{uuid}.tmp` files under `root`, returning how many went.
fn sweep_temp_files(root: &Path) -> usize {
    let mut swept = 0;
    for entry in WalkDir::new(root).min_depth(1).into_iter().filter_map(|e| e.ok()) {
        if !entry.file_type().is_file() || !is_temp_file(entry.path()) {
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => swept += 1,
            Err(e) => warn!("Failed to remove temp file {}: {}", entry.path().display(), e),
        }
    }
    swept
}

async fn is_dir(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}
