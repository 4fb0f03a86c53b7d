//! Durable homes for the serialized metadata snapshot.

use crate::metadata::atomic::{atomic_write, read_optional};
use crate::Result;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::debug;

/// Where a namespace's metadata snapshot is read from and flushed to.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Read the last persisted snapshot, or `None` if nothing was ever written.
    async fn read(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the persisted snapshot.
    async fn write(&self, bytes: &[u8]) -> Result<()>;
}

/// Snapshot kept in a single JSON file, replaced atomically on each flush.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    path: PathBuf,
}

impl FileSnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SnapshotStore for FileSnapshotStore {
    async fn read(&self) -> Result<Option<Vec<u8>>> {
        debug!("Loading metadata snapshot from {}", self.path.display());
        read_optional(&self.path).await
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        debug!("Saving metadata snapshot to {}", self.path.display());
        atomic_write(&self.path, bytes).await
    }
}

/// Snapshot held in memory, for the virtual store and for tests.
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    blob: Mutex<Option<Vec<u8>>>,
    writes: AtomicUsize,
}

impl MemorySnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with an existing snapshot.
    pub fn with_contents(bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            blob: Mutex::new(Some(bytes.into())),
            writes: AtomicUsize::new(0),
        }
    }

    /// Number of `write` calls observed so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Copy of the last written snapshot.
    pub fn contents(&self) -> Option<Vec<u8>> {
        self.blob.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }
}

#[async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn read(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.contents())
    }

    async fn write(&self, bytes: &[u8]) -> Result<()> {
        *self.blob.lock().unwrap_or_else(|p| p.into_inner()) = Some(bytes.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
