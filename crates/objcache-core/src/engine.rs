//! The cache engine: metadata index + content store, kept in agreement.
//!
//! An entry is in the metadata index only while its content is believed to be
//! readable. Writes store content before recording metadata; removals drop
//! metadata before content; a read that finds metadata but no content repairs
//! the index by deleting the entry and reports a miss.
//!
//! Writes, removals and evictions of one id are serialized through a striped
//! lock, and an eviction pass only removes an entry whose `created` still
//! matches the copy it took, so a rewrite landing mid-pass survives.
//!
//! Storage failures never reach the caller of `get`, `write_*`, `remove`,
//! `clear` or `evict_expired_objects`. They are logged and degrade to a miss.

use crate::config::{CacheDefaults, EngineOptions, PathsConfig};
use crate::content::{validate_id, ContentStore, FsContentStore, MemoryContentStore};
use crate::metadata::{
    CacheEntryMetadata, FileSnapshotStore, MemorySnapshotStore, MetadataStore, SnapshotStore,
};
use crate::platform::StorageRootProvider;
use crate::registry::{NamespaceLease, NamespaceRegistry};
use crate::scheduler::FlushScheduler;
use crate::Result;
use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// A successful read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheObject {
    /// Time since the object was written.
    pub age: Duration,
    /// When the object expires, if ever.
    pub expires: Option<DateTime<Utc>>,
    pub bytes: Vec<u8>,
}

impl CacheObject {
    fn new(entry: &CacheEntryMetadata, bytes: Vec<u8>, now: DateTime<Utc>) -> Self {
        Self {
            age: (now - entry.created).to_std().unwrap_or_default(),
            expires: entry.expires,
            bytes,
        }
    }

    /// The payload as UTF-8, if it is valid UTF-8.
    pub fn text(&self) -> Option<&str> {
        std::str::from_utf8(&self.bytes).ok()
    }

    pub fn is_expired(&self) -> bool {
        self.expires.is_some_and(|expires| expires < Utc::now())
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// Per-id exclusion between writers and removers, striped by id hash.
struct IdLocks {
    stripes: Vec<Mutex<()>>,
}

impl IdLocks {
    fn new(count: usize) -> Self {
        Self {
            stripes: (0..count.max(1)).map(|_| Mutex::new(())).collect(),
        }
    }

    async fn lock(&self, id: &str) -> MutexGuard<'_, ()> {
        let mut hasher = DefaultHasher::new();
        id.hash(&mut hasher);
        let index = (hasher.finish() % self.stripes.len() as u64) as usize;
        self.stripes[index].lock().await
    }
}

struct Inner {
    options: EngineOptions,
    metadata: Arc<MetadataStore>,
    content: Arc<dyn ContentStore>,
    scheduler: FlushScheduler,
    id_locks: IdLocks,
    /// At most one eviction pass runs at a time.
    evict_lock: Mutex<()>,
    _lease: NamespaceLease,
}

/// Disk-backed (or virtual) object cache for one namespace.
///
/// Cloning is cheap and shares the same engine. Only one engine may own a
/// namespace per process; a second open fails with
/// [`crate::ObjCacheError::NamespaceInUse`] until every clone of the first is
/// dropped. Call [`CacheEngine::flush`] before dropping to persist pending
/// metadata immediately.
#[derive(Clone)]
pub struct CacheEngine {
    inner: Arc<Inner>,
}

impl CacheEngine {
    /// Open a namespace under the provider's storage root.
    ///
    /// Uses the filesystem when the root can be resolved and created, and
    /// falls back to the in-memory stores otherwise.
    pub async fn open(options: EngineOptions, provider: &dyn StorageRootProvider) -> Result<Self> {
        let lease = NamespaceRegistry::global().claim(&options.namespace_id)?;
        let namespace = options.namespace_id.clone();

        let (content, snapshots) = match Self::filesystem_stores(&namespace, provider).await {
            Ok((content, snapshots)) => (
                Arc::new(content) as Arc<dyn ContentStore>,
                Arc::new(snapshots) as Arc<dyn SnapshotStore>,
            ),
            Err(e) => {
                warn!("Storage root unusable, using in-memory cache: {}", e);
                (
                    Arc::new(MemoryContentStore::new()) as Arc<dyn ContentStore>,
                    Arc::new(MemorySnapshotStore::new()) as Arc<dyn SnapshotStore>,
                )
            }
        };

        Ok(Self::assemble(options, lease, content, snapshots))
    }

    async fn filesystem_stores(
        namespace: &str,
        provider: &dyn StorageRootProvider,
    ) -> Result<(FsContentStore, FileSnapshotStore)> {
        let root = provider.storage_root().await?;
        let content = FsContentStore::create(root.join(namespace)).await?;
        let snapshot_path = root.join(format!(
            "{}.{}",
            namespace,
            PathsConfig::SNAPSHOT_EXTENSION
        ));
        Ok((content, FileSnapshotStore::new(snapshot_path)))
    }

    /// Build an engine over caller-provided stores.
    pub fn with_stores(
        options: EngineOptions,
        content: Arc<dyn ContentStore>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Result<Self> {
        let lease = NamespaceRegistry::global().claim(&options.namespace_id)?;
        Ok(Self::assemble(options, lease, content, snapshots))
    }

    /// Build an engine that keeps everything in memory.
    pub fn in_memory(options: EngineOptions) -> Result<Self> {
        Self::with_stores(
            options,
            Arc::new(MemoryContentStore::new()),
            Arc::new(MemorySnapshotStore::new()),
        )
    }

    fn assemble(
        options: EngineOptions,
        lease: NamespaceLease,
        content: Arc<dyn ContentStore>,
        snapshots: Arc<dyn SnapshotStore>,
    ) -> Self {
        let metadata = Arc::new(MetadataStore::new(Arc::clone(&snapshots)));
        let scheduler = FlushScheduler::new(Arc::clone(&metadata), snapshots, options.flush_debounce);

        info!(
            "Opened cache namespace {} ({} content store)",
            options.namespace_id,
            content.name()
        );

        Self {
            inner: Arc::new(Inner {
                options,
                metadata,
                content,
                scheduler,
                id_locks: IdLocks::new(CacheDefaults::ID_LOCK_STRIPES),
                evict_lock: Mutex::new(()),
                _lease: lease,
            }),
        }
    }

    pub fn namespace_id(&self) -> &str {
        &self.inner.options.namespace_id
    }

    pub fn options(&self) -> &EngineOptions {
        &self.inner.options
    }

    /// Name of the content backend in use (`filesystem` or `memory`).
    pub fn content_store_name(&self) -> &'static str {
        self.inner.content.name()
    }

    // ========================================
    // Writes
    // ========================================

    /// Store `data` under `id`, expiring after `ttl` if given.
    ///
    /// Returns an error only for an unusable id. A storage failure is logged
    /// and leaves no entry for `id`.
    pub async fn write_bytes(
        &self,
        id: &str,
        data: impl AsRef<[u8]>,
        ttl: Option<Duration>,
    ) -> Result<()> {
        validate_id(id)?;
        self.inner.metadata.load().await;
        let _guard = self.inner.id_locks.lock(id).await;

        let entry = CacheEntryMetadata::new(id, Utc::now(), ttl);
        match self.inner.content.write(id, data.as_ref()).await {
            Ok(()) => {
                self.inner.metadata.put(entry);
                debug!("Cached {} ({} bytes)", id, data.as_ref().len());
            }
            Err(e) => {
                warn!("Failed to write cache content for {}: {}", id, e);
                if self.inner.metadata.remove(id).is_some() {
                    if let Err(e) = self.inner.content.delete(id).await {
                        warn!("Failed to delete stale content for {}: {}", id, e);
                    }
                }
            }
        }

        self.inner.scheduler.schedule();
        Ok(())
    }

    /// UTF-8 convenience wrapper over [`CacheEngine::write_bytes`].
    pub async fn write_string(&self, id: &str, text: &str, ttl: Option<Duration>) -> Result<()> {
        self.write_bytes(id, text.as_bytes(), ttl).await
    }

    // ========================================
    // Reads
    // ========================================

    /// Look up `id`. Any failure is reported as a miss.
    pub async fn get(&self, id: &str) -> Option<CacheObject> {
        if let Err(e) = validate_id(id) {
            debug!("Cache miss for unusable id: {}", e);
            return None;
        }
        self.inner.metadata.load().await;

        if self.inner.options.evict_on_read {
            self.evict_expired_objects().await;
        }

        let entry = self.inner.metadata.get(id)?;
        match self.inner.content.read(id).await {
            Ok(Some(bytes)) => Some(CacheObject::new(&entry, bytes, Utc::now())),
            Ok(None) => {
                warn!("Content missing for cached id {}, dropping metadata", id);
                if self.inner.metadata.remove_if_created(id, entry.created) {
                    self.inner.scheduler.schedule();
                }
                None
            }
            Err(e) => {
                warn!("Failed to read cache content for {}: {}", id, e);
                None
            }
        }
    }

    /// Look up `id` and decode it as UTF-8; invalid UTF-8 is a miss.
    pub async fn get_string(&self, id: &str) -> Option<String> {
        let object = self.get(id).await?;
        match String::from_utf8(object.bytes) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Cached value for {} is not UTF-8: {}", id, e);
                None
            }
        }
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.inner.metadata.load().await;
        self.inner.metadata.contains(id)
    }

    /// Metadata for every entry, in no particular order.
    pub async fn entries(&self) -> Vec<CacheEntryMetadata> {
        self.inner.metadata.load().await;
        self.inner.metadata.entries()
    }

    pub async fn len(&self) -> usize {
        self.inner.metadata.load().await;
        self.inner.metadata.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // ========================================
    // Removal
    // ========================================

    /// Remove `id`. Removing an absent id is a no-op.
    pub async fn remove(&self, id: &str) {
        if let Err(e) = validate_id(id) {
            debug!("Ignoring remove of unusable id: {}", e);
            return;
        }
        self.inner.metadata.load().await;
        let _guard = self.inner.id_locks.lock(id).await;

        self.inner.metadata.remove(id);
        if let Err(e) = self.inner.content.delete(id).await {
            warn!("Failed to delete cache content for {}: {}", id, e);
        }
        self.inner.scheduler.schedule();
    }

    /// Remove everything in this namespace, metadata included.
    pub async fn clear(&self) {
        self.inner.metadata.load().await;
        self.inner.metadata.clear();
        if let Err(e) = self.inner.content.delete_all().await {
            warn!(
                "Failed to clear content for namespace {}: {}",
                self.namespace_id(),
                e
            );
        }
        self.inner.scheduler.schedule();
        info!("Cleared cache namespace {}", self.namespace_id());
    }

    /// Remove every entry whose expiry is before now; returns how many.
    ///
    /// Concurrent passes queue behind each other, so an id is removed by
    /// exactly one pass. An id rewritten after the pass started is kept.
    pub async fn evict_expired_objects(&self) -> usize {
        self.inner.metadata.load().await;
        let _guard = self.inner.evict_lock.lock().await;

        let expired = self.inner.metadata.expired_entries(Utc::now());
        let mut removed = 0;
        for entry in &expired {
            if self.evict_entry(entry).await {
                removed += 1;
            }
        }

        if removed > 0 {
            self.inner.scheduler.schedule();
            debug!("Evicted {} expired cache entries", removed);
        }
        removed
    }

    /// Remove `entry` unless its id has been rewritten since it was copied.
    async fn evict_entry(&self, entry: &CacheEntryMetadata) -> bool {
        let _guard = self.inner.id_locks.lock(&entry.id).await;
        if !self.inner.metadata.remove_if_created(&entry.id, entry.created) {
            return false;
        }
        if let Err(e) = self.inner.content.delete(&entry.id).await {
            warn!("Failed to delete cache content for {}: {}", entry.id, e);
        }
        true
    }

    // ========================================
    // Persistence
    // ========================================

    /// Write the metadata snapshot now instead of waiting for the debounce.
    pub async fn flush(&self) -> Result<()> {
        self.inner.metadata.load().await;
        self.inner.scheduler.flush_now().await
    }

    /// Completed snapshot writes since the engine was opened.
    pub fn flush_count(&self) -> usize {
        self.inner.scheduler.flush_count()
    }
}

impl std::fmt::Debug for CacheEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheEngine")
            .field("namespace_id", &self.inner.options.namespace_id)
            .field("content_store", &self.inner.content.name())
            .field("evict_on_read", &self.inner.options.evict_on_read)
            .finish()
    }
}
