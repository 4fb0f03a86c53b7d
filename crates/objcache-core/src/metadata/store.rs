//! In-memory metadata index, lazily hydrated from a snapshot.

use super::snapshot::SnapshotStore;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Metadata for one cached object.
///
/// Serialized form is `{"id": .., "created": <epoch ms>, "expires": <epoch ms>}`
/// with `expires` omitted for entries that never expire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntryMetadata {
    pub id: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created: DateTime<Utc>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_milliseconds_option"
    )]
    pub expires: Option<DateTime<Utc>>,
}

impl CacheEntryMetadata {
    /// Build an entry created at `now`, expiring `ttl` later if given.
    pub fn new(id: impl Into<String>, now: DateTime<Utc>, ttl: Option<std::time::Duration>) -> Self {
        let expires = ttl.map(|ttl| {
            chrono::Duration::from_std(ttl)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
                .unwrap_or(DateTime::<Utc>::MAX_UTC)
        });
        Self {
            id: id.into(),
            created: now,
            expires,
        }
    }

    /// Expired means `expires` is strictly before `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires.is_some_and(|expires| expires < now)
    }
}

type EntryMap = HashMap<String, CacheEntryMetadata>;

/// Identifier → metadata map for a single namespace.
///
/// Mutations are synchronous; the lock is never held across an await, so a
/// `put` is visible to the very next `get` from the same caller. Persistence
/// is not triggered here; the engine schedules flushes.
pub struct MetadataStore {
    snapshots: Arc<dyn SnapshotStore>,
    entries: Mutex<EntryMap>,
    hydrated: OnceCell<()>,
}

impl MetadataStore {
    pub fn new(snapshots: Arc<dyn SnapshotStore>) -> Self {
        Self {
            snapshots,
            entries: Mutex::new(HashMap::new()),
            hydrated: OnceCell::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, EntryMap> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Hydrate from the snapshot on first call; later calls return at once.
    ///
    /// A missing, unreadable or corrupt snapshot leaves the store empty.
    pub async fn load(&self) {
        self.hydrated
            .get_or_init(|| async {
                let loaded = match self.snapshots.read().await {
                    Ok(Some(bytes)) => parse_snapshot(&bytes),
                    Ok(None) => {
                        debug!("No metadata snapshot found, starting cold");
                        EntryMap::new()
                    }
                    Err(e) => {
                        warn!("Failed to read metadata snapshot, starting cold: {}", e);
                        EntryMap::new()
                    }
                };

                let mut entries = self.lock();
                for (id, entry) in loaded {
                    entries.entry(id).or_insert(entry);
                }
                debug!("Hydrated {} metadata entries", entries.len());
            })
            .await;
    }

    pub fn is_loaded(&self) -> bool {
        self.hydrated.initialized()
    }

    pub fn get(&self, id: &str) -> Option<CacheEntryMetadata> {
        self.lock().get(id).cloned()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lock().contains_key(id)
    }

    /// Insert or overwrite by id.
    pub fn put(&self, entry: CacheEntryMetadata) {
        self.lock().insert(entry.id.clone(), entry);
    }

    /// Remove by id; absent ids are a no-op.
    pub fn remove(&self, id: &str) -> Option<CacheEntryMetadata> {
        self.lock().remove(id)
    }

    /// Remove only if the stored entry still has the given creation time.
    ///
    /// Returns whether an entry was removed.
    pub fn remove_if_created(&self, id: &str, created: DateTime<Utc>) -> bool {
        let mut entries = self.lock();
        match entries.get(id) {
            Some(entry) if entry.created == created => {
                entries.remove(id);
                true
            }
            _ => false,
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn entries(&self) -> Vec<CacheEntryMetadata> {
        self.lock().values().cloned().collect()
    }

    /// Entries whose expiry is strictly before `now`, copied out of the map.
    pub fn expired_entries(&self, now: DateTime<Utc>) -> Vec<CacheEntryMetadata> {
        self.lock()
            .values()
            .filter(|entry| entry.is_expired_at(now))
            .cloned()
            .collect()
    }

    /// Encode the full map as a JSON snapshot. Key order is unspecified.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let entries = self.lock();
        Ok(serde_json::to_vec(&*entries)?)
    }
}

fn parse_snapshot(bytes: &[u8]) -> EntryMap {
    match serde_json::from_slice::<EntryMap>(bytes) {
        Ok(map) => map
            .into_iter()
            .map(|(key, mut entry)| {
                if entry.id != key {
                    warn!("Snapshot entry {:?} stored under key {:?}, using key", entry.id, key);
                    entry.id = key.clone();
                }
                (key, entry)
            })
            .collect(),
        Err(e) => {
            warn!("Corrupt metadata snapshot, starting cold: {}", e);
            EntryMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MemorySnapshotStore;
    use chrono::TimeZone;
    use std::time::Duration;

    fn store_with(bytes: Option<&[u8]>) -> MetadataStore {
        let snapshots = match bytes {
            Some(b) => MemorySnapshotStore::with_contents(b),
            None => MemorySnapshotStore::new(),
        };
        MetadataStore::new(Arc::new(snapshots))
    }

    #[test]
    fn test_snapshot_format() {
        let created = Utc.timestamp_millis_opt(1_700_000_000_000).unwrap();
        let entry = CacheEntryMetadata::new("a/b.png", created, Some(Duration::from_secs(1)));

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["id"], "a/b.png");
        assert_eq!(json["created"], 1_700_000_000_000i64);
        assert_eq!(json["expires"], 1_700_000_001_000i64);

        let forever = CacheEntryMetadata::new("x", created, None);
        let json = serde_json::to_value(&forever).unwrap();
        assert!(json.get("expires").is_none());
    }

    #[test]
    fn test_expiry_is_strict() {
        let now = Utc::now();
        let entry = CacheEntryMetadata {
            id: "x".into(),
            created: now,
            expires: Some(now),
        };
        assert!(!entry.is_expired_at(now));
        assert!(entry.is_expired_at(now + chrono::Duration::milliseconds(1)));
        assert!(!CacheEntryMetadata::new("y", now, None).is_expired_at(DateTime::<Utc>::MAX_UTC));
    }

    #[tokio::test]
    async fn test_load_existing_snapshot() {
        let snapshot = br#"{"k":{"id":"k","created":1000,"expires":2000},"n":{"id":"n","created":5}}"#;
        let store = store_with(Some(&snapshot[..]));
        store.load().await;

        assert!(store.is_loaded());
        assert_eq!(store.len(), 2);
        let k = store.get("k").unwrap();
        assert_eq!(k.created.timestamp_millis(), 1000);
        assert_eq!(k.expires.unwrap().timestamp_millis(), 2000);
        assert!(store.get("n").unwrap().expires.is_none());
    }

    #[tokio::test]
    async fn test_corrupt_snapshot_loads_empty() {
        let store = store_with(Some(&b"{\"k\":{\"id\":\"k\",\"crea"[..]));
        store.load().await;
        assert!(store.is_loaded());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_mismatched_key_uses_key() {
        let store = store_with(Some(&br#"{"real":{"id":"other","created":1}}"#[..]));
        store.load().await;
        assert_eq!(store.get("real").unwrap().id, "real");
    }

    #[tokio::test]
    async fn test_put_remove_and_serialize() {
        let store = store_with(None);
        store.load().await;

        let now = Utc::now();
        store.put(CacheEntryMetadata::new("a", now, None));
        store.put(CacheEntryMetadata::new("b", now, None));
        assert!(store.remove("a").is_some());
        assert!(store.remove("a").is_none());

        let parsed: HashMap<String, CacheEntryMetadata> =
            serde_json::from_slice(&store.serialize().unwrap()).unwrap();
        assert_eq!(parsed.len(), 1);
        assert!(parsed.contains_key("b"));
    }

    #[tokio::test]
    async fn test_remove_if_created_guards_rewrites() {
        let store = store_with(None);
        let first = Utc::now();
        store.put(CacheEntryMetadata::new("a", first, None));

        let second = first + chrono::Duration::seconds(1);
        store.put(CacheEntryMetadata::new("a", second, None));

        assert!(!store.remove_if_created("a", first));
        assert!(store.contains("a"));
        assert!(store.remove_if_created("a", second));
        assert!(!store.contains("a"));
    }

    #[test]
    fn test_expired_entries() {
        let store = store_with(None);
        let now = Utc::now();
        let past = now - chrono::Duration::seconds(10);
        store.put(CacheEntryMetadata::new("old", past, Some(Duration::from_secs(1))));
        store.put(CacheEntryMetadata::new("fresh", now, Some(Duration::from_secs(60))));
        store.put(CacheEntryMetadata::new("forever", past, None));

        let expired = store.expired_entries(now);
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].id, "old");
        assert_eq!(expired[0].created, past);
    }
}
