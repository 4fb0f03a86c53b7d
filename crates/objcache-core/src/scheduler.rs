//! Trailing-debounce scheduler for metadata snapshot writes.
//!
//! Every mutation calls [`FlushScheduler::schedule`]. Each call aborts the
//! previous pending timer, so a burst of N mutations inside the debounce
//! window produces a single snapshot write. The write serializes the metadata
//! as it is when the timer fires, not as it was when the flush was scheduled.

use crate::metadata::{MetadataStore, SnapshotStore};
use crate::Result;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::{debug, warn};

struct Shared {
    metadata: Arc<MetadataStore>,
    snapshots: Arc<dyn SnapshotStore>,
    debounce: Duration,
    /// Bumped by every schedule/flush; a timer only fires if it is still current.
    generation: AtomicU64,
    /// Held for the duration of a snapshot write so writes never overlap.
    in_flight: Mutex<()>,
    flushes: AtomicUsize,
    /// The sleeping timer, if one is pending.
    pending: StdMutex<Option<AbortHandle>>,
}

impl Shared {
    async fn flush(&self) -> Result<()> {
        let _guard = self.in_flight.lock().await;
        let bytes = self.metadata.serialize()?;
        self.snapshots.write(&bytes).await?;
        self.flushes.fetch_add(1, Ordering::SeqCst);
        debug!("Flushed metadata snapshot ({} bytes)", bytes.len());
        Ok(())
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<AbortHandle>> {
        self.pending.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Debounced flusher for one namespace's metadata.
#[derive(Clone)]
pub struct FlushScheduler {
    shared: Arc<Shared>,
}

impl FlushScheduler {
    pub fn new(
        metadata: Arc<MetadataStore>,
        snapshots: Arc<dyn SnapshotStore>,
        debounce: Duration,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                metadata,
                snapshots,
                debounce,
                generation: AtomicU64::new(0),
                in_flight: Mutex::new(()),
                flushes: AtomicUsize::new(0),
                pending: StdMutex::new(None),
            }),
        }
    }

    pub fn debounce(&self) -> Duration {
        self.shared.debounce
    }

    /// Request a flush after the debounce window, replacing any pending one.
    ///
    /// Must be called from within a Tokio runtime; outside one the request is
    /// dropped with a warning and the next flush picks the change up.
    pub fn schedule(&self) {
        // Held until the new timer is installed so concurrent calls cannot
        // leave an older generation's timer as the pending one.
        let mut pending = self.shared.lock_pending();
        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let handle = match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle,
            Err(_) => {
                warn!("No async runtime available, metadata flush not scheduled");
                return;
            }
        };

        let shared = Arc::clone(&self.shared);
        let flusher = handle.clone();
        let timer = handle.spawn(async move {
            tokio::time::sleep(shared.debounce).await;
            if shared.generation.load(Ordering::SeqCst) != generation {
                return;
            }
            // The write runs as its own task so aborting a timer never
            // interrupts a snapshot write.
            flusher.spawn(async move {
                if let Err(e) = shared.flush().await {
                    warn!("Failed to flush metadata snapshot: {}", e);
                }
            });
        });
        if let Some(previous) = pending.replace(timer.abort_handle()) {
            previous.abort();
        }
    }

    /// Flush right now, cancelling any pending timer.
    pub async fn flush_now(&self) -> Result<()> {
        {
            let mut pending = self.shared.lock_pending();
            self.shared.generation.fetch_add(1, Ordering::SeqCst);
            if let Some(previous) = pending.take() {
                previous.abort();
            }
        }
        self.shared.flush().await
    }

    /// Whether a debounced flush is waiting to fire.
    pub fn has_pending(&self) -> bool {
        self.shared
            .lock_pending()
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Number of snapshot writes that have completed.
    pub fn flush_count(&self) -> usize {
        self.shared.flushes.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{CacheEntryMetadata, MemorySnapshotStore};
    use chrono::Utc;

    fn scheduler(debounce: Duration) -> (Arc<MetadataStore>, Arc<MemorySnapshotStore>, FlushScheduler) {
        let snapshots = Arc::new(MemorySnapshotStore::new());
        let metadata = Arc::new(MetadataStore::new(snapshots.clone()));
        let scheduler = FlushScheduler::new(metadata.clone(), snapshots.clone(), debounce);
        (metadata, snapshots, scheduler)
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_produces_single_flush() {
        let (metadata, snapshots, scheduler) = scheduler(Duration::from_millis(100));

        for i in 0..10 {
            metadata.put(CacheEntryMetadata::new(format!("k{i}"), Utc::now(), None));
            scheduler.schedule();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(snapshots.write_count(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(snapshots.write_count(), 1);
        assert_eq!(scheduler.flush_count(), 1);

        let written: serde_json::Value =
            serde_json::from_slice(&snapshots.contents().unwrap()).unwrap();
        assert_eq!(written.as_object().unwrap().len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flushes_state_at_fire_time() {
        let (metadata, snapshots, scheduler) = scheduler(Duration::from_millis(100));

        scheduler.schedule();
        tokio::time::sleep(Duration::from_millis(50)).await;
        // Mutation without a reschedule still lands in the pending flush.
        metadata.put(CacheEntryMetadata::new("late", Utc::now(), None));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let written: serde_json::Value =
            serde_json::from_slice(&snapshots.contents().unwrap()).unwrap();
        assert!(written.get("late").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_separate_bursts_flush_separately() {
        let (_metadata, snapshots, scheduler) = scheduler(Duration::from_millis(100));

        scheduler.schedule();
        tokio::time::sleep(Duration::from_millis(150)).await;
        scheduler.schedule();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(snapshots.write_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_aborts_previous_timer() {
        let (_metadata, snapshots, scheduler) = scheduler(Duration::from_millis(100));

        scheduler.schedule();
        let first = scheduler
            .shared
            .pending
            .lock()
            .unwrap()
            .clone()
            .unwrap();
        scheduler.schedule();
        tokio::time::sleep(Duration::from_millis(1)).await;

        assert!(first.is_finished());
        assert!(scheduler.has_pending());

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!scheduler.has_pending());
        assert_eq!(snapshots.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_now_supersedes_pending() {
        let (_metadata, snapshots, scheduler) = scheduler(Duration::from_millis(100));

        scheduler.schedule();
        scheduler.flush_now().await.unwrap();
        assert_eq!(snapshots.write_count(), 1);
        assert!(!scheduler.has_pending());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(snapshots.write_count(), 1);
    }
}
