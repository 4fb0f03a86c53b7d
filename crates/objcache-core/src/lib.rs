//! objcache - embeddable disk-backed object cache.
//!
//! Callers store byte blobs under string ids, optionally with a TTL, and later
//! read, list, or evict them. Each namespace keeps a metadata index (id →
//! created/expires) alongside a content store, persists the index as a single
//! JSON snapshot with debounced writes, and repairs itself when content goes
//! missing underneath it.
//!
//! # Example
//!
//! ```rust,no_run
//! use objcache::{CacheEngine, EngineOptions, SystemTempRoot};
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> objcache::Result<()> {
//!     let cache = CacheEngine::open(
//!         EngineOptions::new("thumbnails").evict_on_read(true),
//!         &SystemTempRoot::default(),
//!     )
//!     .await?;
//!
//!     cache
//!         .write_bytes("images/logo.png", b"...", Some(Duration::from_secs(3600)))
//!         .await?;
//!
//!     if let Some(object) = cache.get("images/logo.png").await {
//!         println!("{} bytes, {:?} old", object.bytes.len(), object.age);
//!     }
//!
//!     cache.flush().await?;
//!     Ok(())
//! }
//! ```
//!
//! # Ownership
//!
//! One engine owns a namespace. Opening the same namespace twice in one
//! process is rejected; sharing a namespace between processes is not
//! supported and is not detected.

pub mod config;
pub mod content;
pub mod engine;
pub mod error;
pub mod metadata;
pub mod platform;
pub mod registry;
pub mod scheduler;

// Re-export commonly used types
pub use config::{CacheDefaults, EngineOptions, PathsConfig};
pub use content::{ContentStore, FsContentStore, MemoryContentStore};
pub use engine::{CacheEngine, CacheObject};
pub use error::{ObjCacheError, Result};
pub use metadata::{
    CacheEntryMetadata, FileSnapshotStore, MemorySnapshotStore, MetadataStore, SnapshotStore,
};
pub use platform::{FixedStorageRoot, StorageRootProvider, SystemTempRoot};
pub use registry::NamespaceRegistry;
pub use scheduler::FlushScheduler;
