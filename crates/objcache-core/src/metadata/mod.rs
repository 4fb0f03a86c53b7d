//! Metadata index and its persistence.
//!
//! This module provides:
//! - The identifier → timestamps index for a namespace
//! - Snapshot stores (JSON file or in-memory) the index is flushed to
//! - Atomic temp-then-rename file writes shared with the content store

pub(crate) mod atomic;
mod snapshot;
mod store;

pub use snapshot::{FileSnapshotStore, MemorySnapshotStore, SnapshotStore};
pub use store::{CacheEntryMetadata, MetadataStore};
