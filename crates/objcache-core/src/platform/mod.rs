//! Platform abstraction layer.
//!
//! Everything that depends on where the host keeps temporary or cache data
//! lives here, behind [`StorageRootProvider`], so the engine never resolves
//! platform directories itself.

pub mod paths;

pub use paths::{FixedStorageRoot, StorageRootProvider, SystemTempRoot};
