//! Centralized configuration for objcache.
//!
//! Constant holders for defaults and on-disk naming, plus the per-engine
//! construction options.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Engine-wide defaults.
pub struct CacheDefaults;

impl CacheDefaults {
    /// Quiet period before a burst of mutations is flushed to the snapshot.
    pub const FLUSH_DEBOUNCE: Duration = Duration::from_millis(500);
    pub const EVICT_ON_READ: bool = false;
    pub const NAMESPACE_ID: &'static str = "default";
    /// Lock stripes serializing work on the same id.
    pub const ID_LOCK_STRIPES: usize = 64;
}

/// Directory and file naming under the storage root.
pub struct PathsConfig;

impl PathsConfig {
    pub const APP_DIR_NAME: &'static str = "objcache";
    pub const SNAPSHOT_EXTENSION: &'static str = "json";
    pub const TEMP_SUFFIX: &'static str = "tmp";
}

/// Options for constructing a [`crate::CacheEngine`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct EngineOptions {
    /// Namespace identifier; names the snapshot file and the content root.
    pub namespace_id: String,
    /// Run an eviction pass before every `get`.
    #[serde(default)]
    pub evict_on_read: bool,
    /// Trailing debounce window for metadata snapshot writes.
    #[serde(default = "default_flush_debounce", with = "duration_millis")]
    pub flush_debounce: Duration,
}

fn default_flush_debounce() -> Duration {
    CacheDefaults::FLUSH_DEBOUNCE
}

impl EngineOptions {
    pub fn new(namespace_id: impl Into<String>) -> Self {
        Self {
            namespace_id: namespace_id.into(),
            evict_on_read: CacheDefaults::EVICT_ON_READ,
            flush_debounce: CacheDefaults::FLUSH_DEBOUNCE,
        }
    }

    pub fn evict_on_read(mut self, enabled: bool) -> Self {
        self.evict_on_read = enabled;
        self
    }

    pub fn flush_debounce(mut self, debounce: Duration) -> Self {
        self.flush_debounce = debounce;
        self
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
