//! Storage root providers.
//!
//! A storage root is the writable directory under which each namespace keeps
//! its snapshot file (`<root>/<namespace>.json`) and its content directory
//! (`<root>/<namespace>/`).

use crate::config::PathsConfig;
use crate::{ObjCacheError, Result};
use async_trait::async_trait;
use std::path::PathBuf;

/// Supplies the storage root for cache namespaces.
#[async_trait]
pub trait StorageRootProvider: Send + Sync {
    async fn storage_root(&self) -> Result<PathBuf>;
}

/// A caller-chosen directory.
#[derive(Debug, Clone)]
pub struct FixedStorageRoot(pub PathBuf);

impl FixedStorageRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }
}

#[async_trait]
impl StorageRootProvider for FixedStorageRoot {
    async fn storage_root(&self) -> Result<PathBuf> {
        Ok(self.0.clone())
    }
}

/// The platform cache directory, or the system temp directory when the
/// platform has none, joined with an application directory name.
///
/// # Platform Behavior
/// - **Linux**: `$XDG_CACHE_HOME/<app>` or `~/.cache/<app>`
/// - **macOS**: `~/Library/Caches/<app>`
/// - **Windows**: `{FOLDERID_LocalAppData}\<app>`
/// - **Other**: `std::env::temp_dir()/<app>`
#[derive(Debug, Clone)]
pub struct SystemTempRoot {
    app_dir_name: String,
}

impl SystemTempRoot {
    pub fn new(app_dir_name: impl Into<String>) -> Self {
        Self {
            app_dir_name: app_dir_name.into(),
        }
    }
}

impl Default for SystemTempRoot {
    fn default() -> Self {
        Self::new(PathsConfig::APP_DIR_NAME)
    }
}

#[async_trait]
impl StorageRootProvider for SystemTempRoot {
    async fn storage_root(&self) -> Result<PathBuf> {
        if self.app_dir_name.is_empty() {
            return Err(ObjCacheError::Config {
                message: "Application directory name is empty".to_string(),
            });
        }
        let base = dirs::cache_dir().unwrap_or_else(std::env::temp_dir);
        Ok(base.join(&self.app_dir_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fixed_root() {
        let provider = FixedStorageRoot::new("/var/tmp/objcache-test");
        assert_eq!(
            provider.storage_root().await.unwrap(),
            PathBuf::from("/var/tmp/objcache-test")
        );
    }

    #[tokio::test]
    async fn test_system_root_ends_with_app_dir() {
        let root = SystemTempRoot::default().storage_root().await.unwrap();
        assert!(root.ends_with(PathsConfig::APP_DIR_NAME));
    }

    #[tokio::test]
    async fn test_system_root_rejects_empty_name() {
        assert!(SystemTempRoot::new("").storage_root().await.is_err());
    }
}
