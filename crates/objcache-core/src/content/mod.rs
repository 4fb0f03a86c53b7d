//! Content stores: where cached bytes live.
//!
//! Two interchangeable backends implement [`ContentStore`]:
//! - `FsContentStore` - one file per id under a namespace directory
//! - `MemoryContentStore` - a map, used when no writable filesystem exists
//!
//! Ids may contain `/` (or `\`) to form a hierarchy, e.g. `images/logo.png`.

mod fs;
mod memory;

pub use fs::FsContentStore;
pub use memory::MemoryContentStore;

use crate::{ObjCacheError, Result};
use async_trait::async_trait;
use std::path::{Component, Path, PathBuf};

/// Capability set shared by every content backend.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    /// Store `bytes` under `id`, replacing any previous content.
    async fn write(&self, id: &str, bytes: &[u8]) -> Result<()>;

    /// Read the content for `id`.
    ///
    /// `Ok(None)` means the content does not exist; it is an expected outcome,
    /// not a failure.
    async fn read(&self, id: &str) -> Result<Option<Vec<u8>>>;

    /// Delete `id`. Deleting something that does not exist succeeds.
    async fn delete(&self, id: &str) -> Result<()>;

    /// Delete everything in this store, continuing past individual failures.
    async fn delete_all(&self) -> Result<()>;
}

/// Check that `id` is a usable relative key and split it into segments.
///
/// Rejects empty ids, empty segments (leading, trailing or doubled
/// separators), `.` and `..`, and anything the platform would read as an
/// absolute path or drive prefix.
pub fn validate_id(id: &str) -> Result<Vec<&str>> {
    if id.is_empty() {
        return Err(ObjCacheError::invalid_id(id, "id is empty"));
    }
    if id.contains('\0') {
        return Err(ObjCacheError::invalid_id(id, "id contains a NUL byte"));
    }

    let segments: Vec<&str> = id.split(|c: char| c == '/' || c == '\\').collect();
    for segment in &segments {
        match *segment {
            "" => return Err(ObjCacheError::invalid_id(id, "empty path segment")),
            "." | ".." => {
                return Err(ObjCacheError::invalid_id(id, "relative path segment"))
            }
            _ => {}
        }
        if !Path::new(segment)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
        {
            return Err(ObjCacheError::invalid_id(id, "segment is not a plain name"));
        }
    }
    Ok(segments)
}

/// Relative path for a validated id.
pub(crate) fn relative_path(id: &str) -> Result<PathBuf> {
    Ok(validate_id(id)?.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_ids() {
        assert_eq!(validate_id("logo.png").unwrap(), vec!["logo.png"]);
        assert_eq!(
            validate_id("images/icons/logo.png").unwrap(),
            vec!["images", "icons", "logo.png"]
        );
        assert_eq!(
            relative_path("a\\b").unwrap(),
            PathBuf::from("a").join("b")
        );
    }

    #[test]
    fn test_invalid_ids() {
        for id in ["", "/etc/passwd", "a//b", "a/", "../x", "a/./b", "a/../../b", "nul\0"] {
            assert!(
                matches!(validate_id(id), Err(ObjCacheError::InvalidId { .. })),
                "expected {id:?} to be rejected"
            );
        }
    }
}
