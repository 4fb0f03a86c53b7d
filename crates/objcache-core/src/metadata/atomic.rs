//! Atomic file operations shared by the snapshot and content stores.
//!
//! Writes go through:
//! 1. A sibling temp file with a unique suffix
//! 2. fsync so the data reaches disk
//! 3. An atomic rename over the target
//!
//! A concurrent reader sees either the old file or the new one, never a
//! partially written one.

use crate::config::PathsConfig;
use crate::{ObjCacheError, Result};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Read a whole file, mapping "not found" to `None`.
pub async fn read_optional(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path).await {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(ObjCacheError::Io {
            message: format!("Failed to read {}", path.display()),
            path: Some(path.to_path_buf()),
            source: Some(e),
        }),
    }
}

/// Write bytes to `path` atomically, creating parent directories.
pub async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await.map_err(|e| ObjCacheError::Io {
            message: format!("Failed to create directory {}", parent.display()),
            path: Some(parent.to_path_buf()),
            source: Some(e),
        })?;
    }

    let temp_path = temp_path_for(path);
    if let Err(e) = write_synced(&temp_path, bytes).await {
        discard_temp(&temp_path).await;
        return Err(e);
    }

    if let Err(e) = fs::rename(&temp_path, path).await {
        discard_temp(&temp_path).await;
        return Err(ObjCacheError::Io {
            message: format!(
                "Failed to rename {} to {}",
                temp_path.display(),
                path.display()
            ),
            path: Some(path.to_path_buf()),
            source: Some(e),
        });
    }

    debug!("Atomically wrote {}", path.display());
    Ok(())
}

/// Whether a file name has the `.{name}.{uuid}.tmp` shape of our temp files.
pub fn is_temp_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let Some(stem) = name
        .strip_prefix('.')
        .and_then(|n| n.strip_suffix(PathsConfig::TEMP_SUFFIX))
        .and_then(|n| n.strip_suffix('.'))
    else {
        return false;
    };
    match stem.rsplit_once('.') {
        Some((target, suffix)) => {
            !target.is_empty()
                && suffix.len() == 32
                && suffix.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(
        ".{}.{}.{}",
        name,
        uuid::Uuid::new_v4().simple(),
        PathsConfig::TEMP_SUFFIX
    ))
}

async fn write_synced(temp_path: &Path, bytes: &[u8]) -> Result<()> {
    let io_err = |e: std::io::Error, what: &str| ObjCacheError::Io {
        message: format!("Failed to {} temp file {}", what, temp_path.display()),
        path: Some(temp_path.to_path_buf()),
        source: Some(e),
    };

    let mut file = fs::File::create(temp_path)
        .await
        .map_err(|e| io_err(e, "create"))?;
    file.write_all(bytes).await.map_err(|e| io_err(e, "write"))?;
    file.flush().await.map_err(|e| io_err(e, "flush"))?;
    file.sync_all().await.map_err(|e| io_err(e, "sync"))?;
    Ok(())
}

async fn discard_temp(temp_path: &Path) {
    if let Err(e) = fs::remove_file(temp_path).await {
        if e.kind() != ErrorKind::NotFound {
            warn!("Failed to remove temp file {}: {}", temp_path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_atomic_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("blob.bin");

        atomic_write(&path, b"hello").await.unwrap();
        assert_eq!(read_optional(&path).await.unwrap(), Some(b"hello".to_vec()));

        atomic_write(&path, b"replaced").await.unwrap();
        assert_eq!(
            read_optional(&path).await.unwrap(),
            Some(b"replaced".to_vec())
        );
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("missing");
        assert!(read_optional(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_atomic_write_creates_directories_and_leaves_no_temp() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("dir").join("x.json");

        atomic_write(&path, b"{}").await.unwrap();
        assert!(path.exists());

        let leftovers: Vec<_> = std::fs::read_dir(path.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| is_temp_file(&e.path()))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_temp_file_detection() {
        let temp = temp_path_for(Path::new("/root/ns/logo.png"));
        assert!(is_temp_file(&temp));
        assert!(!is_temp_file(Path::new("/root/ns/logo.png")));
        assert!(!is_temp_file(Path::new("/root/ns/.notes.tmp")));
        assert!(!is_temp_file(Path::new("/root/ns/.a.not-a-uuid.tmp")));
    }
}
