//! In-memory (virtual) content store.

use super::{validate_id, ContentStore};
use crate::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct VirtualFile {
    bytes: Vec<u8>,
    modified: DateTime<Utc>,
}

/// Content held in a map, for hosts without a usable filesystem.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    files: Mutex<HashMap<String, VirtualFile>>,
}

impl MemoryContentStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, VirtualFile>> {
        self.files.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// When `id` was last written.
    pub fn modified(&self, id: &str) -> Option<DateTime<Utc>> {
        self.lock().get(id).map(|f| f.modified)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn write(&self, id: &str, bytes: &[u8]) -> Result<()> {
        validate_id(id)?;
        self.lock().insert(
            id.to_string(),
            VirtualFile {
                bytes: bytes.to_vec(),
                modified: Utc::now(),
            },
        );
        Ok(())
    }

    async fn read(&self, id: &str) -> Result<Option<Vec<u8>>> {
        validate_id(id)?;
        Ok(self.lock().get(id).map(|f| f.bytes.clone()))
    }

    async fn delete(&self, id: &str) -> Result<()> {
        validate_id(id)?;
        self.lock().remove(id);
        Ok(())
    }

    async fn delete_all(&self) -> Result<()> {
        self.lock().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_virtual_store_contract() {
        let store = MemoryContentStore::new();

        store.write("images/logo.png", b"png").await.unwrap();
        assert_eq!(
            store.read("images/logo.png").await.unwrap(),
            Some(b"png".to_vec())
        );
        assert!(store.modified("images/logo.png").is_some());
        assert!(store.read("missing").await.unwrap().is_none());

        store.delete("images/logo.png").await.unwrap();
        store.delete("images/logo.png").await.unwrap();
        assert!(store.is_empty());

        store.write("a", b"1").await.unwrap();
        store.write("b", b"2").await.unwrap();
        store.delete_all().await.unwrap();
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_virtual_store_validates_ids() {
        let store = MemoryContentStore::new();
        assert!(store.write("../x", b"1").await.is_err());
    }
}
