use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use super::{BlobStore, StoreError};

/// In-process blob store for standalone runs and tests.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: DashMap<String, Bytes>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the store with `(name, content)` pairs.
    pub fn with_blobs<N, C>(blobs: impl IntoIterator<Item = (N, C)>) -> Self
    where
        N: Into<String>,
        C: Into<Bytes>,
    {
        let store = Self::new();
        for (name, content) in blobs {
            store.blobs.insert(name.into(), content.into());
        }
        store
    }

    pub fn len(&self) -> usize {
        self.blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.is_empty()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn read(&self, name: &str) -> Result<Bytes, StoreError> {
        self.blobs
            .get(name)
            .map(|blob| blob.value().clone())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    async fn write(&self, name: &str, data: Bytes) -> Result<(), StoreError> {
        self.blobs.insert(name.to_string(), data);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut names: Vec<String> = self
            .blobs
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        Ok(names)
    }
}
