//! Blob storage for map inputs, intermediate shards and reduce outputs.
//!
//! Workers share no memory; they only meet through blob names. Every worker
//! and every attempt of a unit must derive the same names, which is what the
//! naming functions in this module are for.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

mod local;
mod memory;

pub use local::LocalBlobStore;
pub use memory::MemoryBlobStore;

/// Prefix shared by every final output blob.
pub const OUTPUT_PREFIX: &str = "mr-out-";

/// Name of the shard written by map unit `map_index` for reduce bucket `bucket`.
pub fn intermediate_name(map_index: u32, bucket: u32) -> String {
    format!("mr-{map_index}-{bucket}")
}

/// Name of the final output of reduce bucket `bucket`.
pub fn output_name(bucket: u32) -> String {
    format!("{OUTPUT_PREFIX}{bucket}")
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("blob `{0}` not found")]
    NotFound(String),

    #[error("I/O error on blob `{name}`: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(name: &str, source: std::io::Error) -> Self {
        if source.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(name.to_string())
        } else {
            StoreError::Io {
                name: name.to_string(),
                source,
            }
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Read/write/list access to named blobs.
///
/// A write replaces the whole blob; readers observe either the old or the new
/// content, never a mix.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Read the full content of `name`.
    async fn read(&self, name: &str) -> Result<Bytes, StoreError>;

    /// Create or replace `name` with `data`.
    async fn write(&self, name: &str, data: Bytes) -> Result<(), StoreError>;

    /// Names starting with `prefix`, sorted.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError>;
}

#[async_trait]
impl<T: BlobStore + ?Sized> BlobStore for Arc<T> {
    async fn read(&self, name: &str) -> Result<Bytes, StoreError> {
        (**self).read(name).await
    }

    async fn write(&self, name: &str, data: Bytes) -> Result<(), StoreError> {
        (**self).write(name, data).await
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        (**self).list(prefix).await
    }
}
