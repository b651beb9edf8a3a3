//! Object storage capability
//!
//! Songs and separated tracks live in an S3-compatible object store, split
//! across two buckets. The pipeline only depends on the [`ObjectStore`]
//! trait; [`S3Storage`] talks to MinIO/S3 and [`MemoryStorage`] keeps
//! objects in process for tests.
//!
//! Writes overwrite by key, so uploading the same part twice is harmless.

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use std::path::Path;
use thiserror::Error;
use tokio_util::bytes::Bytes;

pub mod config;
pub mod memory;
pub mod s3;

pub use memory::MemoryStorage;
pub use s3::S3Storage;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object '{key}' not found in bucket '{bucket}'")]
    NotFound { bucket: String, key: String },

    #[error("Bucket '{0}' does not exist")]
    BucketNotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn not_found(bucket: &str, key: &str) -> Self {
        Self::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub key: String,
    pub size: i64,
}

/// Body of a stored object, read in chunks.
pub type ObjectStream = BoxStream<'static, std::io::Result<Bytes>>;

/// Listing entry for one stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectInfo {
    pub key: String,
    pub size: i64,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create `bucket` unless it already exists. Returns `true` if created.
    async fn ensure_bucket(&self, bucket: &str) -> StorageResult<bool>;

    /// Store `data` at `key`, replacing any existing object.
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> StorageResult<UploadResult>;

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>>;

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool>;

    /// Remove `key`. A missing object is reported as `NotFound`.
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()>;

    /// Every object in `bucket` whose key starts with `prefix`, in key order.
    async fn list(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<Vec<ObjectInfo>>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> StorageResult<()>;

    /// Open an object for streaming. A missing object fails here, before any
    /// chunk is produced.
    async fn get_stream(&self, bucket: &str, key: &str) -> StorageResult<ObjectStream> {
        let data = self.get(bucket, key).await?;
        Ok(stream::once(async move { Ok(Bytes::from(data)) }).boxed())
    }

    /// Upload a local file.
    async fn put_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: Option<&str>,
    ) -> StorageResult<UploadResult> {
        let data = tokio::fs::read(path).await?;
        self.put(bucket, key, data, content_type).await
    }

    /// Download an object into a local file, returning its size.
    async fn get_to_file(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<u64> {
        let data = self.get(bucket, key).await?;
        tokio::fs::write(path, &data).await?;
        Ok(data.len() as u64)
    }
}
