//! In-process object store

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::{ObjectInfo, ObjectStore, StorageError, StorageResult, UploadResult};

#[derive(Debug, Clone)]
struct StoredObject {
    data: Vec<u8>,
    content_type: Option<String>,
}

type Buckets = HashMap<String, BTreeMap<String, StoredObject>>;

/// Object store kept in memory, with S3-like semantics: writes to a missing
/// bucket fail, writes to an existing key overwrite it.
///
/// Counts every call so tests can assert that a request never reached the
/// store, and can be told to fail uploads.
#[derive(Default)]
pub struct MemoryStorage {
    buckets: Mutex<Buckets>,
    operations: AtomicUsize,
    fail_puts: AtomicBool,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `put` fail until reset.
    pub fn set_fail_puts(&self, fail: bool) {
        self.fail_puts.store(fail, Ordering::SeqCst);
    }

    /// Number of trait calls served so far.
    pub fn operation_count(&self) -> usize {
        self.operations.load(Ordering::SeqCst)
    }

    /// Number of objects stored in `bucket`.
    pub fn object_count(&self, bucket: &str) -> usize {
        self.buckets().get(bucket).map_or(0, BTreeMap::len)
    }

    /// Content type recorded for an object.
    pub fn content_type(&self, bucket: &str, key: &str) -> Option<String> {
        self.buckets()
            .get(bucket)
            .and_then(|objects| objects.get(key))
            .and_then(|obj| obj.content_type.clone())
    }

    fn buckets(&self) -> MutexGuard<'_, Buckets> {
        self.buckets
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record(&self) {
        self.operations.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ObjectStore for MemoryStorage {
    async fn ensure_bucket(&self, bucket: &str) -> StorageResult<bool> {
        self.record();
        let mut buckets = self.buckets();
        if buckets.contains_key(bucket) {
            return Ok(false);
        }
        buckets.insert(bucket.to_string(), BTreeMap::new());
        Ok(true)
    }

    async fn put(
        &self,
        bucket: &str,
        key: &str,
        data: Vec<u8>,
        content_type: Option<&str>,
    ) -> StorageResult<UploadResult> {
        self.record();
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StorageError::Backend(format!("Failed to upload {}", key)));
        }

        let mut buckets = self.buckets();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;

        let result = UploadResult {
            key: key.to_string(),
            size: data.len() as i64,
        };
        objects.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.map(str::to_string),
            },
        );

        Ok(result)
    }

    async fn get(&self, bucket: &str, key: &str) -> StorageResult<Vec<u8>> {
        self.record();
        let buckets = self.buckets();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        objects
            .get(key)
            .map(|obj| obj.data.clone())
            .ok_or_else(|| StorageError::not_found(bucket, key))
    }

    async fn exists(&self, bucket: &str, key: &str) -> StorageResult<bool> {
        self.record();
        Ok(self
            .buckets()
            .get(bucket)
            .is_some_and(|objects| objects.contains_key(key)))
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.record();
        let mut buckets = self.buckets();
        let objects = buckets
            .get_mut(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;
        objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(bucket, key))
    }

    async fn list(&self, bucket: &str, prefix: Option<&str>) -> StorageResult<Vec<ObjectInfo>> {
        self.record();
        let buckets = self.buckets();
        let objects = buckets
            .get(bucket)
            .ok_or_else(|| StorageError::BucketNotFound(bucket.to_string()))?;

        Ok(objects
            .iter()
            .filter(|(key, _)| prefix.map_or(true, |p| key.starts_with(p)))
            .map(|(key, obj)| ObjectInfo {
                key: key.clone(),
                size: obj.data.len() as i64,
            })
            .collect())
    }

    async fn ping(&self) -> StorageResult<()> {
        Ok(())
    }
}
