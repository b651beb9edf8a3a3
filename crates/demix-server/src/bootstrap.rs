//! Backend setup shared by the binaries

use demix_common::types::{SONGS_BUCKET, TRACKS_BUCKET};
use std::sync::Arc;

use crate::queue::{JobQueue, PgQueue, QueueConfig, QueueResult};
use crate::storage::{config::StorageConfig, ObjectStore, S3Storage};

/// Connect to the queue database and run migrations.
pub async fn connect_queue(config: &QueueConfig) -> QueueResult<Arc<dyn JobQueue>> {
    Ok(Arc::new(PgQueue::connect(config).await?))
}

/// Connect to the queue, falling back to a lazily connecting pool when the
/// database is unreachable at boot. Callers then retry through normal use.
pub async fn connect_queue_or_lazy(config: &QueueConfig) -> anyhow::Result<Arc<dyn JobQueue>> {
    match connect_queue(config).await {
        Ok(queue) => Ok(queue),
        Err(e) => {
            tracing::error!(error = %e, "Error connecting to queue; will keep retrying");
            Ok(Arc::new(PgQueue::connect_lazy(config)?))
        },
    }
}

pub fn object_store(config: &StorageConfig) -> Arc<dyn ObjectStore> {
    Arc::new(S3Storage::new(config.clone()))
}

/// Create both buckets if missing. Failures are logged, not returned.
pub async fn ensure_buckets(store: &dyn ObjectStore) {
    for bucket in [SONGS_BUCKET, TRACKS_BUCKET] {
        match store.ensure_bucket(bucket).await {
            Ok(true) => tracing::info!(bucket, "Bucket created"),
            Ok(false) => tracing::debug!(bucket, "Bucket already exists"),
            Err(e) => tracing::error!(bucket, error = %e, "Error checking or creating bucket"),
        }
    }
}
