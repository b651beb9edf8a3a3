//! Durable FIFO work queue
//!
//! The queue hands job descriptors from the API to workers and carries the
//! free-text log side channel. Items live in named channels; each channel is
//! an independent FIFO list.
//!
//! Delivery is at-least-once in the lossy sense: `dequeue` removes the item,
//! there is no acknowledgment, and a consumer that crashes mid-job loses it.
//! The queue itself never hands the same item to two consumers.
//!
//! Two backends implement [`JobQueue`]:
//!
//! - [`PgQueue`]: PostgreSQL table, used by the binaries
//! - [`MemoryQueue`]: in-process, used by tests and embedded setups

use async_trait::async_trait;
use demix_common::types::{JobDescriptor, WORK_CHANNEL};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

pub mod config;
pub mod memory;
pub mod postgres;

pub use config::QueueConfig;
pub use memory::MemoryQueue;
pub use postgres::PgQueue;

/// Queue operation errors
#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Queue database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Queue migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to encode queue item: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Queue backend error: {0}")]
    Backend(String),
}

pub type QueueResult<T> = Result<T, QueueError>;

/// Named durable FIFO lists plus atomic counters.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Append `payload` to the tail of `channel`.
    async fn enqueue(&self, channel: &str, payload: &str) -> QueueResult<()>;

    /// Pop the head of `channel` if there is one.
    async fn try_dequeue(&self, channel: &str) -> QueueResult<Option<String>>;

    /// Pop the head of `channel`, waiting while it is empty.
    ///
    /// Returns `Ok(None)` only once `cancel` has fired.
    async fn dequeue(
        &self,
        channel: &str,
        cancel: &CancellationToken,
    ) -> QueueResult<Option<String>>;

    /// Ordered snapshot of `channel` without removing anything.
    async fn peek_all(&self, channel: &str) -> QueueResult<Vec<String>>;

    /// Number of items currently in `channel`.
    async fn len(&self, channel: &str) -> QueueResult<usize>;

    /// Atomically increment the named counter and return the new value.
    /// The first call for a name returns 1.
    async fn next_id(&self, counter: &str) -> QueueResult<u64>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> QueueResult<()>;
}

/// Serialize a descriptor onto the work channel.
pub async fn enqueue_job(queue: &dyn JobQueue, job: &JobDescriptor) -> QueueResult<()> {
    let payload = serde_json::to_string(job)?;
    queue.enqueue(WORK_CHANNEL, &payload).await
}
