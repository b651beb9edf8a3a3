use demix_common::types::WORK_CHANNEL;
use serde::{Deserialize, Serialize};

use crate::queue::{JobQueue, QueueError};

/// Pending descriptors, oldest first, exactly as stored on the work channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueSnapshotResponse {
    pub queue: Vec<String>,
}

pub async fn handle(queue: &dyn JobQueue) -> Result<QueueSnapshotResponse, QueueError> {
    Ok(QueueSnapshotResponse {
        queue: queue.peek_all(WORK_CHANNEL).await?,
    })
}
