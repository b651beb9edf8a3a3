//! Log channel tail
//!
//! Drains the log channel in order and hands each line to a sink, until
//! cancelled. Queue errors are reported and retried after `backoff`.

use demix_common::types::LOG_CHANNEL;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::queue::JobQueue;

/// Follow the log channel, returning the number of lines delivered.
pub async fn tail<F>(
    queue: &dyn JobQueue,
    cancel: &CancellationToken,
    backoff: Duration,
    mut sink: F,
) -> usize
where
    F: FnMut(&str),
{
    let mut delivered = 0;

    while !cancel.is_cancelled() {
        match queue.dequeue(LOG_CHANNEL, cancel).await {
            Ok(Some(line)) => {
                sink(&line);
                delivered += 1;
            },
            Ok(None) => break,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read log channel");
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(backoff) => {}
                }
            },
        }
    }

    delivered
}
