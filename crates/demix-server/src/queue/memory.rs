//! In-process queue backend

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use super::{JobQueue, QueueError, QueueResult};

/// Queue held entirely in memory.
///
/// Blocked consumers park on a [`Notify`] and are woken by every enqueue;
/// the pop itself happens under the channel lock, so two consumers never
/// receive the same item.
#[derive(Default)]
pub struct MemoryQueue {
    channels: Mutex<HashMap<String, VecDeque<String>>>,
    counters: Mutex<HashMap<String, Arc<AtomicU64>>>,
    notify: Notify,
    fail_enqueue: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent `enqueue` fail until reset.
    pub fn set_fail_enqueue(&self, fail: bool) {
        self.fail_enqueue.store(fail, Ordering::SeqCst);
    }

    fn channels(&self) -> MutexGuard<'_, HashMap<String, VecDeque<String>>> {
        self.channels
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn counter(&self, name: &str) -> Arc<AtomicU64> {
        let mut counters = self
            .counters
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        counters.entry(name.to_string()).or_default().clone()
    }

    fn pop(&self, channel: &str) -> Option<String> {
        self.channels().get_mut(channel).and_then(VecDeque::pop_front)
    }
}

#[async_trait]
impl JobQueue for MemoryQueue {
    async fn enqueue(&self, channel: &str, payload: &str) -> QueueResult<()> {
        if self.fail_enqueue.load(Ordering::SeqCst) {
            return Err(QueueError::Backend("enqueue rejected".to_string()));
        }

        self.channels()
            .entry(channel.to_string())
            .or_default()
            .push_back(payload.to_string());
        self.notify.notify_waiters();
        Ok(())
    }

    async fn try_dequeue(&self, channel: &str) -> QueueResult<Option<String>> {
        Ok(self.pop(channel))
    }

    async fn dequeue(
        &self,
        channel: &str,
        cancel: &CancellationToken,
    ) -> QueueResult<Option<String>> {
        loop {
            // Register interest before checking, so an enqueue between the
            // check and the await is not missed.
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(item) = self.pop(channel) {
                return Ok(Some(item));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = &mut notified => {},
            }
        }
    }

    async fn peek_all(&self, channel: &str) -> QueueResult<Vec<String>> {
        Ok(self
            .channels()
            .get(channel)
            .map(|items| items.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn len(&self, channel: &str) -> QueueResult<usize> {
        Ok(self.channels().get(channel).map_or(0, VecDeque::len))
    }

    async fn next_id(&self, counter: &str) -> QueueResult<u64> {
        Ok(self.counter(counter).fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn ping(&self) -> QueueResult<()> {
        Ok(())
    }
}
