//! PostgreSQL queue backend
//!
//! Each channel is the set of `queue_items` rows with that channel name,
//! ordered by their `BIGSERIAL` id. Popping deletes the head row with
//! `FOR UPDATE SKIP LOCKED`, so concurrent workers never receive the same
//! row. Producers `pg_notify` after every insert.
//!
//! Blocked consumers never hold a pooled connection while they wait. One
//! listener per queue, on its own connection outside the pool, turns
//! notifications into a [`Notify`] wake-up for every waiter; waiters also
//! poll, which covers lost notifications and a missing listener.

use async_trait::async_trait;
use sqlx::postgres::{PgListener, PgPool, PgPoolOptions};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Notify, OnceCell};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{JobQueue, QueueConfig, QueueError, QueueResult};

/// Notification channel used to wake blocked consumers.
const NOTIFY_CHANNEL: &str = "demix_queue";

/// How often an idle listener checks whether its queue is still alive.
const LISTENER_IDLE_CHECK: Duration = Duration::from_secs(30);

/// Pause before reconnecting a failed listener.
const LISTENER_RETRY: Duration = Duration::from_secs(1);

#[derive(Clone)]
pub struct PgQueue {
    pool: PgPool,
    poll_interval: Duration,
    schema: Arc<OnceCell<()>>,
    database_url: String,
    wakeup: Arc<Notify>,
    listener: Arc<OnceCell<()>>,
}

impl PgQueue {
    /// Connect, then create the queue tables if needed.
    pub async fn connect(config: &QueueConfig) -> QueueResult<Self> {
        let pool = Self::pool_options(config).connect(&config.database_url).await?;
        let queue = Self::from_pool(pool, config);
        queue.ready().await?;

        Ok(queue)
    }

    /// Build a queue whose connections are opened on first use.
    ///
    /// Migrations run with the first operation that reaches the database, so
    /// a process started before its database keeps retrying instead of exiting.
    pub fn connect_lazy(config: &QueueConfig) -> QueueResult<Self> {
        let pool = Self::pool_options(config).connect_lazy(&config.database_url)?;
        Ok(Self::from_pool(pool, config))
    }

    pub fn from_pool(pool: PgPool, config: &QueueConfig) -> Self {
        Self {
            pool,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            schema: Arc::new(OnceCell::new()),
            database_url: config.database_url.clone(),
            wakeup: Arc::new(Notify::new()),
            listener: Arc::new(OnceCell::new()),
        }
    }

    /// The pool, once the queue tables are known to exist.
    async fn ready(&self) -> QueueResult<&PgPool> {
        self.schema
            .get_or_try_init(|| async {
                sqlx::migrate!("../../migrations").run(&self.pool).await?;
                info!("Queue database connected and migrated");
                Ok::<(), QueueError>(())
            })
            .await?;

        Ok(&self.pool)
    }

    fn pool_options(config: &QueueConfig) -> PgPoolOptions {
        PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
    }

    /// Spawn the shared listener the first time anyone blocks on the queue.
    async fn start_listener(&self) {
        self.listener
            .get_or_init(|| async {
                tokio::spawn(forward_notifications(
                    self.database_url.clone(),
                    Arc::downgrade(&self.wakeup),
                ));
            })
            .await;
    }
}

/// Relay `NOTIFY demix_queue` to the waiters of one queue until it is dropped.
async fn forward_notifications(database_url: String, wakeup: Weak<Notify>) {
    loop {
        let mut listener = match PgListener::connect(&database_url).await {
            Ok(listener) => listener,
            Err(e) => {
                warn!(error = %e, "Queue listener unavailable, consumers will poll");
                tokio::time::sleep(LISTENER_RETRY).await;
                if wakeup.strong_count() == 0 {
                    return;
                }
                continue;
            },
        };

        if let Err(e) = listener.listen(NOTIFY_CHANNEL).await {
            warn!(error = %e, "Failed to LISTEN on queue channel, consumers will poll");
            tokio::time::sleep(LISTENER_RETRY).await;
            continue;
        }
        debug!("Queue listener connected");

        loop {
            match tokio::time::timeout(LISTENER_IDLE_CHECK, listener.recv()).await {
                Ok(Ok(_)) => match wakeup.upgrade() {
                    Some(notify) => notify.notify_waiters(),
                    None => return,
                },
                Ok(Err(e)) => {
                    warn!(error = %e, "Queue listener failed, reconnecting");
                    break;
                },
                Err(_) => {
                    if wakeup.strong_count() == 0 {
                        return;
                    }
                },
            }
        }
    }
}

#[async_trait]
impl JobQueue for PgQueue {
    async fn enqueue(&self, channel: &str, payload: &str) -> QueueResult<()> {
        sqlx::query("INSERT INTO queue_items (channel, payload) VALUES ($1, $2)")
            .bind(channel)
            .bind(payload)
            .execute(self.ready().await?)
            .await?;

        // Wake-up only; a lost notification is covered by polling.
        if let Err(e) = sqlx::query("SELECT pg_notify($1, $2)")
            .bind(NOTIFY_CHANNEL)
            .bind(channel)
            .execute(&self.pool)
            .await
        {
            debug!(error = %e, "pg_notify failed after enqueue");
        }

        Ok(())
    }

    async fn try_dequeue(&self, channel: &str) -> QueueResult<Option<String>> {
        let payload = sqlx::query_scalar::<_, String>(
            r#"
            DELETE FROM queue_items
            WHERE id = (
                SELECT id FROM queue_items
                WHERE channel = $1
                ORDER BY id
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING payload
            "#,
        )
        .bind(channel)
        .fetch_optional(self.ready().await?)
        .await?;

        Ok(payload)
    }

    async fn dequeue(
        &self,
        channel: &str,
        cancel: &CancellationToken,
    ) -> QueueResult<Option<String>> {
        self.start_listener().await;

        loop {
            if cancel.is_cancelled() {
                return Ok(None);
            }

            // Register before popping so a wake-up between the two is kept.
            let notified = self.wakeup.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(payload) = self.try_dequeue(channel).await? {
                return Ok(Some(payload));
            }

            tokio::select! {
                _ = cancel.cancelled() => return Ok(None),
                _ = &mut notified => {},
                _ = tokio::time::sleep(self.poll_interval) => {},
            }
        }
    }

    async fn peek_all(&self, channel: &str) -> QueueResult<Vec<String>> {
        let payloads = sqlx::query_scalar::<_, String>(
            "SELECT payload FROM queue_items WHERE channel = $1 ORDER BY id",
        )
        .bind(channel)
        .fetch_all(self.ready().await?)
        .await?;

        Ok(payloads)
    }

    async fn len(&self, channel: &str) -> QueueResult<usize> {
        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM queue_items WHERE channel = $1",
        )
        .bind(channel)
        .fetch_one(self.ready().await?)
        .await?;

        Ok(usize::try_from(count).unwrap_or(0))
    }

    async fn next_id(&self, counter: &str) -> QueueResult<u64> {
        let value = sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO counters (name, value) VALUES ($1, 1)
            ON CONFLICT (name) DO UPDATE SET value = counters.value + 1
            RETURNING value
            "#,
        )
        .bind(counter)
        .fetch_one(self.ready().await?)
        .await?;

        Ok(u64::try_from(value).unwrap_or(0))
    }

    async fn ping(&self) -> QueueResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        self.ready().await?;
        Ok(())
    }
}
