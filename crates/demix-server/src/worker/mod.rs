//! Separation worker
//!
//! A worker loop pops job descriptors off the work channel and drives each
//! one through a fixed sequence of stages:
//!
//! ```text
//! Received -> BucketReady -> InputFetched -> Processed -> ArtifactsUploaded -> Notified
//! ```
//!
//! Any stage failure abandons the job. Abandoned jobs are logged with their
//! id and stage and are never retried or re-enqueued. The loop itself keeps
//! going until its cancellation token fires; a job that has been dequeued is
//! always finished first.
//!
//! Several loops may compete on the same channel. They share the queue, the
//! store and the engine through `Arc`s and hold no other state.

use demix_common::types::{JobDescriptor, RawJobDescriptor, SONGS_BUCKET, TRACKS_BUCKET, WORK_CHANNEL};
use demix_common::DemixError;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{instrument, Span};

use crate::queue::{JobQueue, QueueResult};
use crate::storage::{ObjectStore, StorageError};

pub mod config;
pub mod engine;
pub mod events;
pub mod notify;
pub mod upload;

pub use config::WorkerConfig;
pub use engine::{CommandEngine, EngineError, SeparatedOutput, SeparationEngine};
pub use events::QueueLogger;
pub use notify::{Notifier, NotifyOutcome};
pub use upload::{upload_parts, UploadReport};

/// Pipeline position of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    BucketReady,
    InputFetched,
    Processed,
    ArtifactsUploaded,
    Notified,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Received => "received",
            Stage::BucketReady => "bucket_ready",
            Stage::InputFetched => "input_fetched",
            Stage::Processed => "processed",
            Stage::ArtifactsUploaded => "artifacts_uploaded",
            Stage::Notified => "notified",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum StageCause {
    #[error("Invalid descriptor: {0}")]
    Descriptor(#[from] DemixError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Working directory error: {0}")]
    Io(#[from] std::io::Error),
}

/// A stage that could not complete.
#[derive(Error, Debug)]
#[error("Stage '{stage}' failed: {source}")]
pub struct StageError {
    pub stage: Stage,
    pub source: StageCause,
}

impl StageError {
    fn at(stage: Stage) -> impl FnOnce(StageCause) -> Self {
        move |source| Self { stage, source }
    }
}

/// Terminal state of one processed message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Completed {
        job_id: String,
        report: UploadReport,
        notify: NotifyOutcome,
    },
    Abandoned {
        job_id: Option<String>,
        stage: Stage,
        reason: String,
    },
}

impl JobOutcome {
    pub fn job_id(&self) -> Option<&str> {
        match self {
            JobOutcome::Completed { job_id, .. } => Some(job_id),
            JobOutcome::Abandoned { job_id, .. } => job_id.as_deref(),
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, JobOutcome::Completed { .. })
    }
}

/// Counts reported by a loop when it stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub completed: usize,
    pub abandoned: usize,
}

impl WorkerSummary {
    fn record(&mut self, outcome: &JobOutcome) {
        if outcome.is_completed() {
            self.completed += 1;
        } else {
            self.abandoned += 1;
        }
    }

    pub fn merge(&mut self, other: WorkerSummary) {
        self.completed += other.completed;
        self.abandoned += other.abandoned;
    }
}

#[derive(Clone)]
pub struct Worker {
    queue: Arc<dyn JobQueue>,
    store: Arc<dyn ObjectStore>,
    engine: Arc<dyn SeparationEngine>,
    notifier: Notifier,
    log: QueueLogger,
    error_backoff: Duration,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn ObjectStore>,
        engine: Arc<dyn SeparationEngine>,
        notifier: Notifier,
    ) -> Self {
        Self {
            log: QueueLogger::new(queue.clone()),
            queue,
            store,
            engine,
            notifier,
            error_backoff: Duration::from_millis(config::DEFAULT_ERROR_BACKOFF_MS),
        }
    }

    pub fn from_config(
        config: &WorkerConfig,
        queue: Arc<dyn JobQueue>,
        store: Arc<dyn ObjectStore>,
    ) -> anyhow::Result<Self> {
        let engine = Arc::new(CommandEngine::from_config(config));
        let notifier = Notifier::new(Duration::from_secs(config.webhook_timeout_secs))?;

        Ok(Self::new(queue, store, engine, notifier)
            .with_error_backoff(Duration::from_millis(config.error_backoff_ms)))
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Ping the queue and the store, logging the result of each.
    ///
    /// Returns `false` if either is unreachable. Callers keep going anyway;
    /// the loop backs off on queue errors and jobs fail at the stage that
    /// needs the missing backend.
    pub async fn check_backends(&self) -> bool {
        let mut healthy = true;

        self.log.info("Connecting to queue...").await;
        match self.queue.ping().await {
            Ok(()) => self.log.info("Connected to queue successfully.").await,
            Err(e) => {
                healthy = false;
                self.log.error(format!("Error connecting to queue: {}", e)).await;
            },
        }

        self.log.info("Connecting to object store...").await;
        match self.store.ping().await {
            Ok(()) => self.log.info("Connected to object store successfully.").await,
            Err(e) => {
                healthy = false;
                self.log
                    .error(format!("Error connecting to object store: {}", e))
                    .await;
            },
        }

        healthy
    }

    /// Run one raw queue message through the pipeline.
    #[instrument(skip_all, fields(job_id = tracing::field::Empty))]
    pub async fn process_message(&self, message: &str) -> JobOutcome {
        let job: JobDescriptor = match message.parse() {
            Ok(job) => job,
            Err(e) => {
                let error = StageError::at(Stage::Received)(StageCause::Descriptor(e));
                self.log
                    .error(format!("Missing required keys in data: {} ({})", message, error))
                    .await;
                return JobOutcome::Abandoned {
                    job_id: serde_json::from_str::<RawJobDescriptor>(message)
                        .ok()
                        .and_then(|raw| raw.songhash),
                    stage: Stage::Received,
                    reason: error.to_string(),
                };
            },
        };

        Span::current().record("job_id", job.job_id.as_str());
        self.log
            .info(format!(
                "Processing request with song_key: {} and song_hash: {}",
                job.input_key, job.job_id
            ))
            .await;

        match self.process(&job).await {
            Ok((report, notify)) => JobOutcome::Completed {
                job_id: job.job_id,
                report,
                notify,
            },
            Err(error) => {
                self.log
                    .error(format!(
                        "Abandoned song {} at stage {}: {}",
                        job.job_id, error.stage, error.source
                    ))
                    .await;
                JobOutcome::Abandoned {
                    job_id: Some(job.job_id),
                    stage: error.stage,
                    reason: error.source.to_string(),
                }
            },
        }
    }

    async fn process(
        &self,
        job: &JobDescriptor,
    ) -> Result<(UploadReport, NotifyOutcome), StageError> {
        self.ensure_buckets()
            .await
            .map_err(StageError::at(Stage::BucketReady))?;

        // Removed on drop, whether the job completes or not.
        let work_dir = tempfile::Builder::new()
            .prefix("demix-")
            .tempdir()
            .map_err(|e| StageError::at(Stage::InputFetched)(e.into()))?;

        let input = self
            .fetch_input(job, work_dir.path())
            .await
            .map_err(StageError::at(Stage::InputFetched))?;

        self.log
            .info(format!("Starting separation for song {}", job.job_id))
            .await;
        let output = self
            .engine
            .separate(&input, work_dir.path())
            .await
            .map_err(|e| StageError::at(Stage::Processed)(e.into()))?;
        self.log
            .info(format!("Separation completed for song {}", job.job_id))
            .await;

        let report = upload_parts(self.store.as_ref(), &self.log, &job.job_id, &output).await;
        tracing::info!(
            stage = %Stage::ArtifactsUploaded,
            uploaded = report.uploaded.len(),
            missing = report.missing.len(),
            failed = report.failed.len(),
            "Artifacts published"
        );

        let notify = self.notify(job).await;

        Ok((report, notify))
    }

    async fn ensure_buckets(&self) -> Result<(), StageCause> {
        for bucket in [SONGS_BUCKET, TRACKS_BUCKET] {
            if self.store.ensure_bucket(bucket).await? {
                self.log
                    .info(format!("Bucket '{}' created successfully.", bucket))
                    .await;
            }
        }
        Ok(())
    }

    async fn fetch_input(
        &self,
        job: &JobDescriptor,
        work_dir: &Path,
    ) -> Result<std::path::PathBuf, StageCause> {
        let path = work_dir.join(format!("{}.mp3", local_file_stem(&job.job_id)));

        self.log
            .info(format!("Downloading song with key {}", job.input_key))
            .await;
        let size = self
            .store
            .get_to_file(SONGS_BUCKET, &job.input_key, &path)
            .await?;
        tracing::debug!(size, path = %path.display(), "Input downloaded");
        self.log
            .info(format!("Successfully downloaded song {}", job.job_id))
            .await;

        Ok(path)
    }

    async fn notify(&self, job: &JobDescriptor) -> NotifyOutcome {
        let outcome = self
            .notifier
            .notify(job.callback_url.as_deref(), &job.job_id)
            .await;

        match &outcome {
            NotifyOutcome::Skipped => {
                tracing::debug!("No webhook configured");
            },
            NotifyOutcome::Delivered { status } => {
                self.log
                    .info(format!(
                        "Webhook callback status: {} for song {}",
                        status, job.job_id
                    ))
                    .await;
            },
            NotifyOutcome::Failed { reason } => {
                self.log
                    .error(format!(
                        "Error sending webhook for song {}: {}",
                        job.job_id, reason
                    ))
                    .await;
            },
        }

        outcome
    }

    /// Wait for one message and process it.
    ///
    /// Returns `Ok(None)` once `cancel` fires while waiting.
    pub async fn run_once(&self, cancel: &CancellationToken) -> QueueResult<Option<JobOutcome>> {
        let Some(message) = self.queue.dequeue(WORK_CHANNEL, cancel).await? else {
            return Ok(None);
        };

        self.log
            .info(format!("Received message from '{}' queue.", WORK_CHANNEL))
            .await;
        Ok(Some(self.process_message(&message).await))
    }

    /// Consume the work channel until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) -> WorkerSummary {
        let mut summary = WorkerSummary::default();

        self.log
            .info(format!("Waiting for messages in the '{}' queue.", WORK_CHANNEL))
            .await;

        while !cancel.is_cancelled() {
            match self.run_once(&cancel).await {
                Ok(Some(outcome)) => summary.record(&outcome),
                Ok(None) => break,
                Err(e) => {
                    self.log.error(format!("Error in worker loop: {}", e)).await;
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.error_backoff) => {}
                    }
                },
            }
        }

        tracing::info!(
            completed = summary.completed,
            abandoned = summary.abandoned,
            "Worker loop stopped"
        );
        summary
    }
}

/// Start `count` loops sharing `worker`'s backends.
pub fn spawn_workers(
    worker: &Worker,
    count: usize,
    cancel: &CancellationToken,
) -> Vec<JoinHandle<WorkerSummary>> {
    (0..count)
        .map(|index| {
            let worker = worker.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tracing::info!(worker = index, "Starting worker loop");
                worker.run(cancel).await
            })
        })
        .collect()
}

/// Wait for spawned loops and add up their summaries.
pub async fn join_workers(handles: Vec<JoinHandle<WorkerSummary>>) -> WorkerSummary {
    let mut total = WorkerSummary::default();
    for handle in handles {
        match handle.await {
            Ok(summary) => total.merge(summary),
            Err(e) => tracing::error!(error = %e, "Worker task failed"),
        }
    }
    total
}

/// File name stem for a job's local input, limited to characters that are
/// safe in a path component.
fn local_file_stem(job_id: &str) -> String {
    job_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
