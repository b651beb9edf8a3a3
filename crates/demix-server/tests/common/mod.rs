//! Shared helpers for the demix server integration tests
//!
//! Everything runs against the in-memory queue and store, so no external
//! service is required.
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use demix_common::types::{TrackPart, SONGS_BUCKET, TRACKS_BUCKET};
use demix_server::{
    api::{self, AppState},
    config::Config,
    queue::MemoryQueue,
    storage::{MemoryStorage, ObjectStore},
    worker::{EngineError, Notifier, SeparatedOutput, SeparationEngine, Worker},
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

pub struct TestApp {
    pub queue: Arc<MemoryQueue>,
    pub store: Arc<MemoryStorage>,
    pub router: Router,
}

impl TestApp {
    pub async fn new() -> Self {
        let queue = Arc::new(MemoryQueue::new());
        let store = Arc::new(MemoryStorage::new());
        store.ensure_bucket(SONGS_BUCKET).await.unwrap();
        store.ensure_bucket(TRACKS_BUCKET).await.unwrap();

        let state = AppState {
            queue: queue.clone(),
            store: store.clone(),
        };
        let router = api::create_router(state, &Config::default());

        Self {
            queue,
            store,
            router,
        }
    }

    pub fn worker(&self, engine: FakeEngine) -> Worker {
        Worker::new(
            self.queue.clone(),
            self.store.clone(),
            Arc::new(engine),
            Notifier::new(Duration::from_secs(2)).unwrap(),
        )
        .with_error_backoff(Duration::from_millis(10))
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        send(
            &self.router,
            Request::builder().uri(uri).body(Body::empty()).unwrap(),
        )
        .await
    }

    pub async fn post_json(&self, uri: &str, body: serde_json::Value) -> TestResponse {
        send(
            &self.router,
            Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl TestResponse {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_slice(&self.body).unwrap()
    }
}

async fn send(router: &Router, request: Request<Body>) -> TestResponse {
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec();

    TestResponse {
        status,
        headers,
        body,
    }
}

/// Separation engine that writes `{part}:{input bytes}` for each of its
/// configured parts and nothing else.
#[derive(Clone)]
pub struct FakeEngine {
    pub parts: Vec<TrackPart>,
}

impl FakeEngine {
    pub fn all_parts() -> Self {
        Self {
            parts: TrackPart::ALL.to_vec(),
        }
    }

    pub fn with_parts(parts: &[TrackPart]) -> Self {
        Self {
            parts: parts.to_vec(),
        }
    }
}

/// Bytes the fake engine produces for `part` of `input`.
pub fn fake_part_bytes(part: TrackPart, input: &[u8]) -> Vec<u8> {
    let mut bytes = format!("{}:", part).into_bytes();
    bytes.extend_from_slice(input);
    bytes
}

#[async_trait]
impl SeparationEngine for FakeEngine {
    async fn separate(&self, input: &Path, work_dir: &Path) -> Result<SeparatedOutput, EngineError> {
        let audio = tokio::fs::read(input).await.map_err(EngineError::Spawn)?;
        let dir = work_dir.join("separated");
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(EngineError::Spawn)?;

        let output = SeparatedOutput {
            dir,
            extension: "mp3".to_string(),
        };
        for part in &self.parts {
            tokio::fs::write(output.part_path(*part), fake_part_bytes(*part, &audio))
                .await
                .map_err(EngineError::Spawn)?;
        }

        Ok(output)
    }
}
