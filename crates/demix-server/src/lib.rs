//! Demix Server Library
//!
//! Music source separation as a queued batch service.
//!
//! # Overview
//!
//! - **API**: accepts base64 MP3 uploads, lists and serves separated tracks
//! - **Queue**: durable FIFO channels and id counters (PostgreSQL or memory)
//! - **Storage**: S3-compatible object store for songs and tracks
//! - **Worker**: pulls jobs, runs the separator, publishes the parts and
//!   fires an optional completion webhook
//! - **Log tail**: follows the free-text log channel workers write to
//!
//! # Architecture
//!
//! The API and the workers share nothing but the queue and the object store.
//! A submitted song is stored under `songs/{job_id}.mp3`, a descriptor is
//! pushed onto the work channel, and some worker later uploads
//! `{job_id}/{part}.mp3` for each separated part.
//!
//! # Example
//!
//! ```no_run
//! use demix_server::{api, config::Config, queue::MemoryQueue, storage::MemoryStorage};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load()?;
//!     let state = api::AppState {
//!         queue: Arc::new(MemoryQueue::new()),
//!         store: Arc::new(MemoryStorage::new()),
//!     };
//!     api::serve(&config, state, demix_server::shutdown::shutdown_token()).await
//! }
//! ```

pub mod api;
pub mod bootstrap;
pub mod config;
pub mod features;
pub mod logtail;
pub mod middleware;
pub mod queue;
pub mod shutdown;
pub mod storage;
pub mod worker;
