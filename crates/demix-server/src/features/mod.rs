//! Feature modules implementing the demix API
//!
//! Each feature is a vertical slice with its own commands, queries, and
//! routes:
//! - `commands/` - Write operations (submit, remove)
//! - `queries/` - Read operations (list, fetch, snapshot)
//! - `routes.rs` - HTTP route definitions and error mapping
//! - `types.rs` - Shared request types

pub mod songs;

use axum::Router;
use std::sync::Arc;

use crate::queue::JobQueue;
use crate::storage::ObjectStore;

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// Work queue and id counter
    pub queue: Arc<dyn JobQueue>,
    /// Object store holding songs and separated tracks
    pub store: Arc<dyn ObjectStore>,
}

/// Creates the versioned API router with all feature routes mounted
pub fn router(state: FeatureState) -> Router<()> {
    Router::new().merge(songs::songs_routes().with_state(state))
}
