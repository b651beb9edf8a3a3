pub mod response;

use crate::config::Config;
use crate::features::{self, FeatureState};
use crate::middleware;
use axum::{
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub type AppState = FeatureState;

const ROOT_PAGE: &str = "<h1> Music Separation Server</h1><p> Use a valid endpoint </p>";

/// Serve the API until `shutdown` fires.
pub async fn serve(config: &Config, state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let app = create_router(state, config);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

/// Create the application router with all routes and middleware
pub fn create_router(state: AppState, config: &Config) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .with_state(state.clone())
        .nest("/apiv1", features::router(state))
        // Layers apply from innermost to outermost
        .layer(middleware::body_limit_layer(config.server.max_body_bytes))
        .layer(middleware::tracing_layer())
        .layer(middleware::cors_layer(&config.cors))
}

async fn root() -> Html<&'static str> {
    Html(ROOT_PAGE)
}

/// Readiness check: both the queue and the object store must answer.
async fn health(State(state): State<AppState>) -> Response {
    let timeout = Duration::from_secs(5);
    let (queue, store) = tokio::join!(
        tokio::time::timeout(timeout, state.queue.ping()),
        tokio::time::timeout(timeout, state.store.ping()),
    );

    let queue_status = match queue {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("timed out".to_string()),
    };
    let store_status = match store {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("timed out".to_string()),
    };

    let healthy = queue_status.is_ok() && store_status.is_ok();
    if !healthy {
        tracing::error!(queue = ?queue_status, store = ?store_status, "Health check failed");
    }

    let describe = |status: &Result<(), String>| match status {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("unavailable: {}", e),
    };

    let status = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status,
        Json(json!({
            "status": if healthy { "healthy" } else { "unhealthy" },
            "queue": describe(&queue_status),
            "storage": describe(&store_status),
        })),
    )
        .into_response()
}
