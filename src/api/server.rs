//! API server setup and configuration.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::api::routes;
use crate::config::AppConfig;
use crate::error::Result;
use crate::ingest::AssetIngestor;
use crate::queue::RenderQueue;
use crate::store::JobStore;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Server start time for uptime calculation
    pub start_time: Instant,
    /// Resolved configuration
    pub config: Arc<AppConfig>,
    /// Authoritative job table
    pub store: Arc<JobStore>,
    /// Render queue and worker
    pub queue: Arc<RenderQueue>,
    /// Remote asset ingestion
    pub ingestor: Arc<AssetIngestor>,
}

impl AppState {
    pub fn new(
        config: Arc<AppConfig>,
        store: Arc<JobStore>,
        queue: Arc<RenderQueue>,
        ingestor: Arc<AssetIngestor>,
    ) -> Self {
        Self {
            start_time: Instant::now(),
            config,
            store,
            queue,
            ingestor,
        }
    }
}

/// Build the application router.
///
/// `/output` is served straight from the output directory; `ServeDir`
/// honors `Range` requests and rejects path traversal.
pub fn build_router(state: AppState) -> Router {
    let output_dir = state.config.output_dir.clone();
    Router::new()
        .merge(routes::process::router())
        .merge(routes::health::router())
        .nest_service("/output", ServeDir::new(output_dir))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Bind and serve until the process is stopped.
pub async fn serve(state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", state.config.bind_address, state.config.port)
        .parse()
        .map_err(|e| crate::Error::Configuration(format!("invalid bind address: {}", e)))?;

    let router = build_router(state);
    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "API server listening");
    axum::serve(listener, router).await?;
    Ok(())
}
