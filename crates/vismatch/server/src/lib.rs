//! HTTP API server for vismatch.
//!
//! Exposes the match engine over axum:
//! - `GET /` liveness message
//! - `POST /match` query-image matching (multipart upload or remote URL)
//! - `GET /images/...` static catalog images
//!
//! CORS is permissive (the catalog and scores are not sensitive) and every
//! request is traced.

pub mod error;
pub mod routes;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use vismatch_core::EmbeddingProvider;
use vismatch_engine::MatchEngine;

pub use error::ApiError;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
    /// Directory of catalog images served under `/images`.
    pub image_dir: std::path::PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            image_dir: std::path::PathBuf::from("data/images"),
        }
    }
}

/// Shared per-request state: the read-only engine and the encoder.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MatchEngine>,
    pub provider: Arc<dyn EmbeddingProvider>,
    pub http: reqwest::Client,
}

impl AppState {
    #[must_use]
    pub fn new(engine: Arc<MatchEngine>, provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            engine,
            provider,
            http: reqwest::Client::new(),
        }
    }
}

/// Server errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("server configuration error: {0}")]
    Config(String),

    #[error("server error: {0}")]
    Server(String),
}

/// Build the router with all routes and middleware.
#[must_use]
pub fn router(config: &Config, state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::home))
        .route("/match", post(routes::match_image))
        .nest_service("/images", ServeDir::new(&config.image_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Bind and run the server until shutdown.
///
/// # Errors
///
/// Returns an error if the address is invalid or binding/serving fails.
pub async fn serve(config: Config, state: AppState) -> Result<(), Error> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::Config(format!("invalid address: {e}")))?;

    let app = router(&config, state);

    tracing::info!(%addr, image_dir = %config.image_dir.display(), "starting vismatch server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Server(format!("failed to bind to {addr}: {e}")))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| Error::Server(format!("server error: {e}")))?;

    Ok(())
}
