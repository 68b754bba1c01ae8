//! HTTP relay between a browser front end and the conversion service.
//!
//! Each operation is self-contained: the caller passes back the token and
//! job id it received earlier, so the relay keeps no session state. Errors
//! are never retried here; the caller owns the retry policy.

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::upstream::ConversionBackend;

pub mod error;
pub mod handlers;

pub use error::{RelayError, RelayResult};

/// Shared handler state; cheap to clone
#[derive(Clone)]
pub struct AppState {
    /// Remote conversion client the three operations forward to
    pub backend: Arc<dyn ConversionBackend>,
    /// Plain client for the download proxy
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(backend: Arc<dyn ConversionBackend>, http: reqwest::Client) -> Self {
        Self { backend, http }
    }
}

/// Build the relay router with tracing and CORS layers
pub fn build_router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/get-token", post(handlers::get_token))
        .route("/api/start-convert", post(handlers::start_convert))
        .route("/api/poll-convert", post(handlers::poll_convert))
        .route("/api/download", post(handlers::dispatch))
        .route("/api/proxy-download", get(handlers::proxy_download))
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(config))
        .with_state(state)
}

/// Permissive unless origins are configured.
///
/// Invalid origins are skipped with a warning.
pub fn build_cors_layer(config: &ServerConfig) -> CorsLayer {
    if config.cors_origins.is_empty() || config.cors_origins.iter().any(|o| o == "*") {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }

    let origins: Vec<_> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!("Ignoring invalid CORS origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}
