// SPDX-FileCopyrightText: 2026 Leadflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Ingress HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the gateway.

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    Router,
    routing::{get, post},
};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use leadflow_config::model::GatewayConfig;
use leadflow_connector::Dispatcher;
use leadflow_core::{LeadStore, LeadflowError};

use crate::handlers;
use crate::rate_limit::RateLimiter;

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    /// Resolves API keys to tenants.
    pub store: Arc<dyn LeadStore>,
    /// Scores and persists structured leads.
    pub dispatcher: Arc<Dispatcher>,
    /// Per-client request limiter.
    pub limiter: Arc<RateLimiter>,
    /// Process start time for uptime.
    pub started: Instant,
}

impl GatewayState {
    pub fn new(
        store: Arc<dyn LeadStore>,
        dispatcher: Arc<Dispatcher>,
        config: &GatewayConfig,
    ) -> Self {
        Self {
            store,
            dispatcher,
            limiter: Arc::new(RateLimiter::new(
                config.rate_limit_requests,
                Duration::from_secs(config.rate_limit_window_secs),
            )),
            started: Instant::now(),
        }
    }
}

/// Routes:
/// - GET /health (no auth)
/// - POST /v1/leads (API key per request)
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/v1/leads", post(handlers::post_lead))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind `host:port` and serve until `shutdown` is cancelled.
pub async fn start_server(
    config: &GatewayConfig,
    state: GatewayState,
    shutdown: CancellationToken,
) -> Result<(), LeadflowError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| LeadflowError::Internal(format!("failed to bind gateway to {addr}: {e}")))?;

    let sweeper = state.limiter.spawn_sweeper(shutdown.clone());
    let app = build_router(state);

    tracing::info!("Gateway server listening on {addr}");

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .map_err(|e| LeadflowError::Internal(format!("gateway server error: {e}")));

    sweeper.abort();
    tracing::info!("Gateway server stopped");
    result
}
