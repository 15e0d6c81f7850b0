//! Router assembly.

use axum::{Json, Router, middleware, routing::get};
use serde::Serialize;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::Level;

use super::middleware::{GateState, gate_middleware};

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Wrap `inner` so every request it sees has passed the gate.
pub fn gated(state: GateState, inner: Router) -> Router {
    inner.layer(middleware::from_fn_with_state(state, gate_middleware))
}

/// Create the gateway router.
///
/// `/health` answers directly; everything else goes through the gate to `upstream`.
pub fn create_router(state: GateState, upstream: Router) -> Router {
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::DEBUG))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    Router::new()
        .route("/health", get(health))
        .fallback_service(gated(state, upstream))
        .layer(trace_layer)
}
