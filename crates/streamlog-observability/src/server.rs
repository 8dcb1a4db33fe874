//! HTTP server for health checks and Prometheus metrics.
//!
//! Exposes:
//! - `/live` - 200 OK while the process is running
//! - `/ready` - 200 OK iff every registered health check passes
//! - `/metrics` - Prometheus exposition format
//!
//! Runs alongside the gRPC listener on a separate port.

use std::net::SocketAddr;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};

use crate::health::HealthRegistry;
use crate::metrics::REGISTRY;

/// Build the router; split out from [`serve_health`] for tests.
pub fn health_router(health: HealthRegistry) -> Router {
    Router::new()
        .route("/live", get(live_handler))
        .route("/ready", get(ready_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(health)
}

/// Serve `/live`, `/ready`, `/metrics` until the process exits.
pub async fn serve_health(addr: SocketAddr, health: HealthRegistry) -> std::io::Result<()> {
    let app = health_router(health);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "health server listening");
    axum::serve(listener, app).await
}

async fn live_handler() -> impl IntoResponse {
    "OK"
}

async fn ready_handler(State(health): State<HealthRegistry>) -> Response {
    let failing = health.failing();
    if failing.is_empty() {
        "READY".into_response()
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            format!("failing checks: {}", failing.join(", ")),
        )
            .into_response()
    }
}

async fn metrics_handler() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = vec![];
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(_) => (
            StatusCode::OK,
            [("content-type", encoder.format_type())],
            buffer,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("failed to encode metrics: {e}"),
            )
                .into_response()
        }
    }
}
