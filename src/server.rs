// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! HTTP server for metrics and Kubernetes probes.
//!
//! Endpoints:
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always 200)
//! - `/readyz` - Readiness probe (200 once the controllers are running)

use crate::constants::{HEALTHZ_PATH, METRICS_SERVER_PATH, READYZ_PATH};
use crate::metrics::gather_metrics;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Router};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// State shared between the supervisor and the probe handlers.
#[derive(Debug, Default)]
pub struct ServerState {
    ready: AtomicBool,
}

impl ServerState {
    pub fn set_ready(&self, ready: bool) {
        self.ready.store(ready, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }
}

/// Routes of the metrics and probe server.
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route(METRICS_SERVER_PATH, get(metrics_handler))
        .route(HEALTHZ_PATH, get(healthz_handler))
        .route(READYZ_PATH, get(readyz_handler))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(
    address: &str,
    state: Arc<ServerState>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind(address).await?;
    info!("Metrics server listening on {}", address);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("Metrics server stopped");
    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    match gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {e}"),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    async fn get_status(state: Arc<ServerState>, path: &str) -> StatusCode {
        let response = router(state)
            .oneshot(Request::builder().uri(path).body(Body::empty()).unwrap())
            .await
            .unwrap();
        response.status()
    }

    #[tokio::test]
    async fn test_healthz_always_ok() {
        let state = Arc::new(ServerState::default());
        assert_eq!(get_status(state, "/healthz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_readyz_follows_ready_flag() {
        let state = Arc::new(ServerState::default());
        assert_eq!(
            get_status(state.clone(), "/readyz").await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.set_ready(true);
        assert_eq!(get_status(state, "/readyz").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_metrics_exposes_registry() {
        crate::metrics::record_reconciliation_success(
            "ProjectClaim",
            std::time::Duration::from_millis(5),
        );

        let response = router(Arc::new(ServerState::default()))
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("kore_appvia_io_reconciliations_total"));
    }
}
