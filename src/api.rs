//! Health & Status API endpoints
//!
//! Provides HTTP endpoints for monitoring and status:
//! - GET /health  - Liveness probe
//! - GET /readyz  - Readiness probe (store reachable)
//! - GET /status  - Queue counts and uptime
//! - GET /metrics - Prometheus metrics

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use eyre::Result;
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use sqlx::SqlitePool;
use std::net::SocketAddr;
use std::time::Instant;

use crate::metrics;
use crate::store;
use crate::types::Status;

/// Shared state for the HTTP server
#[derive(Clone)]
pub struct AppState {
    db: SqlitePool,
    started_at: Instant,
}

/// Status response
#[derive(Serialize)]
struct StatusResponse {
    status: String,
    uptime_seconds: u64,
    queues: QueueStatus,
}

#[derive(Serialize)]
struct QueueStatus {
    observed_events: i64,
    pending_actions: i64,
    submitted_actions: i64,
    confirmed_actions: i64,
    failed_actions: i64,
}

/// Liveness probe (always returns OK if server is running)
async fn health() -> &'static str {
    "OK"
}

/// Readiness probe (checks the store is reachable)
async fn readiness(State(state): State<AppState>) -> &'static str {
    match store::count_observed_events(&state.db).await {
        Ok(_) => "OK",
        Err(_) => "NOT_READY",
    }
}

/// Queue counts and uptime
async fn status_handler(State(state): State<AppState>) -> Json<StatusResponse> {
    let queues = QueueStatus {
        observed_events: store::count_observed_events(&state.db).await.unwrap_or(0),
        pending_actions: store::count_actions_with_status(&state.db, Status::Pending)
            .await
            .unwrap_or(0),
        submitted_actions: store::count_actions_with_status(&state.db, Status::Submitted)
            .await
            .unwrap_or(0),
        confirmed_actions: store::count_actions_with_status(&state.db, Status::Confirmed)
            .await
            .unwrap_or(0),
        failed_actions: store::count_actions_with_status(&state.db, Status::Failed)
            .await
            .unwrap_or(0),
    };

    Json(StatusResponse {
        status: "ok".to_string(),
        uptime_seconds: state.started_at.elapsed().as_secs(),
        queues,
    })
}

/// Prometheus metrics endpoint
async fn prometheus_metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if encoder.encode(&metric_families, &mut buffer).is_err() {
        return (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to encode metrics",
        )
            .into_response();
    }

    match Response::builder()
        .header(header::CONTENT_TYPE, encoder.format_type())
        .body(axum::body::Body::from(buffer))
    {
        Ok(resp) => resp,
        Err(_) => (
            axum::http::StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to build metrics response",
        )
            .into_response(),
    }
}

/// Start the API server (combines metrics and status endpoints)
pub async fn start_api_server(addr: SocketAddr, db: SqlitePool) -> Result<()> {
    let state = AppState {
        db,
        started_at: Instant::now(),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/readyz", get(readiness))
        .route("/status", get(status_handler))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state);

    metrics::UP.set(1.0);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "API server started");
    axum::serve(listener, app).await?;

    Ok(())
}
