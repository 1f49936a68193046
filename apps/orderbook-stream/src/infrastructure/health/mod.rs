//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, connection statistics, and Prometheus
//! metrics. Used by container orchestrators, load balancers, and monitoring
//! systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness probe (simple OK)
//! - `GET /readyz` - Kubernetes readiness probe (fails once shutdown begins)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::infrastructure::grpc::ServerStats;
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status.
    pub status: HealthStatus,
    /// Server version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Client connection statistics.
    pub connections: ConnectionStatus,
    /// Producers started by closed connections.
    pub producers_started: u64,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Accepting connections.
    Healthy,
    /// Shutdown in progress; existing sessions are draining.
    ShuttingDown,
}

/// Client connection statistics.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    /// Connections currently open.
    pub active: i64,
    /// Connections accepted since startup.
    pub total: u64,
    /// When the most recent connection was accepted.
    pub last_connected_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    stats: Arc<ServerStats>,
    shutdown: CancellationToken,
}

impl HealthServerState {
    /// Create new health server state.
    ///
    /// Readiness fails once `shutdown` is cancelled.
    #[must_use]
    pub fn new(version: String, stats: Arc<ServerStats>, shutdown: CancellationToken) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            stats,
            shutdown,
        }
    }

    fn is_ready(&self) -> bool {
        !self.shutdown.is_cancelled()
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Health check HTTP server.
pub struct HealthServer {
    port: u16,
    state: Arc<HealthServerState>,
    cancel: CancellationToken,
}

impl HealthServer {
    /// Create a new health server.
    #[must_use]
    pub const fn new(port: u16, state: Arc<HealthServerState>, cancel: CancellationToken) -> Self {
        Self {
            port,
            state,
            cancel,
        }
    }

    /// Run the health server until cancelled.
    ///
    /// # Errors
    ///
    /// Returns `HealthServerError` if binding fails or the HTTP server
    /// encounters a fatal error while running.
    pub async fn run(self) -> Result<(), HealthServerError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, router(self.state))
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    (StatusCode::OK, Json(build_health_response(&state)))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    if state.is_ready() {
        (StatusCode::OK, "READY")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "NOT READY")
    }
}

async fn metrics_handler() -> impl IntoResponse {
    get_metrics_handle().map_or_else(
        || {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                [("content-type", "text/plain")],
                "Metrics not initialized".to_string(),
            )
        },
        |handle| {
            let body = handle.render();
            (
                StatusCode::OK,
                [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
                body,
            )
        },
    )
}

fn build_health_response(state: &HealthServerState) -> HealthResponse {
    let status = if state.is_ready() {
        HealthStatus::Healthy
    } else {
        HealthStatus::ShuttingDown
    };

    HealthResponse {
        status,
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        connections: ConnectionStatus {
            active: state.stats.active_connections(),
            total: state.stats.total_connections(),
            last_connected_at: state.stats.last_connection_at(),
        },
        producers_started: state.stats.producers_started(),
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Health server errors.
#[derive(Debug, thiserror::Error)]
pub enum HealthServerError {
    /// Failed to bind to port.
    #[error("failed to bind to port {0}: {1}")]
    BindFailed(u16, String),

    /// Server error.
    #[error("server error: {0}")]
    ServerFailed(String),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn state(shutdown: &CancellationToken) -> HealthServerState {
        HealthServerState::new(
            "0.1.0".to_string(),
            Arc::new(ServerStats::new()),
            shutdown.clone(),
        )
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::ShuttingDown).unwrap(),
            "\"shutting_down\""
        );
    }

    #[test]
    fn fresh_server_is_healthy_and_idle() {
        let shutdown = CancellationToken::new();
        let response = build_health_response(&state(&shutdown));

        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.version, "0.1.0");
        assert_eq!(response.connections.active, 0);
        assert_eq!(response.connections.total, 0);
        assert!(response.connections.last_connected_at.is_none());
    }

    #[test]
    fn shutdown_flips_readiness() {
        let shutdown = CancellationToken::new();
        let state = state(&shutdown);
        assert!(state.is_ready());

        shutdown.cancel();

        assert!(!state.is_ready());
        assert_eq!(build_health_response(&state).status, HealthStatus::ShuttingDown);
    }

    #[test]
    fn response_serializes_connection_fields() {
        let shutdown = CancellationToken::new();
        let json = serde_json::to_value(build_health_response(&state(&shutdown))).unwrap();

        assert_eq!(json["status"], "healthy");
        assert_eq!(json["connections"]["active"], 0);
        assert!(json["connections"]["last_connected_at"].is_null());
        assert!(json.get("uptime_secs").is_some());
    }
}
