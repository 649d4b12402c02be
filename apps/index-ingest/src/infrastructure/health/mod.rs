//! Health Check and Metrics Endpoint
//!
//! HTTP endpoint for health checks, snapshot freshness and Prometheus
//! metrics. Used by container orchestrators and monitoring systems.
//!
//! # Endpoints
//!
//! - `GET /health` - Returns JSON health status
//! - `GET /healthz` - Kubernetes liveness check (simple OK)
//! - `GET /readyz` - Kubernetes readiness check (a snapshot has been committed)
//! - `GET /metrics` - Prometheus metrics in text format

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::application::services::session_controller::{ControllerStats, SessionController};
use crate::domain::snapshot::{SnapshotStatus, StatusReport};
use crate::infrastructure::metrics::get_metrics_handle;

// =============================================================================
// Health Response Types
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Overall status: "healthy", "degraded", or "unhealthy".
    pub status: HealthStatus,
    /// Service version.
    pub version: String,
    /// Server uptime in seconds.
    pub uptime_secs: u64,
    /// Current time.
    pub current_time: DateTime<Utc>,
    /// Snapshot store summary.
    pub snapshot: StatusReport,
    /// Whether served data is stale.
    pub stale: bool,
    /// Session controller state.
    pub session: ControllerStats,
}

/// Overall health status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Fresh data is being served.
    Healthy,
    /// Old data is being served.
    Degraded,
    /// No data to serve.
    Unhealthy,
}

// =============================================================================
// Health Server State
// =============================================================================

/// Shared state for the health server.
pub struct HealthServerState {
    version: String,
    started_at: Instant,
    controller: Arc<SessionController>,
}

impl HealthServerState {
    /// Create new health server state.
    #[must_use]
    pub fn new(version: String, controller: Arc<SessionController>) -> Self {
        Self {
            version,
            started_at: Instant::now(),
            controller,
        }
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Build the health router.
pub fn router(state: Arc<HealthServerState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/healthz", get(liveness_handler))
        .route("/readyz", get(readiness_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

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
        let app = router(self.state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| HealthServerError::BindFailed(self.port, e.to_string()))?;

        tracing::info!(port = self.port, "Health server listening");

        axum::serve(listener, app)
            .with_graceful_shutdown(self.cancel.cancelled_owned())
            .await
            .map_err(|e| HealthServerError::ServerFailed(e.to_string()))?;

        tracing::info!("Health server stopped");
        Ok(())
    }
}

// =============================================================================
// HTTP Handlers
// =============================================================================

async fn health_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let response = build_health_response(&state);
    let status_code = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };
    (status_code, Json(response))
}

async fn liveness_handler() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

async fn readiness_handler(State(state): State<Arc<HealthServerState>>) -> impl IntoResponse {
    let report = state.controller.store().status();

    if report.last_success_at.is_some() {
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
    let snapshot = state.controller.store().status();
    let stale = snapshot.stale;

    HealthResponse {
        status: determine_health_status(&snapshot),
        version: state.version.clone(),
        uptime_secs: state.started_at.elapsed().as_secs(),
        current_time: Utc::now(),
        snapshot,
        stale,
        session: state.controller.stats(),
    }
}

fn determine_health_status(report: &StatusReport) -> HealthStatus {
    if report.count == 0 {
        HealthStatus::Unhealthy
    } else if report.status == SnapshotStatus::Success && !report.stale {
        HealthStatus::Healthy
    } else {
        HealthStatus::Degraded
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
    use axum::body::{Body, to_bytes};
    use axum::http::Request;
    use tower::ServiceExt;

    use super::*;
    use crate::application::services::extraction::ExtractionEngine;
    use crate::application::services::session_controller::SessionControllerConfig;
    use crate::domain::snapshot::SnapshotStore;
    use crate::infrastructure::browser::mock::{MockBrowser, MockPage};

    fn report(status: SnapshotStatus, count: usize, stale: bool) -> StatusReport {
        StatusReport {
            status,
            count,
            total_attempts: 1,
            failed_attempts: 0,
            last_updated_at: None,
            last_success_at: None,
            success_rate: Some(1.0),
            stale,
        }
    }

    fn state(page: MockPage) -> Arc<HealthServerState> {
        let controller = SessionController::new(
            SessionControllerConfig::default(),
            Arc::new(MockBrowser::with_page(page)),
            ExtractionEngine::default(),
            Arc::new(SnapshotStore::new()),
            CancellationToken::new(),
        );
        Arc::new(HealthServerState::new(
            "0.1.0".to_string(),
            Arc::new(controller),
        ))
    }

    async fn get(state: Arc<HealthServerState>, uri: &str) -> (StatusCode, String) {
        let response = router(state)
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn health_status_serialization() {
        assert_eq!(
            serde_json::to_string(&HealthStatus::Healthy).unwrap(),
            "\"healthy\""
        );
        assert_eq!(
            serde_json::to_string(&HealthStatus::Unhealthy).unwrap(),
            "\"unhealthy\""
        );
    }

    #[test]
    fn determine_status() {
        assert_eq!(
            determine_health_status(&report(SnapshotStatus::Success, 5, false)),
            HealthStatus::Healthy
        );
        assert_eq!(
            determine_health_status(&report(SnapshotStatus::Success, 5, true)),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(&report(SnapshotStatus::Stale, 5, false)),
            HealthStatus::Degraded
        );
        assert_eq!(
            determine_health_status(&report(SnapshotStatus::Error, 0, true)),
            HealthStatus::Unhealthy
        );
    }

    #[tokio::test]
    async fn endpoints_before_first_session() {
        let state = state(MockPage::new());

        let (status, _) = get(Arc::clone(&state), "/healthz").await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = get(Arc::clone(&state), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, "NOT READY");

        let (status, body) = get(state, "/health").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "unhealthy");
        assert_eq!(json["snapshot"]["status"], "initializing");
        assert_eq!(json["session"]["phase"], "idle");
    }

    #[tokio::test]
    async fn endpoints_after_commit() {
        let state = state(MockPage::sample());
        state.controller.run_session().await.unwrap();

        let (status, body) = get(Arc::clone(&state), "/readyz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "READY");

        let (status, body) = get(state, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["stale"], false);
        assert_eq!(json["snapshot"]["count"], 8);
        assert_eq!(json["session"]["successful_sessions"], 1);
    }
}
