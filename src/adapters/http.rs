//! Telemetry HTTP Server - Scrape and Probe Endpoints
//!
//! Exposes the gated Prometheus scrape endpoint plus /live and /ready
//! probes via axum 0.7. Every scrape request passes the security gate
//! first: rate-limit trips answer 429, authentication denials 401,
//! other denials 403. Probe endpoints return the JSON health report.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use tokio::sync::broadcast;
use tracing::{info, instrument};

use crate::domain::exposition;
use crate::domain::health::HealthStatus;
use crate::usecases::exporter::PrometheusExporter;
use crate::usecases::health_orchestrator::{HealthCheckOrchestrator, HealthCheckType};
use crate::usecases::security_gate::{
    AccessRequest, EndpointSecurityGate, ValidationType,
};

/// Shared state behind all gateway endpoints.
pub struct GatewayState {
    pub exporter: Arc<PrometheusExporter>,
    pub gate: Arc<EndpointSecurityGate>,
    pub orchestrator: Arc<HealthCheckOrchestrator>,
    pub metrics_path: String,
}

/// Axum-based telemetry HTTP server.
///
/// Serves the configured scrape path plus liveness (/live) and
/// readiness (/ready) endpoints for orchestrator probes.
pub struct TelemetryServer {
    state: Arc<GatewayState>,
    bind_address: String,
}

impl TelemetryServer {
    /// Create a new telemetry server.
    pub fn new(state: Arc<GatewayState>, bind_address: String) -> Self {
        Self {
            state,
            bind_address,
        }
    }

    /// Build the router; exposed separately for integration tests.
    pub fn router(state: Arc<GatewayState>) -> Router {
        let metrics_path = state.metrics_path.clone();
        Router::new()
            .route(&metrics_path, get(scrape))
            .route("/live", get(liveness))
            .route("/ready", get(readiness))
            .with_state(state)
    }

    /// Start the server and run until the shutdown signal.
    #[instrument(skip(self, shutdown_rx))]
    pub async fn run(
        self,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> anyhow::Result<()> {
        let app = Self::router(Arc::clone(&self.state));

        let listener = tokio::net::TcpListener::bind(&self.bind_address).await?;
        info!(
            address = %self.bind_address,
            metrics_path = %self.state.metrics_path,
            "Telemetry server started"
        );

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
            })
            .await?;

        Ok(())
    }
}

/// Build a transport-agnostic access request from HTTP headers.
fn access_request_from(headers: &HeaderMap, endpoint: &str) -> AccessRequest {
    let value = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    AccessRequest {
        endpoint: endpoint.to_string(),
        forwarded_for: value("x-forwarded-for"),
        real_ip: value("x-real-ip"),
        authorization: value("authorization"),
        user_agent: value("user-agent"),
    }
}

/// Scrape handler: security gate, then exposition text.
async fn scrape(State(state): State<Arc<GatewayState>>, headers: HeaderMap) -> Response {
    let started = Instant::now();
    let request = access_request_from(&headers, &state.metrics_path);
    let client_ip = request.client_ip();

    if state.gate.should_rate_limit(&client_ip, &state.metrics_path) {
        return (StatusCode::TOO_MANY_REQUESTS, "rate limit exceeded").into_response();
    }

    let result = state.gate.validate_request(&request);
    state
        .gate
        .record_access_attempt(&request, &result, started.elapsed());

    if !result.is_valid {
        let status = match result.validation_type {
            ValidationType::Authentication => StatusCode::UNAUTHORIZED,
            _ => StatusCode::FORBIDDEN,
        };
        return (status, "access denied").into_response();
    }

    match state.exporter.export().await {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, exposition::CONTENT_TYPE)],
            body,
        )
            .into_response(),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("export failed: {e}"),
        )
            .into_response(),
    }
}

/// Liveness probe: self-check only.
async fn liveness(State(state): State<Arc<GatewayState>>) -> Response {
    let report = state
        .orchestrator
        .check_health(HealthCheckType::Liveness)
        .await;
    let status = http_status_for(report.status);
    (status, Json(report)).into_response()
}

/// Readiness probe: self-check plus all dependency probes.
async fn readiness(State(state): State<Arc<GatewayState>>) -> Response {
    let report = state
        .orchestrator
        .check_health(HealthCheckType::Readiness)
        .await;
    let status = http_status_for(report.status);
    (status, Json(report)).into_response()
}

/// Degraded still serves traffic; only Unhealthy answers 503.
fn http_status_for(status: HealthStatus) -> StatusCode {
    match status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    }
}
