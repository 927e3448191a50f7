//! Self-Check Probe - Process-local Health
//!
//! The lightweight probe behind the liveness endpoint. Reports the
//! exporter's own health (success rate, staleness) plus process
//! uptime; no network calls involved.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::domain::health::{HealthCheckResult, HealthStatus};
use crate::ports::health_probe::HealthProbe;
use crate::usecases::exporter::PrometheusExporter;

/// Probe over the gateway process itself.
pub struct SelfCheckProbe {
    exporter: Arc<PrometheusExporter>,
    started_at: Instant,
}

impl SelfCheckProbe {
    pub fn new(exporter: Arc<PrometheusExporter>) -> Self {
        Self {
            exporter,
            started_at: Instant::now(),
        }
    }
}

#[async_trait]
impl HealthProbe for SelfCheckProbe {
    fn name(&self) -> &str {
        "self"
    }

    async fn check_health(&self) -> anyhow::Result<HealthCheckResult> {
        let started = Instant::now();
        let exporter = self.exporter.status();

        let result = match exporter.status {
            HealthStatus::Healthy => HealthCheckResult::healthy(
                self.name(),
                "process responsive, exporter healthy",
                started.elapsed(),
            ),
            HealthStatus::Degraded => HealthCheckResult::degraded(
                self.name(),
                "exporter success rate degraded",
                started.elapsed(),
            ),
            HealthStatus::Unhealthy => HealthCheckResult::unhealthy(
                self.name(),
                "exporter failing",
                started.elapsed(),
            ),
        };

        Ok(result
            .with_data("uptime_seconds", self.started_at.elapsed().as_secs())
            .with_data("export_success_rate", exporter.success_rate)
            .with_data("total_exports", exporter.total_exports))
    }

    async fn can_connect(&self) -> bool {
        true
    }

    async fn measure_latency(&self) -> anyhow::Result<Duration> {
        let started = Instant::now();
        let _ = self.exporter.status();
        Ok(started.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CustomMetricsConfig, TelemetryConfig};
    use crate::usecases::registry::MetricRegistry;

    fn probe() -> SelfCheckProbe {
        let telemetry = TelemetryConfig {
            enabled: true,
            metrics_path: "/metrics".to_string(),
            service_name: "orders-api".to_string(),
            service_version: "1.0.0".to_string(),
            environment: "test".to_string(),
            log_level: "info".to_string(),
            max_concurrent_exports: 2,
            export_interval_seconds: 15,
            remote_write_url: None,
            remote_write_interval_seconds: 60,
        };
        let custom = CustomMetricsConfig::default();
        let registry = Arc::new(MetricRegistry::new(&custom));
        SelfCheckProbe::new(Arc::new(PrometheusExporter::new(
            &telemetry,
            &custom,
            registry,
        )))
    }

    #[tokio::test]
    async fn test_self_check_healthy_with_fresh_exporter() {
        let probe = probe();
        let result = probe.check_health().await.unwrap();
        // No exports yet: success rate is 1.0, classified Healthy.
        assert_eq!(result.status, HealthStatus::Healthy);
        assert!(result.data.contains_key("uptime_seconds"));
    }

    #[tokio::test]
    async fn test_self_check_connectivity() {
        let probe = probe();
        assert!(probe.can_connect().await);
        assert!(probe.measure_latency().await.is_ok());
    }
}
