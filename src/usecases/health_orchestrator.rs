//! Health Check Orchestrator - Concurrent Probe Execution
//!
//! Runs the configured probe set concurrently under one deadline,
//! substitutes synthetic Unhealthy results for probes that overrun it,
//! aggregates worst-of, and optionally caches the last report for a
//! short TTL behind a double-checked lock.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::future::join_all;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::MonitoringConfig;
use crate::domain::health::{HealthCheckReport, HealthCheckResult, HealthStatus};
use crate::ports::health_probe::HealthProbe;
use crate::usecases::collector::MetricsCollector;

/// Description used for probes that miss the deadline.
const TIMEOUT_DESCRIPTION: &str = "Health check timed out";

/// Which probe set a caller wants evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthCheckType {
  /// Lightweight self-check only.
  Liveness,
  /// Self-check plus all dependency probes.
  Readiness,
  /// Same probe set as readiness; reported in full.
  Full,
}

struct CachedReport {
  report: HealthCheckReport,
  stored_at: Instant,
}

/// Orchestrates health probes into one aggregate report.
pub struct HealthCheckOrchestrator {
  enabled: bool,
  cache_results: bool,
  cache_ttl: Duration,
  check_timeout: Duration,
  self_probe: Arc<dyn HealthProbe>,
  dependency_probes: Vec<Arc<dyn HealthProbe>>,
  collector: Arc<MetricsCollector>,
  cache: Mutex<Option<CachedReport>>,
}

impl HealthCheckOrchestrator {
  pub fn new(
    config: &MonitoringConfig,
    self_probe: Arc<dyn HealthProbe>,
    collector: Arc<MetricsCollector>,
  ) -> Self {
    Self {
      enabled: config.enabled,
      cache_results: config.cache_results,
      cache_ttl: Duration::from_secs(config.cache_duration_seconds),
      check_timeout: Duration::from_secs(config.health_check_timeout_seconds),
      self_probe,
      dependency_probes: Vec::new(),
      collector,
      cache: Mutex::new(None),
    }
  }

  /// Register a dependency probe (database, cache, ...). Called during
  /// wiring, before the orchestrator is shared.
  pub fn register_probe(&mut self, probe: Arc<dyn HealthProbe>) {
    self.dependency_probes.push(probe);
  }

  /// Evaluate the probe set for `check_type` and aggregate a report.
  pub async fn check_health(&self, check_type: HealthCheckType) -> HealthCheckReport {
    if !self.enabled {
      return HealthCheckReport::empty();
    }

    if !self.cache_results {
      return self.run_checks(check_type).await;
    }

    // Fast path: fresh cached report.
    if let Some(report) = self.cached_fresh().await {
      return report;
    }

    // Slow path: recompute under the lock, double-checking first so
    // concurrent callers don't duplicate the work.
    let mut guard = self.cache.lock().await;
    if let Some(cached) = guard.as_ref() {
      if cached.stored_at.elapsed() < self.cache_ttl {
        return cached.report.clone();
      }
    }

    let report = self.run_checks(check_type).await;
    *guard = Some(CachedReport {
      report: report.clone(),
      stored_at: Instant::now(),
    });
    report
  }

  /// Liveness status only; any failure maps to Unhealthy.
  pub async fn check_liveness(&self) -> HealthStatus {
    self.check_health(HealthCheckType::Liveness).await.status
  }

  /// Readiness status only; any failure maps to Unhealthy.
  pub async fn check_readiness(&self) -> HealthStatus {
    self.check_health(HealthCheckType::Readiness).await.status
  }

  /// True iff the liveness status is Healthy.
  pub async fn is_healthy(&self) -> bool {
    self.check_liveness().await == HealthStatus::Healthy
  }

  async fn cached_fresh(&self) -> Option<HealthCheckReport> {
    let guard = self.cache.lock().await;
    guard.as_ref().and_then(|cached| {
      (cached.stored_at.elapsed() < self.cache_ttl).then(|| cached.report.clone())
    })
  }

  /// Run the selected probes concurrently under the shared deadline.
  async fn run_checks(&self, check_type: HealthCheckType) -> HealthCheckReport {
    let started = Instant::now();

    let mut probes: Vec<Arc<dyn HealthProbe>> = vec![Arc::clone(&self.self_probe)];
    if matches!(
      check_type,
      HealthCheckType::Readiness | HealthCheckType::Full
    ) {
      probes.extend(self.dependency_probes.iter().cloned());
    }

    let deadline = self.check_timeout;
    let runs = probes.into_iter().map(|probe| async move {
      let name = probe.name().to_string();
      let probe_started = Instant::now();
      match tokio::time::timeout(deadline, probe.check_health()).await {
        Ok(Ok(result)) => result,
        Ok(Err(e)) => {
          warn!(check = %name, error = %e, "Health probe failed");
          HealthCheckResult::unhealthy(
            &name,
            format!("Probe failed: {e}"),
            probe_started.elapsed(),
          )
          .with_error(e.to_string())
        }
        Err(_) => {
          warn!(check = %name, timeout_ms = deadline.as_millis() as u64, "Health probe timed out");
          HealthCheckResult::unhealthy(
            &name,
            TIMEOUT_DESCRIPTION,
            probe_started.elapsed(),
          )
        }
      }
    });

    let results = join_all(runs).await;

    for result in &results {
      self.collector.record_health_check_result(result);
    }

    let report = HealthCheckReport::aggregate(results, started.elapsed());
    debug!(
      status = %report.status,
      checks = report.results.len(),
      duration_ms = report.total_duration.as_millis() as u64,
      "Health check pass complete"
    );
    report
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use async_trait::async_trait;

  use crate::config::{CustomMetricsConfig, TelemetryConfig};
  use crate::usecases::exporter::PrometheusExporter;
  use crate::usecases::registry::MetricRegistry;

  struct StaticProbe {
    name: &'static str,
    status: HealthStatus,
    delay: Duration,
  }

  #[async_trait]
  impl HealthProbe for StaticProbe {
    fn name(&self) -> &str {
      self.name
    }

    async fn check_health(&self) -> anyhow::Result<HealthCheckResult> {
      tokio::time::sleep(self.delay).await;
      Ok(match self.status {
        HealthStatus::Healthy => {
          HealthCheckResult::healthy(self.name, "ok", self.delay)
        }
        HealthStatus::Degraded => {
          HealthCheckResult::degraded(self.name, "slow", self.delay)
        }
        HealthStatus::Unhealthy => {
          HealthCheckResult::unhealthy(self.name, "down", self.delay)
        }
      })
    }

    async fn can_connect(&self) -> bool {
      true
    }

    async fn measure_latency(&self) -> anyhow::Result<Duration> {
      Ok(self.delay)
    }
  }

  struct FailingProbe;

  #[async_trait]
  impl HealthProbe for FailingProbe {
    fn name(&self) -> &str {
      "failing"
    }

    async fn check_health(&self) -> anyhow::Result<HealthCheckResult> {
      anyhow::bail!("connection refused")
    }

    async fn can_connect(&self) -> bool {
      false
    }

    async fn measure_latency(&self) -> anyhow::Result<Duration> {
      anyhow::bail!("connection refused")
    }
  }

  fn collector() -> Arc<MetricsCollector> {
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
    let exporter = Arc::new(PrometheusExporter::new(
      &telemetry,
      &custom,
      Arc::clone(&registry),
    ));
    Arc::new(MetricsCollector::new(
      &MonitoringConfig::default(),
      &registry,
      exporter,
      None,
      None,
    ))
  }

  fn self_probe() -> Arc<dyn HealthProbe> {
    Arc::new(StaticProbe {
      name: "self",
      status: HealthStatus::Healthy,
      delay: Duration::ZERO,
    })
  }

  fn monitoring(cache: bool, ttl_secs: u64, timeout_secs: u64) -> MonitoringConfig {
    MonitoringConfig {
      cache_results: cache,
      cache_duration_seconds: ttl_secs,
      health_check_timeout_seconds: timeout_secs,
      ..MonitoringConfig::default()
    }
  }

  #[tokio::test]
  async fn test_disabled_returns_empty_healthy() {
    let config = MonitoringConfig {
      enabled: false,
      ..MonitoringConfig::default()
    };
    let orchestrator = HealthCheckOrchestrator::new(&config, self_probe(), collector());
    let report = orchestrator.check_health(HealthCheckType::Full).await;
    assert_eq!(report.status, HealthStatus::Healthy);
    assert!(report.results.is_empty());
  }

  #[tokio::test]
  async fn test_liveness_runs_self_check_only() {
    let mut orchestrator =
      HealthCheckOrchestrator::new(&monitoring(false, 10, 5), self_probe(), collector());
    orchestrator.register_probe(Arc::new(StaticProbe {
      name: "database",
      status: HealthStatus::Unhealthy,
      delay: Duration::ZERO,
    }));

    let report = orchestrator.check_health(HealthCheckType::Liveness).await;
    assert_eq!(report.results.len(), 1);
    assert!(report.results.contains_key("self"));
    assert_eq!(report.status, HealthStatus::Healthy);
  }

  #[tokio::test]
  async fn test_readiness_includes_dependencies_worst_of() {
    let mut orchestrator =
      HealthCheckOrchestrator::new(&monitoring(false, 10, 5), self_probe(), collector());
    orchestrator.register_probe(Arc::new(StaticProbe {
      name: "database",
      status: HealthStatus::Degraded,
      delay: Duration::ZERO,
    }));
    orchestrator.register_probe(Arc::new(StaticProbe {
      name: "cache",
      status: HealthStatus::Healthy,
      delay: Duration::ZERO,
    }));

    let report = orchestrator.check_health(HealthCheckType::Readiness).await;
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.status, HealthStatus::Degraded);
  }

  #[tokio::test]
  async fn test_probe_error_becomes_unhealthy_result() {
    let mut orchestrator =
      HealthCheckOrchestrator::new(&monitoring(false, 10, 5), self_probe(), collector());
    orchestrator.register_probe(Arc::new(FailingProbe));

    let report = orchestrator.check_health(HealthCheckType::Full).await;
    let failing = &report.results["failing"];
    assert_eq!(failing.status, HealthStatus::Unhealthy);
    assert_eq!(failing.error.as_deref(), Some("connection refused"));
    assert_eq!(report.status, HealthStatus::Unhealthy);
  }

  #[tokio::test]
  async fn test_slow_probe_gets_synthetic_timeout_result() {
    let mut orchestrator =
      HealthCheckOrchestrator::new(&monitoring(false, 10, 1), self_probe(), collector());
    orchestrator.register_probe(Arc::new(StaticProbe {
      name: "database",
      status: HealthStatus::Healthy,
      delay: Duration::from_secs(30),
    }));
    orchestrator.register_probe(Arc::new(StaticProbe {
      name: "cache",
      status: HealthStatus::Healthy,
      delay: Duration::ZERO,
    }));

    let report = orchestrator.check_health(HealthCheckType::Full).await;
    assert_eq!(report.results["database"].status, HealthStatus::Unhealthy);
    assert_eq!(report.results["database"].description, "Health check timed out");
    assert_eq!(report.results["cache"].status, HealthStatus::Healthy);
    assert_eq!(report.results["self"].status, HealthStatus::Healthy);
    assert_eq!(report.status, HealthStatus::Unhealthy);
  }

  #[tokio::test]
  async fn test_cached_report_returned_within_ttl() {
    let orchestrator = HealthCheckOrchestrator::new(
      &monitoring(true, 60, 5),
      self_probe(),
      collector(),
    );

    let first = orchestrator.check_health(HealthCheckType::Readiness).await;
    let second = orchestrator.check_health(HealthCheckType::Readiness).await;
    assert_eq!(first, second);
    assert_eq!(first.generated_at, second.generated_at);
  }

  #[tokio::test]
  async fn test_cache_expiry_triggers_recomputation() {
    let orchestrator = HealthCheckOrchestrator::new(
      &monitoring(true, 1, 5),
      self_probe(),
      collector(),
    );

    let first = orchestrator.check_health(HealthCheckType::Readiness).await;
    tokio::time::sleep(Duration::from_millis(1100)).await;
    let second = orchestrator.check_health(HealthCheckType::Readiness).await;
    assert_ne!(first.generated_at, second.generated_at);
  }

  #[tokio::test]
  async fn test_liveness_wrappers() {
    let orchestrator = HealthCheckOrchestrator::new(
      &monitoring(false, 10, 5),
      self_probe(),
      collector(),
    );
    assert_eq!(orchestrator.check_liveness().await, HealthStatus::Healthy);
    assert!(orchestrator.is_healthy().await);
  }
}
