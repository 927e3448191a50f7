//! Metrics Collector - Point-in-time Value Gathering
//!
//! Gathers system, database, and cache metric groups per configuration
//! and forwards health-check outcomes into registry instruments and the
//! exporter's ad-hoc API. Probe failures never propagate: sentinel
//! values (false, max duration, zero) are substituted instead.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use sysinfo::System;
use tracing::debug;

use crate::config::MonitoringConfig;
use crate::domain::health::{HealthCheckResult, HealthStatus};
use crate::domain::metrics::{unix_millis_now, LabelSet, MetricError};
use crate::ports::health_probe::{CacheProbe, DatabaseProbe};
use crate::usecases::exporter::PrometheusExporter;
use crate::usecases::registry::{Counter, Histogram, MetricRegistry};

/// Numeric code a health status is exported as.
fn status_code(status: HealthStatus) -> f64 {
  match status {
    HealthStatus::Healthy => 0.0,
    HealthStatus::Degraded => 1.0,
    HealthStatus::Unhealthy => 2.0,
  }
}

/// Cap a duration to representable milliseconds.
fn millis_capped(duration: Duration) -> u64 {
  duration.as_millis().min(u128::from(u64::MAX)) as u64
}

/// Collector over optional dependency probes and the exporter.
pub struct MetricsCollector {
  collect_system: bool,
  collect_database: bool,
  collect_cache: bool,
  database: Option<Arc<dyn DatabaseProbe>>,
  cache: Option<Arc<dyn CacheProbe>>,
  exporter: Arc<PrometheusExporter>,
  // Absent when custom metrics are disabled on the registry.
  check_count: Option<Arc<Counter>>,
  check_duration: Option<Arc<Histogram>>,
  system: Mutex<System>,
}

impl MetricsCollector {
  /// Build a collector; registers its instruments on the registry.
  ///
  /// With custom metrics disabled the instruments stay unregistered and
  /// forwarding degrades to the exporter's ad-hoc path only.
  pub fn new(
    config: &MonitoringConfig,
    registry: &MetricRegistry,
    exporter: Arc<PrometheusExporter>,
    database: Option<Arc<dyn DatabaseProbe>>,
    cache: Option<Arc<dyn CacheProbe>>,
  ) -> Self {
    let check_count = registry
      .create_counter(
        "monitoring_health_checks_total",
        None,
        Some("Health check executions"),
      )
      .map_err(|e| debug!(error = %e, "Health-check counter unavailable"))
      .ok();
    let check_duration = registry
      .create_histogram(
        "monitoring_health_check_duration_seconds",
        Some("s"),
        Some("Health check duration"),
      )
      .map_err(|e| debug!(error = %e, "Health-check histogram unavailable"))
      .ok();

    Self {
      collect_system: config.collect_system_metrics,
      collect_database: config.collect_database_metrics,
      collect_cache: config.collect_cache_metrics,
      database,
      cache,
      exporter,
      check_count,
      check_duration,
      system: Mutex::new(System::new()),
    }
  }

  // ── Group collection ─────────────────────────────────────

  /// Collect all enabled metric groups with prefixed keys.
  pub async fn collect_all_metrics(&self) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();

    if self.collect_system {
      merge_prefixed(&mut out, "system_", self.collect_system_metrics());
    }
    if self.collect_database {
      merge_prefixed(&mut out, "database_", self.collect_database_metrics().await);
    }
    if self.collect_cache {
      merge_prefixed(&mut out, "cache_", self.collect_cache_metrics().await);
    }

    out.insert(
      "collected_at_ms".to_string(),
      Value::from(unix_millis_now()),
    );
    out
  }

  /// Process and host readings via sysinfo.
  pub fn collect_system_metrics(&self) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    if let Ok(mut system) = self.system.lock() {
      system.refresh_memory();
      system.refresh_cpu_usage();
      out.insert("memory_total_bytes".to_string(), Value::from(system.total_memory()));
      out.insert("memory_used_bytes".to_string(), Value::from(system.used_memory()));
      out.insert(
        "cpu_usage_percent".to_string(),
        Value::from(f64::from(system.global_cpu_usage())),
      );
    }
    out.insert("uptime_seconds".to_string(), Value::from(System::uptime()));
    out
  }

  /// Database probe readings; sentinels on failure.
  pub async fn collect_database_metrics(&self) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    let Some(probe) = &self.database else {
      return out;
    };

    let connected = probe.can_connect().await;
    let latency = if connected {
      probe.measure_latency().await.unwrap_or(Duration::MAX)
    } else {
      Duration::MAX
    };
    let migrations_current = probe.are_migrations_current().await.unwrap_or(false);

    out.insert("connected".to_string(), Value::from(connected));
    out.insert("latency_ms".to_string(), Value::from(millis_capped(latency)));
    out.insert(
      "migrations_current".to_string(),
      Value::from(migrations_current),
    );
    out
  }

  /// Cache probe readings; sentinels on failure.
  pub async fn collect_cache_metrics(&self) -> BTreeMap<String, Value> {
    let mut out = BTreeMap::new();
    let Some(probe) = &self.cache else {
      return out;
    };

    let connected = probe.can_connect().await;
    let latency = if connected {
      probe.measure_latency().await.unwrap_or(Duration::MAX)
    } else {
      Duration::MAX
    };
    let read_write_ok = probe.can_read_write().await.unwrap_or(false);
    let memory_usage = probe.memory_usage_bytes().await.unwrap_or(0);

    out.insert("connected".to_string(), Value::from(connected));
    out.insert("latency_ms".to_string(), Value::from(millis_capped(latency)));
    out.insert("read_write_ok".to_string(), Value::from(read_write_ok));
    out.insert("memory_usage_bytes".to_string(), Value::from(memory_usage));
    out
  }

  // ── Health-check forwarding ──────────────────────────────

  /// Count one health-check run for a given check and status.
  pub fn increment_health_check_count(&self, check: &str, status: HealthStatus) {
    if let Some(counter) = &self.check_count {
      counter.increment();
    }
    let status = status.to_string();
    self.forward(self.exporter.increment_counter(
      "monitoring_health_check_runs_total",
      1,
      LabelSet::from_pairs([("check", check), ("status", status.as_str())]),
    ));
  }

  /// Record how long one health check took.
  pub fn record_health_check_duration(&self, check: &str, duration: Duration) {
    if let Some(histogram) = &self.check_duration {
      histogram.record(duration.as_secs_f64());
    }
    self.forward(self.exporter.record_histogram(
      "monitoring_health_check_seconds",
      duration.as_secs_f64(),
      LabelSet::from_pairs([("check", check)]),
    ));
  }

  /// Record a full health-check result (count, duration, status gauge).
  pub fn record_health_check_result(&self, result: &HealthCheckResult) {
    self.increment_health_check_count(&result.name, result.status);
    self.record_health_check_duration(&result.name, result.duration);
    self.forward(self.exporter.set_gauge(
      "monitoring_health_check_status",
      status_code(result.status),
      LabelSet::from_pairs([("check", result.name.as_str())]),
    ));
  }

  /// Own instrument names are static and valid; only a poisoned table
  /// can fail here, which is not worth surfacing to probe callers.
  fn forward(&self, outcome: Result<(), MetricError>) {
    if let Err(e) = outcome {
      debug!(error = %e, "Health-check metric forwarding failed");
    }
  }
}

fn merge_prefixed(
  out: &mut BTreeMap<String, Value>,
  prefix: &str,
  group: BTreeMap<String, Value>,
) {
  for (key, value) in group {
    out.insert(format!("{prefix}{key}"), value);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{CustomMetricsConfig, TelemetryConfig};

  fn wiring() -> (Arc<MetricRegistry>, Arc<PrometheusExporter>) {
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
    (registry, exporter)
  }

  #[tokio::test]
  async fn test_system_group_collected_with_prefix() {
    let (registry, exporter) = wiring();
    let collector = MetricsCollector::new(
      &MonitoringConfig::default(),
      &registry,
      exporter,
      None,
      None,
    );

    let all = collector.collect_all_metrics().await;
    assert!(all.contains_key("collected_at_ms"));
    assert!(all.contains_key("system_uptime_seconds"));
    // No probes wired, so no database/cache keys.
    assert!(!all.keys().any(|k| k.starts_with("database_")));
    assert!(!all.keys().any(|k| k.starts_with("cache_")));
  }

  #[tokio::test]
  async fn test_result_forwarding_reaches_exporter() {
    let (registry, exporter) = wiring();
    let collector = MetricsCollector::new(
      &MonitoringConfig::default(),
      &registry,
      Arc::clone(&exporter),
      None,
      None,
    );

    let result = HealthCheckResult::unhealthy(
      "database",
      "connection refused",
      Duration::from_millis(40),
    );
    collector.record_health_check_result(&result);

    let snapshot = exporter.snapshot().unwrap();
    let status = snapshot
      .samples
      .iter()
      .find(|s| s.name == "monitoring_health_check_status")
      .unwrap();
    assert_eq!(status.value.as_f64(), 2.0);

    let runs = snapshot
      .samples
      .iter()
      .find(|s| s.name == "monitoring_health_check_runs_total")
      .unwrap();
    assert_eq!(runs.labels.storage_key(), "check=database,status=unhealthy");

    // Registry-side instruments advanced too.
    assert_eq!(collector.check_count.as_ref().unwrap().value(), 1);
    assert_eq!(collector.check_duration.as_ref().unwrap().count(), 1);
  }

  #[tokio::test]
  async fn test_disabled_registry_degrades_to_adhoc_only() {
    let custom = CustomMetricsConfig {
      enable_custom_metrics: false,
      ..CustomMetricsConfig::default()
    };
    let registry = Arc::new(MetricRegistry::new(&custom));
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
    let exporter = Arc::new(PrometheusExporter::new(
      &telemetry,
      &custom,
      Arc::clone(&registry),
    ));
    let collector = MetricsCollector::new(
      &MonitoringConfig::default(),
      &registry,
      Arc::clone(&exporter),
      None,
      None,
    );
    assert!(collector.check_count.is_none());

    // Forwarding still reaches the ad-hoc tables without panicking.
    let result =
      HealthCheckResult::healthy("self", "ok", Duration::from_millis(2));
    collector.record_health_check_result(&result);
    let snapshot = exporter.snapshot().unwrap();
    assert!(snapshot
      .samples
      .iter()
      .any(|s| s.name == "monitoring_health_check_status"));
  }
}
