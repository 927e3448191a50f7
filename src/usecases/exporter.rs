//! Prometheus Exporter - Snapshot Assembly and Exposition
//!
//! Builds full metrics snapshots (built-in process samples, ad-hoc
//! application samples, registry diagnostics) and renders them to
//! Prometheus text. Exports run through a bounded slot pool and feed
//! success/failure accounting into the exporter's own health status.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeZone, Utc};
use sysinfo::{Pid, ProcessesToUpdate, System};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::{CustomMetricsConfig, TelemetryConfig};
use crate::domain::exposition;
use crate::domain::health::HealthStatus;
use crate::domain::metrics::{
  unix_millis_now, validate_metric_name, InstrumentKind, LabelSet, MetricError,
  MetricSample, MetricsSnapshot, SampleValue,
};
use crate::usecases::registry::MetricRegistry;

/// Point-in-time exporter health.
#[derive(Debug, Clone, PartialEq)]
pub struct ExporterStatus {
  /// Classified by success rate: >=0.95 Healthy, >=0.85 Degraded.
  pub status: HealthStatus,
  /// True iff success rate > 0.95 and the last export is recent
  /// (within twice the configured export interval).
  pub healthy: bool,
  pub success_rate: f64,
  pub total_exports: u64,
  pub failed_exports: u64,
  pub last_export_at: Option<DateTime<Utc>>,
  pub last_duration: Duration,
  pub last_error: Option<String>,
}

/// Latest value of one ad-hoc series.
#[derive(Debug, Clone, PartialEq)]
enum AdHocValue {
  Counter(u64),
  Gauge(f64),
  /// Ad-hoc histograms only track a running sum and count.
  HistogramPair { sum: f64, count: u64 },
}

impl AdHocValue {
  fn kind(&self) -> InstrumentKind {
    match self {
      Self::Counter(_) => InstrumentKind::Counter,
      Self::Gauge(_) => InstrumentKind::Gauge,
      Self::HistogramPair { .. } => InstrumentKind::Histogram,
    }
  }
}

#[derive(Debug, Clone)]
struct AdHocEntry {
  name: String,
  labels: LabelSet,
  help: Option<String>,
  value: AdHocValue,
  updated_ms: u64,
}

/// Exporter over a shared registry plus its own ad-hoc sample table.
pub struct PrometheusExporter {
  service_name: String,
  service_version: String,
  environment: String,
  export_interval: Duration,
  validate_names: bool,
  allowed_prefixes: Vec<String>,
  registry: Arc<MetricRegistry>,
  export_slots: Semaphore,
  /// Keyed by (name, serialized sorted label set).
  adhoc: Mutex<HashMap<(String, String), AdHocEntry>>,
  exports_ok: AtomicU64,
  exports_failed: AtomicU64,
  /// Unix millis of the last finished export; 0 = never.
  last_export_ms: AtomicU64,
  last_duration_us: AtomicU64,
  last_error: Mutex<Option<String>>,
  started_at: Instant,
  system: Mutex<System>,
  pid: Option<Pid>,
}

impl PrometheusExporter {
  pub fn new(
    telemetry: &TelemetryConfig,
    custom: &CustomMetricsConfig,
    registry: Arc<MetricRegistry>,
  ) -> Self {
    Self {
      service_name: telemetry.service_name.clone(),
      service_version: telemetry.service_version.clone(),
      environment: telemetry.environment.clone(),
      export_interval: Duration::from_secs(telemetry.export_interval_seconds),
      validate_names: custom.validate_metric_names,
      allowed_prefixes: custom.metric_prefixes.clone(),
      registry,
      export_slots: Semaphore::new(telemetry.max_concurrent_exports),
      adhoc: Mutex::new(HashMap::new()),
      exports_ok: AtomicU64::new(0),
      exports_failed: AtomicU64::new(0),
      last_export_ms: AtomicU64::new(0),
      last_duration_us: AtomicU64::new(0),
      last_error: Mutex::new(None),
      started_at: Instant::now(),
      system: Mutex::new(System::new()),
      pid: sysinfo::get_current_pid().ok(),
    }
  }

  // ── Ad-hoc recording API ─────────────────────────────────

  /// Record an arbitrary point-in-time value (gauge semantics).
  pub fn record_custom_metric(
    &self,
    name: &str,
    value: f64,
    labels: LabelSet,
    help: Option<&str>,
  ) -> Result<(), MetricError> {
    self.upsert(name, labels, help, AdHocValue::Gauge(value), |entry| {
      entry.value = AdHocValue::Gauge(value);
    })
  }

  /// Increment an ad-hoc counter series.
  pub fn increment_counter(
    &self,
    name: &str,
    delta: u64,
    labels: LabelSet,
  ) -> Result<(), MetricError> {
    self.upsert(name, labels, None, AdHocValue::Counter(delta), |entry| {
      if let AdHocValue::Counter(current) = &mut entry.value {
        *current += delta;
      }
    })
  }

  /// Record one ad-hoc histogram observation (sum/count only).
  pub fn record_histogram(
    &self,
    name: &str,
    value: f64,
    labels: LabelSet,
  ) -> Result<(), MetricError> {
    self.upsert(
      name,
      labels,
      None,
      AdHocValue::HistogramPair {
        sum: value,
        count: 1,
      },
      |entry| {
        if let AdHocValue::HistogramPair { sum, count } = &mut entry.value {
          *sum += value;
          *count += 1;
        }
      },
    )
  }

  /// Set an ad-hoc gauge series.
  pub fn set_gauge(
    &self,
    name: &str,
    value: f64,
    labels: LabelSet,
  ) -> Result<(), MetricError> {
    self.record_custom_metric(name, value, labels, None)
  }

  /// Shared ad-hoc upsert: validate, then insert or merge.
  fn upsert(
    &self,
    name: &str,
    labels: LabelSet,
    help: Option<&str>,
    initial: AdHocValue,
    merge: impl FnOnce(&mut AdHocEntry),
  ) -> Result<(), MetricError> {
    if self.validate_names {
      validate_metric_name(name, &self.allowed_prefixes)?;
    }

    let key = (name.to_string(), labels.storage_key());
    let mut table = self
      .adhoc
      .lock()
      .map_err(|_| MetricError::Export("ad-hoc sample table poisoned".to_string()))?;

    match table.get_mut(&key) {
      Some(entry) => {
        if entry.value.kind() != initial.kind() {
          return Err(MetricError::TypeConflict {
            name: name.to_string(),
            existing: entry.value.kind(),
            requested: initial.kind(),
          });
        }
        merge(entry);
        entry.updated_ms = unix_millis_now();
        if help.is_some() {
          entry.help = help.map(str::to_string);
        }
      }
      None => {
        table.insert(
          key,
          AdHocEntry {
            name: name.to_string(),
            labels,
            help: help.map(str::to_string),
            value: initial,
            updated_ms: unix_millis_now(),
          },
        );
      }
    }
    Ok(())
  }

  // ── Export path ──────────────────────────────────────────

  /// Render the full exposition text through a bounded export slot.
  ///
  /// Success/failure and duration are recorded regardless of outcome;
  /// on failure the error propagates to the scrape caller.
  pub async fn export(&self) -> Result<String, MetricError> {
    let _permit = self
      .export_slots
      .acquire()
      .await
      .map_err(|_| MetricError::Export("export slot pool closed".to_string()))?;

    let started = Instant::now();
    match self.snapshot() {
      Ok(snapshot) => {
        let text = exposition::render(&snapshot);
        self.record_success(started.elapsed());
        debug!(
          samples = snapshot.total_count(),
          duration_us = started.elapsed().as_micros() as u64,
          "Metrics exported"
        );
        Ok(text)
      }
      Err(e) => {
        self.record_failure(started.elapsed(), &e);
        warn!(error = %e, "Metrics export failed");
        Err(e)
      }
    }
  }

  /// Build a full snapshot: built-ins, ad-hoc samples, registry info.
  pub fn snapshot(&self) -> Result<MetricsSnapshot, MetricError> {
    let started = Instant::now();
    let now_ms = unix_millis_now();

    let mut samples = self.builtin_samples(now_ms);
    self.append_adhoc_samples(&mut samples)?;
    self.append_registry_samples(&mut samples, now_ms);

    Ok(MetricsSnapshot {
      service_name: self.service_name.clone(),
      service_version: self.service_version.clone(),
      environment: self.environment.clone(),
      service_labels: LabelSet::from_pairs([(
        "version",
        self.service_version.as_str(),
      )]),
      samples,
      collection_duration: started.elapsed(),
    })
  }

  /// Exporter health derived from export accounting.
  pub fn status(&self) -> ExporterStatus {
    let ok = self.exports_ok.load(Ordering::Relaxed);
    let failed = self.exports_failed.load(Ordering::Relaxed);
    let total = ok + failed;
    let success_rate = if total == 0 {
      1.0
    } else {
      ok as f64 / total as f64
    };

    let last_ms = self.last_export_ms.load(Ordering::Relaxed);
    let staleness_limit = 2 * self.export_interval.as_millis() as u64;
    let fresh =
      last_ms != 0 && unix_millis_now().saturating_sub(last_ms) <= staleness_limit;

    let status = if success_rate >= 0.95 {
      HealthStatus::Healthy
    } else if success_rate >= 0.85 {
      HealthStatus::Degraded
    } else {
      HealthStatus::Unhealthy
    };

    ExporterStatus {
      status,
      healthy: success_rate > 0.95 && fresh,
      success_rate,
      total_exports: total,
      failed_exports: failed,
      last_export_at: (last_ms != 0)
        .then(|| Utc.timestamp_millis_opt(last_ms as i64).single())
        .flatten(),
      last_duration: Duration::from_micros(self.last_duration_us.load(Ordering::Relaxed)),
      last_error: self.last_error.lock().ok().and_then(|g| g.clone()),
    }
  }

  fn record_success(&self, duration: Duration) {
    self.exports_ok.fetch_add(1, Ordering::Relaxed);
    self
      .last_export_ms
      .store(unix_millis_now(), Ordering::Relaxed);
    self
      .last_duration_us
      .store(duration.as_micros() as u64, Ordering::Relaxed);
  }

  fn record_failure(&self, duration: Duration, error: &MetricError) {
    self.exports_failed.fetch_add(1, Ordering::Relaxed);
    self
      .last_export_ms
      .store(unix_millis_now(), Ordering::Relaxed);
    self
      .last_duration_us
      .store(duration.as_micros() as u64, Ordering::Relaxed);
    if let Ok(mut guard) = self.last_error.lock() {
      *guard = Some(error.to_string());
    }
  }

  // ── Snapshot sources ─────────────────────────────────────

  /// Built-in process/runtime samples under the reserved prefixes.
  fn builtin_samples(&self, now_ms: u64) -> Vec<MetricSample> {
    let mut samples = Vec::with_capacity(8);
    let gauge = |name: &str, value: SampleValue, help: &str| MetricSample {
      name: name.to_string(),
      kind: InstrumentKind::Gauge,
      value,
      labels: LabelSet::new(),
      timestamp_ms: now_ms,
      help: Some(help.to_string()),
    };
    let counter = |name: &str, value: u64, help: &str| MetricSample {
      name: name.to_string(),
      kind: InstrumentKind::Counter,
      value: SampleValue::UInt(value),
      labels: LabelSet::new(),
      timestamp_ms: now_ms,
      help: Some(help.to_string()),
    };

    if let Some(pid) = self.pid {
      if let Ok(mut system) = self.system.lock() {
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
        if let Some(process) = system.process(pid) {
          samples.push(gauge(
            "process_resident_memory_bytes",
            SampleValue::UInt(process.memory()),
            "Resident set size in bytes",
          ));
          samples.push(gauge(
            "process_virtual_memory_bytes",
            SampleValue::UInt(process.virtual_memory()),
            "Virtual memory size in bytes",
          ));
          samples.push(gauge(
            "process_cpu_usage_percent",
            SampleValue::Float(process.cpu_usage()),
            "Process CPU usage percentage",
          ));
        }
      }
    }

    samples.push(gauge(
      "process_uptime_seconds",
      SampleValue::UInt(self.started_at.elapsed().as_secs()),
      "Seconds since the exporter was created",
    ));
    samples.push(counter(
      "prometheus_exporter_exports_total",
      self.exports_ok.load(Ordering::Relaxed),
      "Successful metric exports",
    ));
    samples.push(counter(
      "prometheus_exporter_export_failures_total",
      self.exports_failed.load(Ordering::Relaxed),
      "Failed metric exports",
    ));
    samples.push(gauge(
      "prometheus_exporter_last_export_duration_seconds",
      SampleValue::Double(
        self.last_duration_us.load(Ordering::Relaxed) as f64 / 1e6,
      ),
      "Duration of the previous export",
    ));

    samples
  }

  /// Expand the ad-hoc table into samples, sorted for determinism.
  fn append_adhoc_samples(
    &self,
    samples: &mut Vec<MetricSample>,
  ) -> Result<(), MetricError> {
    let table = self
      .adhoc
      .lock()
      .map_err(|_| MetricError::Export("ad-hoc sample table poisoned".to_string()))?;

    let mut entries: Vec<&AdHocEntry> = table.values().collect();
    entries.sort_by(|a, b| {
      (a.name.as_str(), a.labels.storage_key())
        .cmp(&(b.name.as_str(), b.labels.storage_key()))
    });

    for entry in entries {
      match entry.value {
        AdHocValue::Counter(value) => samples.push(MetricSample {
          name: entry.name.clone(),
          kind: InstrumentKind::Counter,
          value: SampleValue::UInt(value),
          labels: entry.labels.clone(),
          timestamp_ms: entry.updated_ms,
          help: entry.help.clone(),
        }),
        AdHocValue::Gauge(value) => samples.push(MetricSample {
          name: entry.name.clone(),
          kind: InstrumentKind::Gauge,
          value: SampleValue::Double(value),
          labels: entry.labels.clone(),
          timestamp_ms: entry.updated_ms,
          help: entry.help.clone(),
        }),
        AdHocValue::HistogramPair { sum, count } => {
          samples.push(MetricSample {
            name: format!("{}_sum", entry.name),
            kind: InstrumentKind::Gauge,
            value: SampleValue::Double(sum),
            labels: entry.labels.clone(),
            timestamp_ms: entry.updated_ms,
            help: entry.help.clone(),
          });
          samples.push(MetricSample {
            name: format!("{}_count", entry.name),
            kind: InstrumentKind::Counter,
            value: SampleValue::UInt(count),
            labels: entry.labels.clone(),
            timestamp_ms: entry.updated_ms,
            help: None,
          });
        }
      }
    }
    Ok(())
  }

  /// One informational gauge per registry diagnostic key.
  fn append_registry_samples(&self, samples: &mut Vec<MetricSample>, now_ms: u64) {
    let defs = self.registry.definitions();
    let info = |name: &str, value: u64, labels: LabelSet, help: &str| MetricSample {
      name: name.to_string(),
      kind: InstrumentKind::Gauge,
      value: SampleValue::UInt(value),
      labels,
      timestamp_ms: now_ms,
      help: Some(help.to_string()),
    };

    samples.push(info(
      "opentelemetry_registry_meters",
      defs.meter_count as u64,
      LabelSet::new(),
      "Registered meters",
    ));
    samples.push(info(
      "opentelemetry_registry_instruments",
      defs.instrument_count as u64,
      LabelSet::new(),
      "Registered instruments",
    ));
    for (meter, count) in &defs.per_meter {
      samples.push(info(
        "opentelemetry_registry_meter_instruments",
        *count as u64,
        LabelSet::from_pairs([("meter", meter.as_str())]),
        "Instruments per meter",
      ));
    }
    for (kind, count) in &defs.per_kind {
      samples.push(info(
        "opentelemetry_registry_instruments_by_kind",
        *count as u64,
        LabelSet::from_pairs([("kind", kind.to_string())]),
        "Instruments per kind",
      ));
    }
  }
}
