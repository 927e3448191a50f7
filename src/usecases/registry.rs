//! Metric Registry - Meters, Instruments, and Lifecycle
//!
//! Thread-safe catalog of named meters and typed instruments with:
//! - Prometheus naming-grammar validation
//! - a hard instrument cap
//! - same-key-same-kind idempotent creation
//! - meter unregistration with cascading instrument cleanup
//! - a periodic retention sweep for stale instruments

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::CustomMetricsConfig;
use crate::domain::metrics::{validate_metric_name, InstrumentKind, MetricError};

/// Default histogram bucket upper bounds (seconds-oriented).
pub const DEFAULT_HISTOGRAM_BOUNDS: [f64; 11] = [
  0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

// ────────────────────────────────────────────
// Instrument value holders
// ────────────────────────────────────────────

/// Monotonic counter backed by an atomic.
#[derive(Debug, Default)]
pub struct Counter {
  value: AtomicU64,
}

impl Counter {
  pub fn add(&self, delta: u64) {
    self.value.fetch_add(delta, Ordering::Relaxed);
  }

  pub fn increment(&self) {
    self.add(1);
  }

  pub fn value(&self) -> u64 {
    self.value.load(Ordering::Relaxed)
  }
}

/// Signed running sum backed by an atomic.
#[derive(Debug, Default)]
pub struct UpDownCounter {
  value: AtomicI64,
}

impl UpDownCounter {
  pub fn add(&self, delta: i64) {
    self.value.fetch_add(delta, Ordering::Relaxed);
  }

  pub fn value(&self) -> i64 {
    self.value.load(Ordering::Relaxed)
  }
}

/// Point-in-time value stored as f64 bits.
#[derive(Debug, Default)]
pub struct Gauge {
  bits: AtomicU64,
}

impl Gauge {
  pub fn set(&self, value: f64) {
    self.bits.store(value.to_bits(), Ordering::Relaxed);
  }

  pub fn value(&self) -> f64 {
    f64::from_bits(self.bits.load(Ordering::Relaxed))
  }
}

/// Bucketed distribution with sum and count.
#[derive(Debug)]
pub struct Histogram {
  sum_bits: AtomicU64,
  count: AtomicU64,
  bounds: Vec<f64>,
  // One slot per bound plus the +Inf overflow slot.
  bucket_counts: Vec<AtomicU64>,
}

/// Point-in-time view of a histogram's state.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramSnapshot {
  pub sum: f64,
  pub count: u64,
  /// Per-bucket (upper bound, cumulative count) pairs; +Inf last.
  pub buckets: Vec<(f64, u64)>,
}

impl Histogram {
  fn with_bounds(bounds: Vec<f64>) -> Self {
    let slots = bounds.len() + 1;
    Self {
      sum_bits: AtomicU64::new(0f64.to_bits()),
      count: AtomicU64::new(0),
      bounds,
      bucket_counts: (0..slots).map(|_| AtomicU64::new(0)).collect(),
    }
  }

  /// Record one observation.
  pub fn record(&self, value: f64) {
    self.count.fetch_add(1, Ordering::Relaxed);
    let idx = self
      .bounds
      .iter()
      .position(|bound| value <= *bound)
      .unwrap_or(self.bounds.len());
    self.bucket_counts[idx].fetch_add(1, Ordering::Relaxed);

    let mut current = self.sum_bits.load(Ordering::Relaxed);
    loop {
      let next = (f64::from_bits(current) + value).to_bits();
      match self.sum_bits.compare_exchange_weak(
        current,
        next,
        Ordering::Relaxed,
        Ordering::Relaxed,
      ) {
        Ok(_) => break,
        Err(actual) => current = actual,
      }
    }
  }

  pub fn sum(&self) -> f64 {
    f64::from_bits(self.sum_bits.load(Ordering::Relaxed))
  }

  pub fn count(&self) -> u64 {
    self.count.load(Ordering::Relaxed)
  }

  /// Cumulative bucket view in bound order.
  pub fn snapshot(&self) -> HistogramSnapshot {
    let mut cumulative = 0u64;
    let mut buckets = Vec::with_capacity(self.bucket_counts.len());
    for (i, slot) in self.bucket_counts.iter().enumerate() {
      cumulative += slot.load(Ordering::Relaxed);
      let bound = self.bounds.get(i).copied().unwrap_or(f64::INFINITY);
      buckets.push((bound, cumulative));
    }
    HistogramSnapshot {
      sum: self.sum(),
      count: self.count(),
      buckets,
    }
  }
}

// ────────────────────────────────────────────
// Meters and registered instruments
// ────────────────────────────────────────────

/// A named, versioned namespace owning a set of instruments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meter {
  pub name: String,
  pub version: String,
}

impl Meter {
  pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      version: version.into(),
    }
  }
}

/// The typed value holder behind a registered instrument.
#[derive(Debug, Clone)]
enum InstrumentHandle {
  Counter(Arc<Counter>),
  Histogram(Arc<Histogram>),
  Gauge(Arc<Gauge>),
  UpDownCounter(Arc<UpDownCounter>),
}

impl InstrumentHandle {
  fn kind(&self) -> InstrumentKind {
    match self {
      Self::Counter(_) => InstrumentKind::Counter,
      Self::Histogram(_) => InstrumentKind::Histogram,
      Self::Gauge(_) => InstrumentKind::Gauge,
      Self::UpDownCounter(_) => InstrumentKind::UpDownCounter,
    }
  }
}

/// Registry-internal record of one instrument.
#[derive(Debug)]
struct RegisteredInstrument {
  meter: String,
  unit: Option<String>,
  description: Option<String>,
  handle: InstrumentHandle,
  created_at: Instant,
}

/// Identity key: (meter name, instrument name). The kind is checked on
/// lookup so a same-key different-kind request becomes a TypeConflict.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct InstrumentKey {
  meter: String,
  name: String,
}

/// Consistent diagnostic view of the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryDefinitions {
  pub meter_count: usize,
  pub instrument_count: usize,
  /// Instrument count per meter name.
  pub per_meter: Vec<(String, usize)>,
  /// Instrument count per kind.
  pub per_kind: Vec<(InstrumentKind, usize)>,
}

#[derive(Debug, Default)]
struct RegistryInner {
  meters: Vec<Meter>,
  instruments: HashMap<InstrumentKey, RegisteredInstrument>,
}

// ────────────────────────────────────────────
// Registry
// ────────────────────────────────────────────

/// Thread-safe instrument catalog.
///
/// All mutation happens under one short mutex section; recorded values
/// live in lock-free atomics inside the handed-out `Arc`s, so the hot
/// path never touches the catalog lock.
pub struct MetricRegistry {
  enabled: bool,
  validate_names: bool,
  allowed_prefixes: Vec<String>,
  max_instruments: usize,
  retention: Option<Duration>,
  sweep_interval: Duration,
  default_meter: Meter,
  inner: Mutex<RegistryInner>,
}

impl MetricRegistry {
  /// Build a registry from configuration and register the default meter.
  pub fn new(config: &CustomMetricsConfig) -> Self {
    let default_meter = Meter::new(&config.meter_name, &config.meter_version);
    let registry = Self {
      enabled: config.enable_custom_metrics,
      validate_names: config.validate_metric_names,
      allowed_prefixes: config.metric_prefixes.clone(),
      max_instruments: config.max_custom_metrics,
      retention: config.metric_retention_seconds.map(Duration::from_secs),
      sweep_interval: Duration::from_secs(config.cleanup_interval_seconds),
      default_meter: default_meter.clone(),
      inner: Mutex::new(RegistryInner::default()),
    };
    registry.register_meter(default_meter);
    registry
  }

  /// Create (or re-fetch) a counter under the default meter.
  pub fn create_counter(
    &self,
    name: &str,
    unit: Option<&str>,
    description: Option<&str>,
  ) -> Result<Arc<Counter>, MetricError> {
    let handle = self.register(name, unit, description, || {
      InstrumentHandle::Counter(Arc::new(Counter::default()))
    })?;
    match handle {
      InstrumentHandle::Counter(c) => Ok(c),
      other => Err(conflict(name, other.kind(), InstrumentKind::Counter)),
    }
  }

  /// Create (or re-fetch) a histogram under the default meter.
  pub fn create_histogram(
    &self,
    name: &str,
    unit: Option<&str>,
    description: Option<&str>,
  ) -> Result<Arc<Histogram>, MetricError> {
    let handle = self.register(name, unit, description, || {
      InstrumentHandle::Histogram(Arc::new(Histogram::with_bounds(
        DEFAULT_HISTOGRAM_BOUNDS.to_vec(),
      )))
    })?;
    match handle {
      InstrumentHandle::Histogram(h) => Ok(h),
      other => Err(conflict(name, other.kind(), InstrumentKind::Histogram)),
    }
  }

  /// Create (or re-fetch) a gauge under the default meter.
  pub fn create_gauge(
    &self,
    name: &str,
    unit: Option<&str>,
    description: Option<&str>,
  ) -> Result<Arc<Gauge>, MetricError> {
    let handle = self.register(name, unit, description, || {
      InstrumentHandle::Gauge(Arc::new(Gauge::default()))
    })?;
    match handle {
      InstrumentHandle::Gauge(g) => Ok(g),
      other => Err(conflict(name, other.kind(), InstrumentKind::Gauge)),
    }
  }

  /// Create (or re-fetch) an up-down counter under the default meter.
  pub fn create_up_down_counter(
    &self,
    name: &str,
    unit: Option<&str>,
    description: Option<&str>,
  ) -> Result<Arc<UpDownCounter>, MetricError> {
    let handle = self.register(name, unit, description, || {
      InstrumentHandle::UpDownCounter(Arc::new(UpDownCounter::default()))
    })?;
    match handle {
      InstrumentHandle::UpDownCounter(u) => Ok(u),
      other => Err(conflict(
        name,
        other.kind(),
        InstrumentKind::UpDownCounter,
      )),
    }
  }

  /// Shared registration path: validate, dedupe, cap-check, insert.
  fn register(
    &self,
    name: &str,
    unit: Option<&str>,
    description: Option<&str>,
    make_handle: impl FnOnce() -> InstrumentHandle,
  ) -> Result<InstrumentHandle, MetricError> {
    if !self.enabled {
      return Err(MetricError::Validation {
        name: name.to_string(),
        reason: "custom metrics are disabled".to_string(),
      });
    }
    if self.validate_names {
      validate_metric_name(name, &self.allowed_prefixes)?;
    }

    let key = InstrumentKey {
      meter: self.default_meter.name.clone(),
      name: name.to_string(),
    };

    let mut inner = self.inner.lock().expect("registry lock poisoned");

    if let Some(existing) = inner.instruments.get(&key) {
      return Ok(existing.handle.clone());
    }

    if inner.instruments.len() >= self.max_instruments {
      return Err(MetricError::Capacity {
        current: inner.instruments.len(),
        max: self.max_instruments,
      });
    }

    let handle = make_handle();
    debug!(
      metric = name,
      kind = %handle.kind(),
      meter = %key.meter,
      "Instrument registered"
    );
    inner.instruments.insert(
      key,
      RegisteredInstrument {
        meter: self.default_meter.name.clone(),
        unit: unit.map(str::to_string),
        description: description.map(str::to_string),
        handle: handle.clone(),
        created_at: Instant::now(),
      },
    );
    Ok(handle)
  }

  /// Add a meter to the catalog. Idempotent on meter name.
  pub fn register_meter(&self, meter: Meter) {
    let mut inner = self.inner.lock().expect("registry lock poisoned");
    if !inner.meters.iter().any(|m| m.name == meter.name) {
      info!(meter = %meter.name, version = %meter.version, "Meter registered");
      inner.meters.push(meter);
    }
  }

  /// Remove a meter and every instrument registered under it.
  pub fn unregister_meter(&self, meter_name: &str) {
    let mut inner = self.inner.lock().expect("registry lock poisoned");
    let before = inner.instruments.len();
    inner.instruments.retain(|key, _| key.meter != meter_name);
    let removed = before - inner.instruments.len();
    inner.meters.retain(|m| m.name != meter_name);
    info!(
      meter = meter_name,
      instruments_removed = removed,
      "Meter unregistered"
    );
  }

  /// Snapshot of registered meters, safe under concurrent mutation.
  pub fn registered_meters(&self) -> Vec<Meter> {
    self
      .inner
      .lock()
      .expect("registry lock poisoned")
      .meters
      .clone()
  }

  /// Current number of registered instruments.
  pub fn instrument_count(&self) -> usize {
    self
      .inner
      .lock()
      .expect("registry lock poisoned")
      .instruments
      .len()
  }

  /// Diagnostic summary computed under one lock section so the counts
  /// are mutually consistent.
  pub fn definitions(&self) -> RegistryDefinitions {
    let inner = self.inner.lock().expect("registry lock poisoned");

    let mut per_meter: HashMap<&str, usize> = HashMap::new();
    let mut per_kind: HashMap<InstrumentKind, usize> = HashMap::new();
    for (key, instrument) in &inner.instruments {
      *per_meter.entry(key.meter.as_str()).or_default() += 1;
      *per_kind.entry(instrument.handle.kind()).or_default() += 1;
    }

    let mut per_meter: Vec<(String, usize)> = per_meter
      .into_iter()
      .map(|(k, v)| (k.to_string(), v))
      .collect();
    per_meter.sort();
    let mut per_kind: Vec<(InstrumentKind, usize)> = per_kind.into_iter().collect();
    per_kind.sort_by_key(|(k, _)| k.to_string());

    RegistryDefinitions {
      meter_count: inner.meters.len(),
      instrument_count: inner.instruments.len(),
      per_meter,
      per_kind,
    }
  }

  /// Unit and description of a registered instrument, for diagnostics.
  pub fn instrument_metadata(&self, name: &str) -> Option<(Option<String>, Option<String>)> {
    let inner = self.inner.lock().expect("registry lock poisoned");
    let key = InstrumentKey {
      meter: self.default_meter.name.clone(),
      name: name.to_string(),
    };
    inner
      .instruments
      .get(&key)
      .map(|i| (i.unit.clone(), i.description.clone()))
  }

  /// Drop instruments older than the configured retention.
  ///
  /// Without retention configured this is a diagnostic no-op pass.
  pub fn cleanup_expired(&self) -> usize {
    let Some(retention) = self.retention else {
      debug!("Registry sweep: no retention configured, nothing to do");
      return 0;
    };

    let mut inner = self.inner.lock().expect("registry lock poisoned");
    let before = inner.instruments.len();
    inner.instruments.retain(|key, instrument| {
      let keep = instrument.created_at.elapsed() < retention;
      if !keep {
        info!(
          metric = %key.name,
          meter = %instrument.meter,
          "Instrument removed by retention sweep"
        );
      }
      keep
    });
    before - inner.instruments.len()
  }

  /// Spawn the periodic cleanup sweep; stops on the shutdown signal.
  pub fn spawn_cleanup_sweep(
    self: Arc<Self>,
    mut shutdown_rx: broadcast::Receiver<()>,
  ) -> JoinHandle<()> {
    let registry = self;
    tokio::spawn(async move {
      let mut ticker = tokio::time::interval(registry.sweep_interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
      // The first tick fires immediately; skip it.
      ticker.tick().await;
      loop {
        tokio::select! {
          _ = shutdown_rx.recv() => {
            debug!("Registry sweep stopping");
            break;
          }
          _ = ticker.tick() => {
            let removed = registry.cleanup_expired();
            if removed > 0 {
              warn!(removed, "Registry sweep removed stale instruments");
            }
          }
        }
      }
    })
  }
}

fn conflict(
  name: &str,
  existing: InstrumentKind,
  requested: InstrumentKind,
) -> MetricError {
  MetricError::TypeConflict {
    name: name.to_string(),
    existing,
    requested,
  }
}
