//! Core metrics domain types.
//!
//! Defines the instrument taxonomy, the transient sample/snapshot model
//! produced during export, the metric naming grammar, and the typed error
//! set for registration and export. These types are the foundation of the
//! hexagonal architecture's inner ring.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ────────────────────────────────────────────
// Error taxonomy
// ────────────────────────────────────────────

/// Typed errors for the metrics core.
///
/// Registration failures (`Validation`, `Capacity`, `TypeConflict`) are
/// returned synchronously and never retried. `Export` propagates to the
/// scrape caller while the exporter retains the message for status
/// reporting.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MetricError {
    /// Metric name violates the naming grammar or the registry is disabled.
    #[error("invalid metric '{name}': {reason}")]
    Validation { name: String, reason: String },

    /// Registering one more instrument would exceed the configured cap.
    #[error("metric registry full: {current}/{max} instruments registered")]
    Capacity { current: usize, max: usize },

    /// The same instrument key already exists under a different kind.
    #[error("instrument '{name}' already registered as {existing}, requested {requested}")]
    TypeConflict {
        name: String,
        existing: InstrumentKind,
        requested: InstrumentKind,
    },

    /// Snapshot collection or rendering failed during a scrape.
    #[error("metrics export failed: {0}")]
    Export(String),
}

// ────────────────────────────────────────────
// Instrument taxonomy
// ────────────────────────────────────────────

/// The four instrument kinds the registry supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentKind {
    /// Monotonically increasing count.
    Counter,
    /// Distribution of observed values.
    Histogram,
    /// Point-in-time value that can move freely.
    Gauge,
    /// Running sum that can go up or down.
    UpDownCounter,
}

impl InstrumentKind {
    /// The Prometheus `# TYPE` keyword for this kind.
    ///
    /// Up-down counters have no Prometheus equivalent and are exposed
    /// as gauges, matching how OpenTelemetry bridges map them.
    pub fn exposition_type(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Histogram => "histogram",
            Self::Gauge | Self::UpDownCounter => "gauge",
        }
    }
}

impl std::fmt::Display for InstrumentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Counter => write!(f, "counter"),
            Self::Histogram => write!(f, "histogram"),
            Self::Gauge => write!(f, "gauge"),
            Self::UpDownCounter => write!(f, "up-down-counter"),
        }
    }
}

// ────────────────────────────────────────────
// Naming grammar
// ────────────────────────────────────────────

/// Maximum accepted metric name length.
pub const MAX_METRIC_NAME_LEN: usize = 255;

/// Prefixes reserved for the gateway's own built-in samples.
pub const RESERVED_PREFIXES: [&str; 4] =
    ["system_", "process_", "prometheus_", "opentelemetry_"];

/// Validate a metric name against the Prometheus naming grammar.
///
/// Rules: non-empty, at most [`MAX_METRIC_NAME_LEN`] chars, leading
/// character in `[a-zA-Z_:]`, interior characters in `[a-zA-Z0-9_:]`,
/// no reserved prefix, and - when `allowed_prefixes` is non-empty - the
/// name must start with one of the configured prefixes.
pub fn validate_metric_name(
    name: &str,
    allowed_prefixes: &[String],
) -> Result<(), MetricError> {
    let invalid = |reason: &str| MetricError::Validation {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() {
        return Err(invalid("name is empty"));
    }
    if name.len() > MAX_METRIC_NAME_LEN {
        return Err(invalid("name exceeds 255 characters"));
    }

    let mut chars = name.chars();
    let first = chars.next().unwrap_or('\0');
    if !(first.is_ascii_alphabetic() || first == '_' || first == ':') {
        return Err(invalid("name must start with a letter, '_' or ':'"));
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == ':')) {
        return Err(MetricError::Validation {
            name: name.to_string(),
            reason: format!("name contains invalid character {bad:?}"),
        });
    }

    if let Some(reserved) = RESERVED_PREFIXES.iter().find(|p| name.starts_with(**p)) {
        return Err(MetricError::Validation {
            name: name.to_string(),
            reason: format!("prefix '{reserved}' is reserved"),
        });
    }

    if !allowed_prefixes.is_empty()
        && !allowed_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    {
        return Err(invalid("name does not match any configured prefix"));
    }

    Ok(())
}

// ────────────────────────────────────────────
// Labels
// ────────────────────────────────────────────

/// An ordered label set.
///
/// Pairs are sorted by key at construction and duplicates collapse
/// last-wins, so serialization and exposition output are deterministic
/// regardless of insertion order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct LabelSet(Vec<(String, String)>);

impl LabelSet {
    /// Empty label set.
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Build a label set from arbitrary pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut out: Vec<(String, String)> = Vec::new();
        for (k, v) in pairs {
            let key = k.into();
            let value = v.into();
            match out.binary_search_by(|(existing, _)| existing.cmp(&key)) {
                Ok(i) => out[i].1 = value,
                Err(i) => out.insert(i, (key, value)),
            }
        }
        Self(out)
    }

    /// Iterate pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Merge `other` over `self`; colliding keys take `other`'s value.
    pub fn merged_with(&self, other: &LabelSet) -> LabelSet {
        LabelSet::from_pairs(
            self.iter()
                .chain(other.iter())
                .map(|(k, v)| (k.to_string(), v.to_string())),
        )
    }

    /// Canonical storage key: `k1=v1,k2=v2` in key order.
    ///
    /// Used to key ad-hoc samples by `name + serialized tag set`.
    pub fn storage_key(&self) -> String {
        let mut out = String::new();
        for (i, (k, v)) in self.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            out.push_str(k);
            out.push('=');
            out.push_str(v);
        }
        out
    }
}

// ────────────────────────────────────────────
// Samples and snapshots
// ────────────────────────────────────────────

/// A sample value with its original numeric width.
///
/// The width drives exposition formatting: doubles render with
/// round-trip precision, single floats with 9 significant digits,
/// integers as plain digits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Double(f64),
    Float(f32),
    Int(i64),
    UInt(u64),
}

impl SampleValue {
    /// Render the value for the exposition line.
    pub fn render(self) -> String {
        match self {
            Self::Double(v) => {
                if v.is_nan() {
                    "NaN".to_string()
                } else if v.is_infinite() {
                    if v > 0.0 { "+Inf" } else { "-Inf" }.to_string()
                } else {
                    format!("{v}")
                }
            }
            Self::Float(v) => format_float_g9(v),
            Self::Int(v) => v.to_string(),
            Self::UInt(v) => v.to_string(),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Self::Double(v) => v,
            Self::Float(v) => f64::from(v),
            Self::Int(v) => v as f64,
            Self::UInt(v) => v as f64,
        }
    }
}

/// Render an `f32` with 9 significant digits, trailing zeros trimmed.
fn format_float_g9(v: f32) -> String {
    if v == 0.0 {
        return "0".to_string();
    }
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }
    // {:.8e} keeps 1 + 8 = 9 significant digits.
    let sci = format!("{v:.8e}");
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let mantissa = mantissa.trim_end_matches('0').trim_end_matches('.');
    let exp: i32 = exponent.parse().unwrap_or(0);
    // Prefer plain notation for everyday magnitudes.
    if (-4..=8).contains(&exp) {
        let plain: f64 = format!("{mantissa}e{exp}").parse().unwrap_or(f64::from(v));
        format!("{plain}")
    } else {
        format!("{mantissa}e{exp}")
    }
}

/// A point-in-time sample produced during export. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    /// Metric name (already validated).
    pub name: String,
    /// Kind, driving the `# TYPE` line.
    pub kind: InstrumentKind,
    /// Sampled value.
    pub value: SampleValue,
    /// Ordered label set.
    pub labels: LabelSet,
    /// Collection timestamp in Unix milliseconds.
    pub timestamp_ms: u64,
    /// Optional help text for the `# HELP` line.
    pub help: Option<String>,
}

/// A full export snapshot: service identity plus an ordered sample run.
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    /// Service name stamped on every exposition line.
    pub service_name: String,
    /// Service version.
    pub service_version: String,
    /// Deployment environment.
    pub environment: String,
    /// Labels attached to every sample at render time.
    pub service_labels: LabelSet,
    /// Ordered samples (built-ins, then ad-hoc, then registry info).
    pub samples: Vec<MetricSample>,
    /// Wall time spent building the snapshot.
    pub collection_duration: Duration,
}

impl MetricsSnapshot {
    /// Total number of samples in the snapshot.
    pub fn total_count(&self) -> usize {
        self.samples.len()
    }
}

/// Current Unix time in milliseconds.
pub fn unix_millis_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
