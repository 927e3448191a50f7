//! Health-check domain types.
//!
//! Status taxonomy, per-probe results, and the aggregated report
//! returned by the liveness/readiness endpoints. Aggregation follows
//! worst-of ordering: Unhealthy > Degraded > Healthy.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall condition of a probe or of the whole service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthStatus {
    /// Fully operational.
    Healthy,
    /// Operational with degraded capacity or elevated latency.
    Degraded,
    /// Not operational.
    Unhealthy,
}

impl HealthStatus {
    /// Severity rank used for worst-of aggregation.
    fn severity(self) -> u8 {
        match self {
            Self::Healthy => 0,
            Self::Degraded => 1,
            Self::Unhealthy => 2,
        }
    }

    /// The worse of two statuses.
    pub fn worst(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Healthy => write!(f, "healthy"),
            Self::Degraded => write!(f, "degraded"),
            Self::Unhealthy => write!(f, "unhealthy"),
        }
    }
}

/// Outcome of one health probe run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Probe name (unique within a report).
    pub name: String,
    /// Probe status.
    pub status: HealthStatus,
    /// Human-readable summary.
    pub description: String,
    /// How long the probe took.
    #[serde(with = "duration_ms")]
    pub duration: Duration,
    /// Error message when the probe failed.
    pub error: Option<String>,
    /// Probe-specific diagnostic payload.
    #[serde(default)]
    pub data: BTreeMap<String, serde_json::Value>,
}

impl HealthCheckResult {
    /// A passing result.
    pub fn healthy(name: &str, description: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            status: HealthStatus::Healthy,
            description: description.into(),
            duration,
            error: None,
            data: BTreeMap::new(),
        }
    }

    /// A degraded result.
    pub fn degraded(name: &str, description: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            status: HealthStatus::Degraded,
            description: description.into(),
            duration,
            error: None,
            data: BTreeMap::new(),
        }
    }

    /// A failing result.
    pub fn unhealthy(name: &str, description: impl Into<String>, duration: Duration) -> Self {
        Self {
            name: name.to_string(),
            status: HealthStatus::Unhealthy,
            description: description.into(),
            duration,
            error: None,
            data: BTreeMap::new(),
        }
    }

    /// Attach an error message.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Attach a diagnostic key-value pair.
    pub fn with_data(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }
}

/// Aggregated report across all probes of one health-check pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckReport {
    /// Worst status across all child results; Healthy when empty.
    pub status: HealthStatus,
    /// Wall time of the whole pass.
    #[serde(with = "duration_ms")]
    pub total_duration: Duration,
    /// Per-probe results keyed by probe name.
    pub results: BTreeMap<String, HealthCheckResult>,
    /// When the report was generated.
    pub generated_at: DateTime<Utc>,
}

impl HealthCheckReport {
    /// Aggregate individual results into a report.
    pub fn aggregate(results: Vec<HealthCheckResult>, total_duration: Duration) -> Self {
        let status = results
            .iter()
            .fold(HealthStatus::Healthy, |acc, r| acc.worst(r.status));
        Self {
            status,
            total_duration,
            results: results.into_iter().map(|r| (r.name.clone(), r)).collect(),
            generated_at: Utc::now(),
        }
    }

    /// An empty Healthy report (used when monitoring is disabled).
    pub fn empty() -> Self {
        Self::aggregate(Vec::new(), Duration::ZERO)
    }
}

/// Serialize a `Duration` as integer milliseconds.
mod duration_ms {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis().min(u128::from(u64::MAX)) as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
