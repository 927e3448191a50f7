//! Health Probe Port - Dependency Health Interface
//!
//! Defines the traits for probing external dependencies (database,
//! cache) and the process itself. The orchestrator never inspects
//! probe internals - only this contract.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::health::HealthCheckResult;

/// Trait for health probe providers.
///
/// Implementors wrap one dependency (or the process itself) and report
/// its condition. Probes must be cheap to call concurrently; the
/// orchestrator bounds every call with a deadline and drops probes
/// that overrun it.
#[async_trait]
pub trait HealthProbe: Send + Sync + 'static {
  /// Stable probe name used as the report key.
  fn name(&self) -> &str;

  /// Run the probe and produce a result.
  ///
  /// Transport failures should be returned as `Err`; the orchestrator
  /// converts them into an Unhealthy result rather than failing the
  /// whole pass.
  async fn check_health(&self) -> anyhow::Result<HealthCheckResult>;

  /// Cheap connectivity check without a full health evaluation.
  async fn can_connect(&self) -> bool;

  /// Round-trip latency to the dependency.
  async fn measure_latency(&self) -> anyhow::Result<Duration>;
}

/// Database-specific probe surface.
#[async_trait]
pub trait DatabaseProbe: HealthProbe {
  /// Whether all schema migrations have been applied.
  async fn are_migrations_current(&self) -> anyhow::Result<bool>;
}

/// Cache-specific probe surface.
#[async_trait]
pub trait CacheProbe: HealthProbe {
  /// Whether a write/read round trip succeeds.
  async fn can_read_write(&self) -> anyhow::Result<bool>;

  /// Memory currently used by the cache server, in bytes.
  async fn memory_usage_bytes(&self) -> anyhow::Result<u64>;
}
