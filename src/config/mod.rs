//! Configuration Module - TOML-based Gateway Configuration
//!
//! Loads and validates configuration from `config.toml`.
//! All service identity, security policy, and monitoring knobs are
//! externalized here - nothing is hardcoded in the domain layer.

pub mod loader;

use serde::Deserialize;

/// Top-level gateway configuration.
///
/// Loaded from `config.toml` at startup. All fields are validated
/// before any server socket is bound.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
  /// Service identity and exporter behavior.
  pub telemetry: TelemetryConfig,
  /// HTTP server binding.
  #[serde(default)]
  pub server: ServerConfig,
  /// Custom metric registration rules.
  #[serde(default)]
  pub custom_metrics: CustomMetricsConfig,
  /// Scrape endpoint security policy.
  #[serde(default)]
  pub security: SecurityConfig,
  /// Health-check orchestration parameters.
  #[serde(default)]
  pub monitoring: MonitoringConfig,
}

/// Service identity and Prometheus exporter configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct TelemetryConfig {
  /// Master switch for the whole telemetry surface.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// HTTP path the scrape endpoint is mounted on.
  #[serde(default = "default_metrics_path")]
  pub metrics_path: String,
  /// Service name stamped on every snapshot.
  pub service_name: String,
  /// Service version stamped on every snapshot.
  #[serde(default = "default_service_version")]
  pub service_version: String,
  /// Deployment environment label (development, staging, production).
  #[serde(default = "default_environment")]
  pub environment: String,
  /// Log level (trace, debug, info, warn, error).
  #[serde(default = "default_log_level")]
  pub log_level: String,
  /// Maximum concurrent export slots.
  #[serde(default = "default_max_concurrent_exports")]
  pub max_concurrent_exports: usize,
  /// Expected scrape interval in seconds (drives exporter staleness).
  #[serde(default = "default_export_interval")]
  pub export_interval_seconds: u64,
  /// Optional remote endpoint the exposition text is pushed to.
  pub remote_write_url: Option<String>,
  /// Push interval in seconds when a remote endpoint is configured.
  #[serde(default = "default_remote_write_interval")]
  pub remote_write_interval_seconds: u64,
}

/// HTTP server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  /// Bind address for the scrape + health endpoints.
  #[serde(default = "default_bind_address")]
  pub bind_address: String,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      bind_address: default_bind_address(),
    }
  }
}

/// Custom metric registration configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct CustomMetricsConfig {
  /// Whether application code may register new instruments.
  #[serde(default = "default_true")]
  pub enable_custom_metrics: bool,
  /// Hard cap on the number of registered instruments.
  #[serde(default = "default_max_custom_metrics")]
  pub max_custom_metrics: usize,
  /// Name of the default meter instruments are created under.
  #[serde(default = "default_meter_name")]
  pub meter_name: String,
  /// Version of the default meter.
  #[serde(default = "default_meter_version")]
  pub meter_version: String,
  /// Whether metric names are validated against the naming grammar.
  #[serde(default = "default_true")]
  pub validate_metric_names: bool,
  /// When non-empty, every metric name must start with one of these.
  #[serde(default)]
  pub metric_prefixes: Vec<String>,
  /// Instruments older than this are removed by the cleanup sweep.
  pub metric_retention_seconds: Option<u64>,
  /// Cleanup sweep interval in seconds.
  #[serde(default = "default_registry_sweep_interval")]
  pub cleanup_interval_seconds: u64,
}

impl Default for CustomMetricsConfig {
  fn default() -> Self {
    Self {
      enable_custom_metrics: true,
      max_custom_metrics: default_max_custom_metrics(),
      meter_name: default_meter_name(),
      meter_version: default_meter_version(),
      validate_metric_names: true,
      metric_prefixes: Vec::new(),
      metric_retention_seconds: None,
      cleanup_interval_seconds: default_registry_sweep_interval(),
    }
  }
}

/// Scrape endpoint security configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SecurityConfig {
  /// Master switch. When false every request is allowed through.
  #[serde(default = "default_true")]
  pub enable_security: bool,
  /// Allow-list patterns: exact IPs, `*` wildcards, or CIDR ranges.
  #[serde(default)]
  pub allowed_ips: Vec<String>,
  /// Whether a non-empty Authorization header is required.
  #[serde(default)]
  pub require_authentication: bool,
  /// Whether per-client rate limiting is enforced.
  #[serde(default = "default_true")]
  pub enable_rate_limiting: bool,
  /// Requests allowed per client per minute.
  #[serde(default = "default_max_requests_per_minute")]
  pub max_requests_per_minute: u32,
  /// How long an IP stays blocked after failing the allow-list.
  #[serde(default = "default_ip_block_duration")]
  pub ip_block_duration_seconds: u64,
  /// Whether User-Agent sanity checks are applied.
  #[serde(default = "default_true")]
  pub enable_security_headers: bool,
  /// Whether denials are emitted as structured security events.
  #[serde(default = "default_true")]
  pub log_security_events: bool,
  /// Security cache sweep interval in seconds.
  #[serde(default = "default_security_sweep_interval")]
  pub cleanup_interval_seconds: u64,
}

impl Default for SecurityConfig {
  fn default() -> Self {
    Self {
      enable_security: true,
      allowed_ips: Vec::new(),
      require_authentication: false,
      enable_rate_limiting: true,
      max_requests_per_minute: default_max_requests_per_minute(),
      ip_block_duration_seconds: default_ip_block_duration(),
      enable_security_headers: true,
      log_security_events: true,
      cleanup_interval_seconds: default_security_sweep_interval(),
    }
  }
}

/// Health-check orchestration configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct MonitoringConfig {
  /// Master switch. When false health checks return Healthy immediately.
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Whether the last report is cached.
  #[serde(default = "default_true")]
  pub cache_results: bool,
  /// Cache TTL in seconds.
  #[serde(default = "default_cache_duration")]
  pub cache_duration_seconds: u64,
  /// Deadline for one full health-check pass, in seconds.
  #[serde(default = "default_health_check_timeout")]
  pub health_check_timeout_seconds: u64,
  /// Whether the collector gathers process/system readings.
  #[serde(default = "default_true")]
  pub collect_system_metrics: bool,
  /// Whether the collector polls the database probe.
  #[serde(default)]
  pub collect_database_metrics: bool,
  /// Whether the collector polls the cache probe.
  #[serde(default)]
  pub collect_cache_metrics: bool,
}

impl Default for MonitoringConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      cache_results: true,
      cache_duration_seconds: default_cache_duration(),
      health_check_timeout_seconds: default_health_check_timeout(),
      collect_system_metrics: true,
      collect_database_metrics: false,
      collect_cache_metrics: false,
    }
  }
}

// Default value functions for serde

fn default_true() -> bool {
  true
}

fn default_metrics_path() -> String {
  "/metrics".to_string()
}

fn default_service_version() -> String {
  env!("CARGO_PKG_VERSION").to_string()
}

fn default_environment() -> String {
  "development".to_string()
}

fn default_log_level() -> String {
  "info".to_string()
}

fn default_max_concurrent_exports() -> usize {
  4
}

fn default_export_interval() -> u64 {
  15
}

fn default_remote_write_interval() -> u64 {
  60
}

fn default_bind_address() -> String {
  "0.0.0.0:9090".to_string()
}

fn default_max_custom_metrics() -> usize {
  256
}

fn default_meter_name() -> String {
  "telemetry_gateway".to_string()
}

fn default_meter_version() -> String {
  "1.0".to_string()
}

fn default_registry_sweep_interval() -> u64 {
  300
}

fn default_max_requests_per_minute() -> u32 {
  120
}

fn default_ip_block_duration() -> u64 {
  900
}

fn default_security_sweep_interval() -> u64 {
  60
}

fn default_cache_duration() -> u64 {
  10
}

fn default_health_check_timeout() -> u64 {
  5
}
