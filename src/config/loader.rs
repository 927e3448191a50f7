//! Configuration Loader - File Loading and Validation
//!
//! Handles loading `config.toml`, validating all parameters,
//! and providing clear error messages for misconfiguration.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::domain::ip_filter::IpPattern;

use super::AppConfig;

/// Load and validate configuration from a TOML file.
///
/// # Arguments
/// * `path` - Path to the config.toml file
///
/// # Errors
/// Returns detailed error if:
/// - File doesn't exist or can't be read
/// - TOML parsing fails
/// - Validation rules are violated
pub fn load_config(path: &str) -> Result<AppConfig> {
  let path = Path::new(path);

  let content = std::fs::read_to_string(path)
    .with_context(|| format!("Failed to read config file: {}", path.display()))?;

  let config: AppConfig = toml::from_str(&content)
    .with_context(|| "Failed to parse config.toml")?;

  validate_config(&config)?;

  info!(
    service = %config.telemetry.service_name,
    environment = %config.telemetry.environment,
    metrics_path = %config.telemetry.metrics_path,
    security = config.security.enable_security,
    "Configuration loaded successfully"
  );

  Ok(config)
}

/// Validate all configuration parameters.
///
/// Checks for:
/// - Non-empty service identity
/// - Positive pool sizes, intervals, and limits
/// - A well-formed metrics path
/// - Parseable allow-list patterns
fn validate_config(config: &AppConfig) -> Result<()> {
  // Telemetry validation
  anyhow::ensure!(
    !config.telemetry.service_name.is_empty(),
    "telemetry.service_name must not be empty"
  );
  anyhow::ensure!(
    config.telemetry.metrics_path.starts_with('/'),
    "telemetry.metrics_path must start with '/', got {:?}",
    config.telemetry.metrics_path
  );
  anyhow::ensure!(
    config.telemetry.max_concurrent_exports > 0,
    "telemetry.max_concurrent_exports must be positive"
  );
  anyhow::ensure!(
    config.telemetry.export_interval_seconds > 0,
    "telemetry.export_interval_seconds must be positive"
  );
  if let Some(url) = &config.telemetry.remote_write_url {
    anyhow::ensure!(
      url.starts_with("http://") || url.starts_with("https://"),
      "telemetry.remote_write_url must be an http(s) URL, got {:?}",
      url
    );
  }

  // Custom metrics validation
  anyhow::ensure!(
    config.custom_metrics.max_custom_metrics > 0,
    "custom_metrics.max_custom_metrics must be positive"
  );
  anyhow::ensure!(
    !config.custom_metrics.meter_name.is_empty(),
    "custom_metrics.meter_name must not be empty"
  );
  anyhow::ensure!(
    config.custom_metrics.cleanup_interval_seconds > 0,
    "custom_metrics.cleanup_interval_seconds must be positive"
  );

  // Security validation
  anyhow::ensure!(
    config.security.max_requests_per_minute > 0,
    "security.max_requests_per_minute must be positive"
  );
  anyhow::ensure!(
    config.security.ip_block_duration_seconds > 0,
    "security.ip_block_duration_seconds must be positive"
  );
  for (i, pattern) in config.security.allowed_ips.iter().enumerate() {
    IpPattern::parse(pattern).with_context(|| {
      format!("security.allowed_ips[{i}] is not a valid pattern: {pattern:?}")
    })?;
  }

  // Monitoring validation
  anyhow::ensure!(
    config.monitoring.cache_duration_seconds > 0,
    "monitoring.cache_duration_seconds must be positive"
  );
  anyhow::ensure!(
    config.monitoring.health_check_timeout_seconds > 0,
    "monitoring.health_check_timeout_seconds must be positive"
  );

  Ok(())
}
