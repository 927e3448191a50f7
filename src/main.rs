//! Telemetry Gateway — Entry Point
//!
//! Initializes configuration, logging, the metrics core, and the
//! secured HTTP surface. Runs until SIGINT/SIGTERM.
//!
//! Wiring sequence:
//! 1. Load config.toml + validate
//! 2. Init tracing (JSON structured logging)
//! 3. Create MetricRegistry (instrument catalog + retention sweep)
//! 4. Create PrometheusExporter (snapshot + exposition + export pool)
//! 5. Create EndpointSecurityGate (allow-list + rate limits + blocks)
//! 6. Create MetricsCollector + HealthCheckOrchestrator (self probe)
//! 7. Spawn background sweeps (registry retention, security cache)
//! 8. Spawn telemetry server (scrape + /live + /ready)
//! 9. Spawn remote-write loop when a push target is configured
//! 10. Wait for SIGINT → graceful shutdown (signal→drain→exit)

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info};

mod adapters;
mod config;
mod domain;
mod ports;
mod usecases;

use adapters::http::{GatewayState, TelemetryServer};
use adapters::probes::SelfCheckProbe;
use adapters::push::RemoteWriter;
use usecases::collector::MetricsCollector;
use usecases::exporter::PrometheusExporter;
use usecases::health_orchestrator::HealthCheckOrchestrator;
use usecases::registry::MetricRegistry;
use usecases::security_gate::EndpointSecurityGate;

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1. Load configuration from config.toml ──────────────
    let config = config::loader::load_config("config.toml")
        .context("Failed to load configuration")?;

    // ── 2. Initialize structured JSON logging ───────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| {
                    tracing_subscriber::EnvFilter::new(&config.telemetry.log_level)
                }),
        )
        .json()
        .init();

    info!(
        service = %config.telemetry.service_name,
        version = env!("CARGO_PKG_VERSION"),
        environment = %config.telemetry.environment,
        metrics_path = %config.telemetry.metrics_path,
        "Starting Telemetry Gateway"
    );

    if !config.telemetry.enabled {
        info!("Telemetry disabled by configuration — exiting");
        return Ok(());
    }

    // ── 3. Shutdown signal channel ──────────────────────────
    let (shutdown_tx, _shutdown_rx) = broadcast::channel::<()>(1);

    // ── 4. Metrics core: registry + exporter ────────────────
    let registry = Arc::new(MetricRegistry::new(&config.custom_metrics));
    let exporter = Arc::new(PrometheusExporter::new(
        &config.telemetry,
        &config.custom_metrics,
        Arc::clone(&registry),
    ));

    // ── 5. Security gate for the scrape endpoint ────────────
    let gate = Arc::new(
        EndpointSecurityGate::new(&config.security)
            .context("Failed to build security gate")?,
    );

    // ── 6. Collector + health orchestrator (self probe) ─────
    let collector = Arc::new(MetricsCollector::new(
        &config.monitoring,
        &registry,
        Arc::clone(&exporter),
        None,
        None,
    ));
    let self_probe = Arc::new(SelfCheckProbe::new(Arc::clone(&exporter)));
    let orchestrator = Arc::new(HealthCheckOrchestrator::new(
        &config.monitoring,
        self_probe,
        Arc::clone(&collector),
    ));

    // ── 7. Background sweeps ────────────────────────────────
    let registry_sweep =
        Arc::clone(&registry).spawn_cleanup_sweep(shutdown_tx.subscribe());
    let security_sweep = Arc::clone(&gate).spawn_cleanup_sweep(shutdown_tx.subscribe());

    // ── 8. Telemetry server (scrape + /live + /ready) ───────
    let state = Arc::new(GatewayState {
        exporter: Arc::clone(&exporter),
        gate: Arc::clone(&gate),
        orchestrator: Arc::clone(&orchestrator),
        metrics_path: config.telemetry.metrics_path.clone(),
    });
    let server = TelemetryServer::new(state, config.server.bind_address.clone());
    let server_shutdown = shutdown_tx.subscribe();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run(server_shutdown).await {
            error!(error = %e, "Telemetry server failed");
        }
    });

    // ── 9. Optional remote-write push loop ──────────────────
    let push_handle = match &config.telemetry.remote_write_url {
        Some(url) => {
            let writer = RemoteWriter::new(
                url.clone(),
                Duration::from_secs(config.telemetry.remote_write_interval_seconds),
                Arc::clone(&exporter),
            )
            .context("Failed to create remote writer")?;
            let push_shutdown = shutdown_tx.subscribe();
            Some(tokio::spawn(async move {
                if let Err(e) = writer.run(push_shutdown).await {
                    error!(error = %e, "Remote write loop failed");
                }
            }))
        }
        None => None,
    };

    info!("All tasks spawned — gateway is running");

    // ── 10. Wait for SIGINT ─────────────────────────────────
    tokio::select! {
        _ = signal::ctrl_c() => {
            info!("SIGINT received, initiating graceful shutdown");
        }
    }

    // ── Graceful shutdown (signal→drain→exit) ───────────────

    // 1. Signal all tasks to stop
    let _ = shutdown_tx.send(());
    info!("Shutdown signal broadcast to all tasks");

    // 2. Wait for the server to drain (up to 10s)
    let _ = tokio::time::timeout(Duration::from_secs(10), server_handle).await;

    // 3. Wait for the push loop to finish its cycle (up to 5s)
    if let Some(handle) = push_handle {
        let _ = tokio::time::timeout(Duration::from_secs(5), handle).await;
    }

    // 4. Stop background sweeps
    let _ = tokio::time::timeout(Duration::from_secs(2), registry_sweep).await;
    let _ = tokio::time::timeout(Duration::from_secs(2), security_sweep).await;

    info!("Shutdown complete");
    Ok(())
}
