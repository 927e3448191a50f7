//! Remote Write Forwarder - Optional Push Target
//!
//! When a remote endpoint is configured, periodically exports the
//! exposition text and POSTs it there. Push failures are logged and
//! never affect the scrape path.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::domain::exposition;
use crate::usecases::exporter::PrometheusExporter;

/// Forwards exposition text to a configured remote endpoint.
pub struct RemoteWriter {
    client: Client,
    url: String,
    interval: Duration,
    exporter: Arc<PrometheusExporter>,
}

impl RemoteWriter {
    /// Create a forwarder for the given push URL.
    pub fn new(
        url: String,
        interval: Duration,
        exporter: Arc<PrometheusExporter>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build remote-write HTTP client")?;
        Ok(Self {
            client,
            url,
            interval,
            exporter,
        })
    }

    /// Run the push loop until the shutdown signal.
    pub async fn run(self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;

        info!(url = %self.url, interval_s = self.interval.as_secs(), "Remote write started");

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Remote write stopping");
                    break;
                }
                _ = ticker.tick() => {
                    self.push_once().await;
                }
            }
        }

        Ok(())
    }

    /// One best-effort push; failures are logged, not propagated.
    async fn push_once(&self) {
        let body = match self.exporter.export().await {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Remote write skipped: export failed");
                return;
            }
        };

        let outcome = self
            .client
            .post(&self.url)
            .header("Content-Type", exposition::CONTENT_TYPE)
            .body(body)
            .send()
            .await;

        match outcome {
            Ok(response) if response.status().is_success() => {
                debug!(status = %response.status(), "Remote write delivered");
            }
            Ok(response) => {
                warn!(status = %response.status(), "Remote write rejected");
            }
            Err(e) => {
                warn!(error = %e, "Remote write failed");
            }
        }
    }
}
