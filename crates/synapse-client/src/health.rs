//! Backend liveness monitor.
//!
//! Probes the health endpoint on a fixed interval and publishes the result
//! through a shared `Arc<AtomicBool>`. Probe failures only flip the flag;
//! they never touch session state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Serialize;
use synapse_core::config::SynapseConfig;
use tokio::sync::Notify;

use crate::error::ClientError;

/// Outcome of one probe.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub online: bool,
    pub latency_ms: u64,
    pub checked_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Periodic health prober.
pub struct HealthMonitor {
    client: Client,
    url: String,
    interval: Duration,
    online: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl HealthMonitor {
    /// Create a monitor for `url`. Each probe is bounded by `timeout`.
    pub fn new(
        url: impl Into<String>,
        interval: Duration,
        timeout: Duration,
    ) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
            interval,
            online: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(Notify::new()),
        })
    }

    pub fn from_config(config: &SynapseConfig) -> Result<Self, ClientError> {
        Self::new(
            config.endpoint(&config.health.path)?,
            Duration::from_secs(config.health.interval_secs),
            Duration::from_secs(config.health.timeout_secs),
        )
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Flag shared with consumers; `true` while the backend is reachable.
    pub fn online_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.online)
    }

    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Issue one probe. Any 2xx counts as online.
    pub async fn probe(&self) -> HealthReport {
        let start = Instant::now();
        let result = self.client.get(&self.url).send().await;
        let latency_ms = start.elapsed().as_millis() as u64;

        let error = match result {
            Ok(response) if response.status().is_success() => None,
            Ok(response) => Some(ClientError::Status(response.status().as_u16()).to_string()),
            Err(e) => Some(ClientError::Http(e).to_string()),
        };

        HealthReport {
            online: error.is_none(),
            latency_ms,
            checked_at: Utc::now(),
            error,
        }
    }

    /// Probe and publish the result to the shared flag.
    pub async fn check(&self) -> HealthReport {
        let report = self.probe().await;
        let was_online = self.online.swap(report.online, Ordering::SeqCst);

        match (was_online, report.online) {
            (false, true) => {
                tracing::info!(url = %self.url, latency_ms = report.latency_ms, "Backend online")
            }
            (true, false) => tracing::warn!(
                url = %self.url,
                error = report.error.as_deref().unwrap_or(""),
                "Backend offline"
            ),
            _ => tracing::trace!(online = report.online, latency_ms = report.latency_ms, "Health probe"),
        }

        report
    }

    /// Probe every `interval` until `shutdown` is called.
    pub async fn run(&self) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Health monitor started");
        loop {
            self.check().await;
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = self.shutdown.notified() => {
                    tracing::debug!("Health monitor stopped");
                    return;
                }
            }
        }
    }

    /// Signal `run` to return.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_builds_url() {
        let mut config = SynapseConfig::default();
        config.server.base_url = "http://brain.local:9000".to_string();
        config.health.path = "/status".to_string();
        let monitor = HealthMonitor::from_config(&config).unwrap();
        assert_eq!(monitor.url(), "http://brain.local:9000/status");
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_offline() {
        let monitor = HealthMonitor::new(
            "http://127.0.0.1:9/health",
            Duration::from_secs(10),
            Duration::from_secs(2),
        )
        .unwrap();
        let report = monitor.check().await;
        assert!(!report.online);
        assert!(report.error.is_some());
        assert!(!monitor.is_online());
    }

    #[tokio::test]
    async fn test_shutdown_before_run_returns() {
        let monitor = HealthMonitor::new(
            "http://127.0.0.1:9/health",
            Duration::from_secs(3600),
            Duration::from_secs(1),
        )
        .unwrap();
        monitor.shutdown();
        tokio::time::timeout(Duration::from_secs(5), monitor.run())
            .await
            .expect("monitor should stop within timeout");
    }
}
