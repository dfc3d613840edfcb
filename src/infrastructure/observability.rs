//! Push-based status reporter.
//!
//! Periodically serializes the supervisor's status snapshot as structured
//! JSON to the log stream. No HTTP server, no incoming connections — only
//! outbound data, suitable for headless deployments.

use crate::application::supervisor::{SupervisorHandle, SupervisorStatus};
use chrono::Utc;
use serde::Serialize;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Status snapshot for JSON output.
#[derive(Serialize)]
pub struct StatusSnapshot {
    pub timestamp: String,
    pub uptime_seconds: u64,
    pub version: String,
    #[serde(flatten)]
    pub status: SupervisorStatus,
}

/// Outputs supervisor status as structured JSON logs on a fixed interval.
pub struct StatusReporter {
    handle: SupervisorHandle,
    start_time: Instant,
    interval: Duration,
}

impl StatusReporter {
    pub fn new(handle: SupervisorHandle, interval_seconds: u64) -> Self {
        Self {
            handle,
            start_time: Instant::now(),
            interval: Duration::from_secs(interval_seconds),
        }
    }

    /// Run the reporter in a loop, outputting status periodically.
    pub async fn run(self) {
        info!(
            "StatusReporter: Starting push-based status (interval: {:?})",
            self.interval
        );

        let mut ticker = tokio::time::interval(self.interval);
        loop {
            ticker.tick().await;

            let snapshot = StatusSnapshot {
                timestamp: Utc::now().to_rfc3339(),
                uptime_seconds: self.start_time.elapsed().as_secs(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                status: self.handle.status().await,
            };

            match serde_json::to_string(&snapshot) {
                Ok(json) => info!(target: "status", "{json}"),
                Err(e) => warn!("StatusReporter: Failed to serialize status: {e}"),
            }
        }
    }
}
