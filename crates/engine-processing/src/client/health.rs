use crate::{client::DestinationClient, error::ClientError};
use serde::Serialize;
use std::{fmt, time::Instant};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Critical,
    Down,
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            HealthStatus::Healthy => "healthy",
            HealthStatus::Degraded => "degraded",
            HealthStatus::Critical => "critical",
            HealthStatus::Down => "down",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub destination: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl DestinationClient {
    /// Probes the destination with a minimal read.
    ///
    /// An open circuit reports `critical` without touching the network.
    pub async fn health_check(&self) -> HealthReport {
        let destination = self.key().to_string();
        let circuit = self.circuit();
        if circuit.open {
            warn!(destination = %destination, failure_count = circuit.failure_count, "Health check skipped, circuit open");
            return HealthReport {
                destination,
                status: HealthStatus::Critical,
                latency_ms: None,
                message: Some(format!(
                    "circuit open after {:.1} weighted failures",
                    circuit.failure_count
                )),
            };
        }

        let started = Instant::now();
        let result = self.ping().await;
        let latency = started.elapsed();
        let latency_ms = Some(latency.as_millis() as u64);

        let report = match result {
            Err(ClientError::CircuitOpen(_)) => HealthReport {
                destination,
                status: HealthStatus::Critical,
                latency_ms: None,
                message: Some("circuit open".into()),
            },
            Err(ClientError::Api(e)) => HealthReport {
                destination,
                status: HealthStatus::Down,
                latency_ms,
                message: Some(e.to_string()),
            },
            Ok(()) if latency > self.settings().degraded_latency() => HealthReport {
                destination,
                status: HealthStatus::Degraded,
                latency_ms,
                message: Some(format!("slow response ({}ms)", latency.as_millis())),
            },
            Ok(()) => HealthReport {
                destination,
                status: HealthStatus::Healthy,
                latency_ms,
                message: None,
            },
        };

        info!(destination = %report.destination, status = %report.status, latency_ms = ?report.latency_ms, "Health check");
        report
    }
}
