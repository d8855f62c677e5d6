use serde::{Deserialize, Serialize};
use std::{path::PathBuf, time::Duration};

/// Engine-wide knobs. Every field has a default so an empty `engine`
/// section is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub workers: usize,
    /// Root for per-run scratch directories. Defaults to the system temp dir.
    pub scratch_dir: Option<PathBuf>,
    /// Sled database location. Defaults to `~/.feedsync/state`.
    pub state_dir: Option<PathBuf>,
    pub default_chunk_size: usize,
    pub download_timeout_secs: u64,
    pub client: ClientSettings,
    pub jobs: JobSettings,
    pub reconcile: ReconcileSettings,
    pub scheduler: SchedulerSettings,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            workers: 4,
            scratch_dir: None,
            state_dir: None,
            default_chunk_size: 500,
            download_timeout_secs: 300,
            client: ClientSettings::default(),
            jobs: JobSettings::default(),
            reconcile: ReconcileSettings::default(),
            scheduler: SchedulerSettings::default(),
        }
    }
}

impl EngineSettings {
    pub fn scratch_root(&self) -> PathBuf {
        self.scratch_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join("feedsync"))
    }

    pub fn state_path(&self) -> PathBuf {
        self.state_dir.clone().unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".feedsync")
                .join("state")
        })
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub max_batch_size: usize,
    pub lookup_page_size: u32,
    pub health_timeout_secs: u64,
    /// Batch call timeout with a clean circuit.
    pub batch_timeout_secs: u64,
    /// Floor the batch timeout degrades to as failures accumulate.
    pub min_batch_timeout_secs: u64,
    /// Pause between sub-batches after a split.
    pub inter_batch_delay_ms: u64,
    pub degraded_latency_ms: u64,
    pub circuit_ttl_secs: u64,
    /// Requests per minute per (destination, operation); 0 disables.
    pub rate_limit_per_minute: u32,
    pub rate_limit_burst: u32,
}

impl Default for ClientSettings {
    fn default() -> Self {
        ClientSettings {
            max_batch_size: 100,
            lookup_page_size: 100,
            health_timeout_secs: 10,
            batch_timeout_secs: 120,
            min_batch_timeout_secs: 60,
            inter_batch_delay_ms: 1_000,
            degraded_latency_ms: 1_500,
            circuit_ttl_secs: 3_600,
            rate_limit_per_minute: 120,
            rate_limit_burst: 10,
        }
    }
}

impl ClientSettings {
    pub fn health_timeout(&self) -> Duration {
        Duration::from_secs(self.health_timeout_secs)
    }

    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    pub fn min_batch_timeout(&self) -> Duration {
        Duration::from_secs(self.min_batch_timeout_secs.min(self.batch_timeout_secs))
    }

    pub fn inter_batch_delay(&self) -> Duration {
        Duration::from_millis(self.inter_batch_delay_ms)
    }

    pub fn degraded_latency(&self) -> Duration {
        Duration::from_millis(self.degraded_latency_ms)
    }

    pub fn circuit_ttl(&self) -> Duration {
        Duration::from_secs(self.circuit_ttl_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    pub max_attempts: usize,
    /// Outer timeout of one work-unit attempt.
    pub timeout_secs: u64,
    /// Linear backoff step: attempt `n` waits `n × step`.
    pub backoff_step_secs: u64,
    /// How often a pending finalisation re-checks outstanding work.
    pub finalize_recheck_ms: u64,
}

impl Default for JobSettings {
    fn default() -> Self {
        JobSettings {
            max_attempts: 3,
            timeout_secs: 15 * 60,
            backoff_step_secs: 30,
            finalize_recheck_ms: 500,
        }
    }
}

impl JobSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff_step(&self) -> Duration {
        Duration::from_secs(self.backoff_step_secs)
    }

    pub fn finalize_recheck(&self) -> Duration {
        Duration::from_millis(self.finalize_recheck_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconcileSettings {
    pub batch_size: usize,
    pub page_size: u32,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        ReconcileSettings {
            batch_size: 50,
            page_size: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub tick_secs: u64,
    pub default_import_interval_minutes: u64,
    pub reconcile_interval_minutes: u64,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        SchedulerSettings {
            tick_secs: 30,
            default_import_interval_minutes: 24 * 60,
            reconcile_interval_minutes: 24 * 60,
        }
    }
}

impl SchedulerSettings {
    pub fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs.max(1))
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_minutes * 60)
    }
}
