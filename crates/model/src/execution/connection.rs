use crate::{core::identifiers::ConnectionId, transform::mapping::MappingRules};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedFormat {
    Csv,
    Json,
}

impl FeedFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            FeedFormat::Csv => "csv",
            FeedFormat::Json => "json",
        }
    }
}

impl fmt::Display for FeedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedSource {
    /// `http(s)://` URL, `file://` URL or a plain local path.
    pub url: String,
    pub format: FeedFormat,
    #[serde(default = "default_delimiter")]
    pub delimiter: char,
    #[serde(default = "default_enclosure")]
    pub enclosure: char,
    /// Dotted path to the record array inside a JSON document, e.g. `data.products`.
    #[serde(default)]
    pub record_path: Option<String>,
}

fn default_delimiter() -> char {
    ','
}

fn default_enclosure() -> char {
    '"'
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaleAction {
    Delete,
    ZeroStock,
}

impl fmt::Display for StaleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StaleAction::Delete => f.write_str("delete"),
            StaleAction::ZeroStock => f.write_str("zero_stock"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StalePolicy {
    pub action: StaleAction,
    pub stale_after_days: u32,
}

impl StalePolicy {
    /// Products last seen strictly before this instant are stale.
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.stale_after_days))
    }
}

/// A (feed, destination) pairing. Read-only to the pipeline; a run works on a
/// snapshot taken when it starts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedConnection {
    pub id: ConnectionId,
    /// Id of the destination entry holding base URL and credentials.
    pub destination: String,
    pub feed: FeedSource,
    #[serde(flatten)]
    pub rules: MappingRules,
    #[serde(default)]
    pub chunk_size: Option<usize>,
    #[serde(default)]
    pub stale_policy: Option<StalePolicy>,
    /// Daemon mode import cadence; connections without one are only imported on demand.
    #[serde(default)]
    pub import_interval_minutes: Option<u64>,
}
