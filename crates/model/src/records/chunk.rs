use crate::core::identifiers::RunId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// A bounded slice of a feed materialised to the run's scratch directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRef {
    pub run_id: RunId,
    /// 0-based, in source order.
    pub sequence: u32,
    pub path: PathBuf,
    pub record_count: usize,
}

impl ChunkRef {
    pub fn label(&self) -> String {
        format!("{}#{}", self.run_id, self.sequence)
    }
}
