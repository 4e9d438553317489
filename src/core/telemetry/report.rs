use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{TelemetryError, TelemetryResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkStatus {
    Succeeded,
    Failed,
    /// Never finished because the run halted first
    Cancelled,
}

/// One chunk's entry in `per_chunk`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub ordinal: usize,
    pub char_count: usize,
    pub attempts: u32,
    pub duration_ms: u64,
    pub cache_hit: bool,
    pub status: ChunkStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    pub plan_ms: u64,
    pub synthesis_ms: u64,
    pub stitch_ms: u64,
}

/// Aggregate section of the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: String,
    pub total_chunks: usize,
    pub total_retries: u64,
    pub wall_clock_ms: u64,
    pub cache_hit_rate: f64,
    pub overall_status: RunStatus,
    pub stages: StageTimings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failed_ordinal: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

/// The document written at the end of every run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReport {
    pub per_chunk: Vec<ChunkRecord>,
    pub summary: RunSummary,
}

impl TelemetryReport {
    pub fn to_json(&self) -> TelemetryResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| TelemetryError::Serialize(e.to_string()))
    }

    /// Write the report as pretty JSON, creating parent directories
    pub async fn write_json(&self, path: &Path) -> TelemetryResult<()> {
        let json = self.to_json()?;
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| TelemetryError::Write(format!("{}: {e}", parent.display())))?;
        }
        tokio::fs::write(path, json)
            .await
            .map_err(|e| TelemetryError::Write(format!("{}: {e}", path.display())))
    }
}
