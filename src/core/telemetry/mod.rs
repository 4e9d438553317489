//! Run telemetry
//!
//! Workers report each chunk exactly once into an index-addressed slot; the
//! narrator flushes the recorder exactly once at the end of the run, whether
//! it succeeded or not.

mod report;

use std::path::PathBuf;
use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{info, warn};

pub use report::{
    ChunkRecord, ChunkStatus, RunStatus, RunSummary, StageTimings, TelemetryReport,
};

pub type TelemetryResult<T> = Result<T, TelemetryError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TelemetryError {
    #[error("Chunk {0} was already recorded")]
    DuplicateRecord(usize),
    #[error("Chunk ordinal {ordinal} out of range for {total} chunks")]
    OrdinalOutOfRange { ordinal: usize, total: usize },
    #[error("Telemetry was already flushed")]
    AlreadyFlushed,
    #[error("Failed to serialize telemetry: {0}")]
    Serialize(String),
    #[error("Failed to write telemetry: {0}")]
    Write(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Plan,
    Synthesis,
    Stitch,
}

/// How the run ended, supplied at flush time
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub failed_ordinal: Option<usize>,
    pub error: Option<String>,
    pub output_path: Option<PathBuf>,
}

impl RunOutcome {
    pub fn succeeded(output_path: PathBuf) -> Self {
        Self {
            status: RunStatus::Succeeded,
            failed_ordinal: None,
            error: None,
            output_path: Some(output_path),
        }
    }

    pub fn failed(failed_ordinal: Option<usize>, error: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Failed,
            failed_ordinal,
            error: Some(error.into()),
            output_path: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: RunStatus::Cancelled,
            failed_ordinal: None,
            error: Some("run cancelled".to_string()),
            output_path: None,
        }
    }
}

pub struct TelemetryRecorder {
    run_id: String,
    started_at: Instant,
    records: Vec<OnceLock<ChunkRecord>>,
    stages: Mutex<StageTimings>,
    flushed: AtomicBool,
}

impl TelemetryRecorder {
    pub fn new(run_id: impl Into<String>, total_chunks: usize, started_at: Instant) -> Self {
        Self {
            run_id: run_id.into(),
            started_at,
            records: (0..total_chunks).map(|_| OnceLock::new()).collect(),
            stages: Mutex::new(StageTimings::default()),
            flushed: AtomicBool::new(false),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn total_chunks(&self) -> usize {
        self.records.len()
    }

    /// Store the record for one chunk. A second record for the same ordinal
    /// is rejected and the first one kept.
    pub fn record_chunk(&self, record: ChunkRecord) -> TelemetryResult<()> {
        let ordinal = record.ordinal;
        let slot = self.records.get(ordinal).ok_or(TelemetryError::OrdinalOutOfRange {
            ordinal,
            total: self.records.len(),
        })?;
        slot.set(record).map_err(|_| {
            warn!(ordinal, "Duplicate telemetry record rejected");
            TelemetryError::DuplicateRecord(ordinal)
        })
    }

    pub fn record(&self, ordinal: usize) -> Option<&ChunkRecord> {
        self.records.get(ordinal).and_then(OnceLock::get)
    }

    pub fn recorded_count(&self) -> usize {
        self.records.iter().filter(|r| r.get().is_some()).count()
    }

    pub fn record_stage(&self, stage: Stage, elapsed: Duration) {
        let ms = elapsed.as_millis() as u64;
        let mut stages = self.stages.lock();
        match stage {
            Stage::Plan => stages.plan_ms = ms,
            Stage::Synthesis => stages.synthesis_ms = ms,
            Stage::Stitch => stages.stitch_ms = ms,
        }
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed.load(Ordering::Acquire)
    }

    /// Build the final report. Succeeds once per recorder.
    pub fn flush(&self, outcome: RunOutcome) -> TelemetryResult<TelemetryReport> {
        if self.flushed.swap(true, Ordering::AcqRel) {
            return Err(TelemetryError::AlreadyFlushed);
        }

        let per_chunk: Vec<ChunkRecord> = self.records.iter().filter_map(|r| r.get().cloned()).collect();
        if per_chunk.len() < self.records.len() {
            warn!(
                recorded = per_chunk.len(),
                total = self.records.len(),
                "Flushing telemetry with missing chunk records"
            );
        }

        let total_retries = per_chunk
            .iter()
            .map(|r| u64::from(r.attempts.saturating_sub(1)))
            .sum();
        let hits = per_chunk.iter().filter(|r| r.cache_hit).count();
        let cache_hit_rate = if per_chunk.is_empty() {
            0.0
        } else {
            hits as f64 / per_chunk.len() as f64
        };

        let summary = RunSummary {
            run_id: self.run_id.clone(),
            total_chunks: self.records.len(),
            total_retries,
            wall_clock_ms: self.started_at.elapsed().as_millis() as u64,
            cache_hit_rate,
            overall_status: outcome.status,
            stages: *self.stages.lock(),
            failed_ordinal: outcome.failed_ordinal,
            error: outcome.error,
            output_path: outcome.output_path,
        };

        info!(
            run_id = %summary.run_id,
            status = ?summary.overall_status,
            total_chunks = summary.total_chunks,
            total_retries = summary.total_retries,
            cache_hit_rate = summary.cache_hit_rate,
            wall_clock_ms = summary.wall_clock_ms,
            "Narration run finished"
        );

        Ok(TelemetryReport { per_chunk, summary })
    }
}
