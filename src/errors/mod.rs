//! Run-level error type
//!
//! Each component owns its own error enum; [`NarrationError`] is what a whole
//! narration run reports, with the component error kept as the source.

use std::path::PathBuf;

use thiserror::Error;

use crate::core::engine::SynthesisError;
use crate::core::executor::ExecutorError;
use crate::core::planner::PlanningError;
use crate::core::stitcher::StitchError;
use crate::core::telemetry::TelemetryError;

/// Result type for narration runs
pub type NarrationResult<T> = Result<T, NarrationError>;

#[derive(Error, Debug)]
pub enum NarrationError {
    // ─────────────────────────────────────────────────────────────────────────────
    // Stage failures
    // ─────────────────────────────────────────────────────────────────────────────

    /// The script could not be chunked; nothing was synthesized
    #[error("Planning failed: {0}")]
    Planning(#[from] PlanningError),

    /// A chunk failed permanently, so the run was halted
    #[error("Chunk {ordinal} failed after {attempts} attempt(s): {source}")]
    ChunkFailed {
        ordinal: usize,
        attempts: u32,
        #[source]
        source: SynthesisError,
    },

    /// Assembly failed; no output file was left behind
    #[error("Stitching failed: {0}")]
    Stitch(#[from] StitchError),

    #[error("Narration cancelled")]
    Cancelled,

    // ─────────────────────────────────────────────────────────────────────────────
    // Ambient failures
    // ─────────────────────────────────────────────────────────────────────────────

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] TelemetryError),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invariant broken between stages
    #[error("Internal error: {0}")]
    Internal(String),
}

impl NarrationError {
    /// Ordinal of the chunk that sank the run, if one did
    pub fn failed_ordinal(&self) -> Option<usize> {
        match self {
            NarrationError::ChunkFailed { ordinal, .. } => Some(*ordinal),
            _ => None,
        }
    }
}

impl From<ExecutorError> for NarrationError {
    fn from(err: ExecutorError) -> Self {
        match err {
            ExecutorError::ChunkFailed {
                ordinal,
                attempts,
                source,
            } => NarrationError::ChunkFailed {
                ordinal,
                attempts,
                source,
            },
            ExecutorError::Cancelled => NarrationError::Cancelled,
            ExecutorError::Staging { path, source } => NarrationError::Io { path, source },
            err @ ExecutorError::OrdinalMismatch { .. } => NarrationError::Internal(err.to_string()),
        }
    }
}
