//! Per-chunk job state machine
//!
//! ```text
//! pending -> running -> succeeded
//!               |
//!               +-> pending (retry scheduled) -> running -> ...
//!               |
//!               +-> failed
//! ```
//!
//! `succeeded` and `failed` are terminal. A pending job may also be failed
//! directly when the run halts before it was picked up again.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use crate::core::engine::SynthesisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("job {ordinal}: cannot move from {from} to {to}")]
pub struct TransitionError {
    pub ordinal: usize,
    pub from: JobStatus,
    pub to: JobStatus,
}

#[derive(Debug, Clone)]
pub struct SynthesisJob {
    ordinal: usize,
    attempts: u32,
    status: JobStatus,
    output_audio_path: Option<PathBuf>,
    last_error: Option<SynthesisError>,
    cache_hit: bool,
    started_at: Option<Instant>,
    duration: Option<Duration>,
}

impl SynthesisJob {
    pub fn new(ordinal: usize) -> Self {
        Self {
            ordinal,
            attempts: 0,
            status: JobStatus::Pending,
            output_audio_path: None,
            last_error: None,
            cache_hit: false,
            started_at: None,
            duration: None,
        }
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn output_audio_path(&self) -> Option<&Path> {
        self.output_audio_path.as_deref()
    }

    pub fn last_error(&self) -> Option<&SynthesisError> {
        self.last_error.as_ref()
    }

    pub fn cache_hit(&self) -> bool {
        self.cache_hit
    }

    /// Time from the first start to the terminal state
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }

    /// Time since the first start, whether or not the job finished
    pub fn elapsed(&self) -> Duration {
        self.duration
            .or_else(|| self.started_at.map(|t| t.elapsed()))
            .unwrap_or_default()
    }

    fn transition(&mut self, allowed: &[JobStatus], to: JobStatus) -> Result<(), TransitionError> {
        if !allowed.contains(&self.status) {
            return Err(TransitionError {
                ordinal: self.ordinal,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// `pending -> running`; returns the attempt number just started
    pub fn start(&mut self) -> Result<u32, TransitionError> {
        self.transition(&[JobStatus::Pending], JobStatus::Running)?;
        self.attempts += 1;
        self.started_at.get_or_insert_with(Instant::now);
        Ok(self.attempts)
    }

    /// `running -> succeeded`
    pub fn succeed(&mut self, output: PathBuf, cache_hit: bool) -> Result<(), TransitionError> {
        self.transition(&[JobStatus::Running], JobStatus::Succeeded)?;
        self.output_audio_path = Some(output);
        self.cache_hit = cache_hit;
        self.last_error = None;
        self.duration = Some(self.elapsed());
        Ok(())
    }

    /// `running -> pending`, keeping the error that caused the retry
    pub fn schedule_retry(&mut self, error: SynthesisError) -> Result<(), TransitionError> {
        self.transition(&[JobStatus::Running], JobStatus::Pending)?;
        self.last_error = Some(error);
        Ok(())
    }

    /// `running | pending -> failed`
    pub fn fail(&mut self, error: Option<SynthesisError>) -> Result<(), TransitionError> {
        self.transition(&[JobStatus::Running, JobStatus::Pending], JobStatus::Failed)?;
        if error.is_some() {
            self.last_error = error;
        }
        self.duration = Some(self.elapsed());
        Ok(())
    }
}
