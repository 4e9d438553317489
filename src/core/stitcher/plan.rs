use std::path::PathBuf;

use serde::Serialize;

use super::{StitchError, StitchResult};
use crate::core::executor::{JobStatus, SynthesisJob};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StitchEntry {
    pub ordinal: usize,
    pub audio_path: PathBuf,
    /// Silence after this chunk; ignored for the last entry
    pub gap_after_ms: u32,
}

/// Ordered assembly instructions; only exists when every chunk succeeded
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StitchPlan {
    entries: Vec<StitchEntry>,
    lead_in_ms: u32,
    tail_ms: u32,
}

impl StitchPlan {
    /// Build a plan from explicit entries. Entries are sorted by ordinal and
    /// must then cover `0..N` without gaps or duplicates.
    pub fn new(mut entries: Vec<StitchEntry>) -> StitchResult<Self> {
        if entries.is_empty() {
            return Err(StitchError::EmptyPlan);
        }
        entries.sort_by_key(|e| e.ordinal);
        for (expected, entry) in entries.iter().enumerate() {
            if entry.ordinal != expected {
                return Err(StitchError::OrdinalGap {
                    expected,
                    found: entry.ordinal,
                });
            }
        }
        Ok(Self {
            entries,
            lead_in_ms: 0,
            tail_ms: 0,
        })
    }

    /// Build a plan from terminal jobs with a uniform inter-chunk gap.
    ///
    /// Fails on the first job that did not succeed: a narration with a
    /// missing segment is never assembled.
    pub fn from_jobs(jobs: &[SynthesisJob], gap_ms: u32) -> StitchResult<Self> {
        let last = jobs.len().saturating_sub(1);
        let entries = jobs
            .iter()
            .map(|job| match (job.status(), job.output_audio_path()) {
                (JobStatus::Succeeded, Some(path)) => Ok(StitchEntry {
                    ordinal: job.ordinal(),
                    audio_path: path.to_path_buf(),
                    gap_after_ms: if job.ordinal() == last { 0 } else { gap_ms },
                }),
                (status, _) => Err(StitchError::IncompleteJob {
                    ordinal: job.ordinal(),
                    status,
                }),
            })
            .collect::<StitchResult<Vec<_>>>()?;
        Self::new(entries)
    }

    pub fn with_lead_in_ms(mut self, lead_in_ms: u32) -> Self {
        self.lead_in_ms = lead_in_ms;
        self
    }

    pub fn with_tail_ms(mut self, tail_ms: u32) -> Self {
        self.tail_ms = tail_ms;
        self
    }

    pub fn entries(&self) -> &[StitchEntry] {
        &self.entries
    }

    pub fn lead_in_ms(&self) -> u32 {
        self.lead_in_ms
    }

    pub fn tail_ms(&self) -> u32 {
        self.tail_ms
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
