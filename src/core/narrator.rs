//! Narration run orchestrator
//!
//! Wires the stages of one run together: parse and plan the script, resolve
//! voices, synthesize every chunk, stitch the results and flush telemetry.
//! Telemetry is flushed exactly once per run and the report is written
//! whatever the outcome.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::NarratorConfig;
use crate::core::cache::SynthesisCache;
use crate::core::engine::SynthesisEngine;
use crate::core::executor::{ChunkAssignment, SynthesisExecutor};
use crate::core::planner::{Chunk, Script, plan};
use crate::core::stitcher::{AudioStitcher, StitchPlan, StitchSummary};
use crate::core::telemetry::{RunOutcome, Stage, TelemetryRecorder, TelemetryReport};
use crate::errors::{NarrationError, NarrationResult};

/// Result of a successful run
#[derive(Debug, Clone)]
pub struct NarrationOutcome {
    pub run_id: String,
    pub output_path: PathBuf,
    pub report_path: PathBuf,
    pub report: TelemetryReport,
    pub stitch: StitchSummary,
}

pub struct Narrator {
    config: NarratorConfig,
    executor: SynthesisExecutor,
    stitcher: AudioStitcher,
}

impl Narrator {
    pub fn new(
        config: NarratorConfig,
        engine: Arc<dyn SynthesisEngine>,
        cache: Arc<dyn SynthesisCache>,
    ) -> Self {
        let executor = SynthesisExecutor::new(engine, cache, config.executor_settings());
        let stitcher = AudioStitcher::new(config.stitch_settings());
        Self {
            config,
            executor,
            stitcher,
        }
    }

    pub fn config(&self) -> &NarratorConfig {
        &self.config
    }

    /// Parse and chunk a script without synthesizing anything
    pub fn plan_only(&self, script: &str) -> NarrationResult<Vec<Chunk>> {
        plan_script(&self.config, script)
    }

    /// Voice assignments for planned chunks, in ordinal order
    pub fn assign_voices(&self, chunks: Vec<Chunk>) -> Vec<ChunkAssignment> {
        chunks
            .into_iter()
            .map(|chunk| ChunkAssignment {
                voice_id: self.config.voice_for(chunk.speaker_id.as_deref()).to_string(),
                chunk,
            })
            .collect()
    }

    /// Narrate `script` into a WAV file at `output`.
    ///
    /// On any failure no file is left at `output` by this run, and the
    /// telemetry report still records what happened when it can be written.
    /// A report that cannot be written fails the run, and the stitched output
    /// is removed. A cancelled run always returns [`NarrationError::Cancelled`].
    pub async fn run(
        &self,
        script: &str,
        output: &Path,
        cancel: &CancellationToken,
    ) -> NarrationResult<NarrationOutcome> {
        let started_at = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let report_path = self.config.report_path_for(output);
        info!(run_id = %run_id, output = %output.display(), "Starting narration run");

        let plan_started = Instant::now();
        let planned = if cancel.is_cancelled() {
            Err(NarrationError::Cancelled)
        } else {
            self.plan_only(script)
        };
        let plan_elapsed = plan_started.elapsed();

        let (telemetry, result) = match planned {
            Ok(chunks) => {
                let telemetry = Arc::new(TelemetryRecorder::new(&run_id, chunks.len(), started_at));
                telemetry.record_stage(Stage::Plan, plan_elapsed);
                let staging_dir = self.config.staging_dir.join(&run_id);
                let result = self
                    .synthesize_and_stitch(chunks, &staging_dir, output, &telemetry, cancel)
                    .await;
                remove_staging_dir(&staging_dir).await;
                (telemetry, result)
            }
            Err(err) => {
                let telemetry = Arc::new(TelemetryRecorder::new(&run_id, 0, started_at));
                telemetry.record_stage(Stage::Plan, plan_elapsed);
                (telemetry, Err(err))
            }
        };

        let outcome = match &result {
            Ok(summary) => RunOutcome::succeeded(summary.output_path.clone()),
            Err(NarrationError::Cancelled) => RunOutcome::cancelled(),
            Err(err) => RunOutcome::failed(err.failed_ordinal(), err.to_string()),
        };
        let report = telemetry.flush(outcome)?;
        let written = report.write_json(&report_path).await;

        match result {
            Ok(stitch) => {
                if let Err(e) = written {
                    warn!(run_id = %run_id, error = %e, "Failed to write telemetry report; discarding output");
                    remove_output(&stitch.output_path).await;
                    return Err(e.into());
                }
                info!(
                    run_id = %run_id,
                    duration_ms = stitch.duration_ms,
                    report = %report_path.display(),
                    "Narration complete"
                );
                Ok(NarrationOutcome {
                    run_id,
                    output_path: stitch.output_path.clone(),
                    report_path,
                    report,
                    stitch,
                })
            }
            Err(err) => {
                if let Err(e) = written {
                    warn!(run_id = %run_id, error = %e, "Failed to write telemetry report");
                }
                warn!(run_id = %run_id, error = %err, "Narration run failed");
                Err(err)
            }
        }
    }

    async fn synthesize_and_stitch(
        &self,
        chunks: Vec<Chunk>,
        staging_dir: &Path,
        output: &Path,
        telemetry: &Arc<TelemetryRecorder>,
        cancel: &CancellationToken,
    ) -> NarrationResult<StitchSummary> {
        let work = self.assign_voices(chunks);

        let synthesis_started = Instant::now();
        let executed = self
            .executor
            .execute(work, staging_dir, Arc::clone(telemetry), cancel)
            .await;
        telemetry.record_stage(Stage::Synthesis, synthesis_started.elapsed());
        let jobs = executed?;

        if cancel.is_cancelled() {
            return Err(NarrationError::Cancelled);
        }

        let stitch_started = Instant::now();
        let stitch_plan = StitchPlan::from_jobs(&jobs, self.config.inter_chunk_gap_ms)?
            .with_lead_in_ms(self.config.lead_in_ms)
            .with_tail_ms(self.config.tail_ms);
        let stitcher = self.stitcher.clone();
        let target = output.to_path_buf();
        let stitched = tokio::task::spawn_blocking(move || stitcher.stitch(stitch_plan, &target))
            .await
            .map_err(|e| NarrationError::Internal(format!("stitch task failed: {e}")))?;
        telemetry.record_stage(Stage::Stitch, stitch_started.elapsed());
        let summary = stitched?;

        // Stitching cannot be interrupted; a cancel that raced it still wins.
        if cancel.is_cancelled() {
            remove_output(&summary.output_path).await;
            return Err(NarrationError::Cancelled);
        }
        Ok(summary)
    }
}

/// Parse and chunk a script under the chunk limits of `config`
pub fn plan_script(config: &NarratorConfig, script: &str) -> NarrationResult<Vec<Chunk>> {
    let script = Script::parse(script);
    let chunks = plan(
        script.text(),
        script.segments(),
        config.max_chars_per_chunk,
        config.max_sentences_per_chunk,
    )?;
    debug!(
        chunks = chunks.len(),
        speakers = script.speakers().len(),
        "Script planned"
    );
    Ok(chunks)
}

async fn remove_output(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(path = %path.display(), error = %e, "Failed to remove output of failed run");
    }
}

async fn remove_staging_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed staging directory"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove staging directory"),
    }
}
