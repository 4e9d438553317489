//! Parallel synthesis executor
//!
//! A fixed pool of workers pulls chunk ordinals from a shared queue. Each
//! ordinal owns one job slot, so results are addressed by position and never
//! by completion order. Failed attempts are put back on the queue by a timer
//! task once their backoff elapses; workers never sleep.
//!
//! The first permanently failed chunk halts the run: no further work is
//! dispatched, in-flight engine calls are dropped, and every job that did not
//! finish is finalized as failed.
//!
//! Each engine call runs on its own task, so a panicking engine fails its
//! chunk instead of taking a worker down with it. Engine output must parse as
//! a non-empty WAV before it is cached or handed to the stitcher.

mod job;
mod retry;

use std::any::Any;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::{AbortOnDropHandle, TaskTracker};
use tracing::{debug, error, info, warn};

use crate::core::cache::{CacheKey, InFlightRegistry, SynthesisCache};
use crate::core::engine::{
    EngineConfig, SynthesisEngine, SynthesisError, SynthesisRequest, SynthesisResult,
};
use crate::core::planner::Chunk;
use crate::core::telemetry::{ChunkRecord, ChunkStatus, TelemetryRecorder};
use crate::utils::check_wav;

pub use job::{JobStatus, SynthesisJob, TransitionError};
pub use retry::RetryPolicy;

pub type ExecutorResult<T> = Result<T, ExecutorError>;

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("Chunk {ordinal} failed after {attempts} attempt(s): {source}")]
    ChunkFailed {
        ordinal: usize,
        attempts: u32,
        #[source]
        source: SynthesisError,
    },
    #[error("Synthesis cancelled")]
    Cancelled,
    #[error("Chunk at position {position} has ordinal {ordinal}")]
    OrdinalMismatch { position: usize, ordinal: usize },
    #[error("Failed to prepare staging directory {path}: {source}")]
    Staging {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub concurrency: usize,
    pub retry: RetryPolicy,
    /// Per-attempt limit on one engine call
    pub engine_timeout: Option<Duration>,
    /// Passed to the engine and folded into every cache key
    pub engine_config: EngineConfig,
    /// Fingerprint of the engine wiring (program, arguments, endpoint).
    /// When set, cache keys are scoped to it.
    pub engine_identity: Option<String>,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            concurrency: 4,
            retry: RetryPolicy::default(),
            engine_timeout: Some(Duration::from_secs(120)),
            engine_config: EngineConfig::new(),
            engine_identity: None,
        }
    }
}

/// A planned chunk together with the voice that should speak it
#[derive(Debug, Clone)]
pub struct ChunkAssignment {
    pub chunk: Chunk,
    pub voice_id: String,
}

pub struct SynthesisExecutor {
    engine: Arc<dyn SynthesisEngine>,
    cache: Arc<dyn SynthesisCache>,
    settings: ExecutorSettings,
}

impl SynthesisExecutor {
    pub fn new(
        engine: Arc<dyn SynthesisEngine>,
        cache: Arc<dyn SynthesisCache>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            engine,
            cache,
            settings,
        }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    /// Synthesize every assignment, returning one terminal job per ordinal.
    ///
    /// Assignments must be in ordinal order starting at 0. Engine output is
    /// written under `staging_dir`; cached audio is referenced where it lives.
    /// Every chunk gets exactly one telemetry record, including chunks that
    /// never ran because the run halted.
    pub async fn execute(
        &self,
        work: Vec<ChunkAssignment>,
        staging_dir: &Path,
        telemetry: Arc<TelemetryRecorder>,
        cancel: &CancellationToken,
    ) -> ExecutorResult<Vec<SynthesisJob>> {
        for (position, assignment) in work.iter().enumerate() {
            if assignment.chunk.ordinal != position {
                return Err(ExecutorError::OrdinalMismatch {
                    position,
                    ordinal: assignment.chunk.ordinal,
                });
            }
        }
        if work.is_empty() {
            return Ok(Vec::new());
        }
        tokio::fs::create_dir_all(staging_dir)
            .await
            .map_err(|source| ExecutorError::Staging {
                path: staging_dir.to_path_buf(),
                source,
            })?;

        let total = work.len();
        let workers = self.settings.concurrency.clamp(1, total);
        let (queue, receiver) = mpsc::unbounded_channel();
        for ordinal in 0..total {
            // The receiver is alive until the workers below exit.
            let _ = queue.send(ordinal);
        }

        let ctx = Arc::new(RunContext::new(
            self,
            work,
            staging_dir.to_path_buf(),
            telemetry,
            cancel.child_token(),
            queue,
        ));

        info!(
            chunks = total,
            workers,
            max_retries = self.settings.retry.max_retries,
            engine = self.engine.name(),
            "Starting parallel synthesis"
        );

        let receiver = Arc::new(AsyncMutex::new(receiver));
        for worker_id in 0..workers {
            ctx.tracker
                .spawn(run_worker(Arc::clone(&ctx), Arc::clone(&receiver), worker_id));
        }
        ctx.tracker.close();
        ctx.tracker.wait().await;

        let jobs = ctx.finalize();

        if let Some((ordinal, attempts, source)) = ctx.failure.get().cloned() {
            return Err(ExecutorError::ChunkFailed {
                ordinal,
                attempts,
                source,
            });
        }
        if ctx.remaining.load(Ordering::Acquire) > 0 {
            warn!(
                unfinished = ctx.remaining.load(Ordering::Acquire),
                "Synthesis cancelled before all chunks finished"
            );
            return Err(ExecutorError::Cancelled);
        }

        info!(
            chunks = total,
            cache_hits = jobs.iter().filter(|j| j.cache_hit()).count(),
            "Parallel synthesis complete"
        );
        Ok(jobs)
    }
}

/// State shared by the workers and retry timers of one execution
struct RunContext {
    engine: Arc<dyn SynthesisEngine>,
    cache: Arc<dyn SynthesisCache>,
    retry: RetryPolicy,
    engine_timeout: Option<Duration>,
    requests: Vec<SynthesisRequest>,
    keys: Vec<CacheKey>,
    char_counts: Vec<usize>,
    jobs: Vec<Mutex<SynthesisJob>>,
    inflight: InFlightRegistry,
    telemetry: Arc<TelemetryRecorder>,
    staging_dir: PathBuf,
    remaining: AtomicUsize,
    failure: OnceLock<(usize, u32, SynthesisError)>,
    halt: CancellationToken,
    queue: mpsc::UnboundedSender<usize>,
    tracker: TaskTracker,
}

impl RunContext {
    fn new(
        executor: &SynthesisExecutor,
        work: Vec<ChunkAssignment>,
        staging_dir: PathBuf,
        telemetry: Arc<TelemetryRecorder>,
        halt: CancellationToken,
        queue: mpsc::UnboundedSender<usize>,
    ) -> Self {
        let engine_config = &executor.settings.engine_config;
        let identity = executor.settings.engine_identity.as_deref();
        let total = work.len();
        let mut requests = Vec::with_capacity(total);
        let mut keys = Vec::with_capacity(total);
        let mut char_counts = Vec::with_capacity(total);
        for ChunkAssignment { chunk, voice_id } in work {
            keys.push(match identity {
                Some(engine) => {
                    CacheKey::compute_for_engine(engine, &chunk.text, &voice_id, engine_config)
                }
                None => CacheKey::compute(&chunk.text, &voice_id, engine_config),
            });
            char_counts.push(chunk.char_count);
            requests.push(SynthesisRequest {
                ordinal: chunk.ordinal,
                text: chunk.text,
                voice_id,
                engine_config: engine_config.clone(),
            });
        }

        Self {
            engine: Arc::clone(&executor.engine),
            cache: Arc::clone(&executor.cache),
            retry: executor.settings.retry.clone(),
            engine_timeout: executor.settings.engine_timeout,
            requests,
            keys,
            char_counts,
            jobs: (0..total).map(|i| Mutex::new(SynthesisJob::new(i))).collect(),
            inflight: InFlightRegistry::new(),
            telemetry,
            staging_dir,
            remaining: AtomicUsize::new(total),
            failure: OnceLock::new(),
            halt,
            queue,
            tracker: TaskTracker::new(),
        }
    }

    async fn process(self: &Arc<Self>, ordinal: usize) {
        let started = self.jobs[ordinal].lock().start();
        let attempt = match started {
            Ok(attempt) => attempt,
            Err(e) => {
                error!(error = %e, "Dequeued a job that is not pending");
                return;
            }
        };
        let key = &self.keys[ordinal];

        let mut slot = tokio::select! {
            biased;
            _ = self.halt.cancelled() => return,
            slot = self.inflight.acquire(key) => slot,
        };

        if let Some(path) = slot.completed() {
            debug!(ordinal, key = %key, "Reusing audio synthesized earlier in this run");
            let path = path.to_path_buf();
            drop(slot);
            self.succeed(ordinal, path, true);
            return;
        }

        match self.cache.lookup(key).await {
            Ok(Some(path)) => {
                debug!(ordinal, key = %key, "Cache hit");
                slot.complete(path.clone());
                drop(slot);
                self.succeed(ordinal, path, true);
                return;
            }
            Ok(None) => {}
            Err(e) => warn!(ordinal, error = %e, "Cache lookup failed; treating as a miss"),
        }

        let staging = self
            .staging_dir
            .join(format!("chunk-{ordinal:05}-attempt-{attempt}.wav"));
        let result = tokio::select! {
            biased;
            _ = self.halt.cancelled() => return,
            result = self.synthesize_checked(ordinal, &staging) => result,
        };

        match result {
            Ok(()) => {
                let path = match self.cache.store(key, &staging).await {
                    Ok(path) => path,
                    Err(e) => {
                        warn!(ordinal, error = %e, "Cache store failed; using staging audio");
                        staging
                    }
                };
                slot.complete(path.clone());
                drop(slot);
                self.succeed(ordinal, path, false);
            }
            Err(e) => {
                drop(slot);
                if let Err(rm) = tokio::fs::remove_file(&staging).await
                    && rm.kind() != std::io::ErrorKind::NotFound
                {
                    debug!(path = %staging.display(), error = %rm, "Could not remove failed attempt output");
                }
                self.fail_attempt(ordinal, attempt, e);
            }
        }
    }

    /// One engine call followed by a check that it left playable audio
    async fn synthesize_checked(&self, ordinal: usize, staging: &Path) -> SynthesisResult<()> {
        self.call_engine(ordinal, staging.to_path_buf()).await?;
        let frames = check_wav(staging.to_path_buf())
            .await
            .map_err(SynthesisError::InvalidAudio)?;
        debug!(ordinal, frames, "Engine output verified");
        Ok(())
    }

    /// Dropping the returned future aborts the engine task.
    async fn call_engine(&self, ordinal: usize, output: PathBuf) -> SynthesisResult<()> {
        let engine = Arc::clone(&self.engine);
        let request = self.requests[ordinal].clone();
        let call = AbortOnDropHandle::new(tokio::spawn(async move {
            engine.synthesize(&request, &output).await
        }));
        let joined = match self.engine_timeout {
            Some(limit) => match tokio::time::timeout(limit, call).await {
                Ok(joined) => joined,
                Err(_) => return Err(SynthesisError::Timeout(limit)),
            },
            None => call.await,
        };
        match joined {
            Ok(result) => result,
            Err(e) if e.is_panic() => {
                let message = panic_message(&*e.into_panic());
                error!(engine = self.engine.name(), ordinal, panic = %message, "Engine panicked");
                Err(SynthesisError::EnginePanicked(message))
            }
            Err(e) => Err(SynthesisError::Io(format!("engine task did not complete: {e}"))),
        }
    }

    fn succeed(&self, ordinal: usize, path: PathBuf, cache_hit: bool) {
        let record = {
            let mut job = self.jobs[ordinal].lock();
            if let Err(e) = job.succeed(path, cache_hit) {
                error!(error = %e, "Could not mark job succeeded");
                return;
            }
            debug!(
                ordinal,
                attempts = job.attempts(),
                cache_hit,
                "Chunk synthesized"
            );
            ChunkRecord {
                ordinal,
                char_count: self.char_counts[ordinal],
                attempts: job.attempts(),
                duration_ms: job.elapsed().as_millis() as u64,
                cache_hit,
                status: ChunkStatus::Succeeded,
                error: None,
            }
        };
        self.record(record);

        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.halt.cancel();
        }
    }

    fn fail_attempt(self: &Arc<Self>, ordinal: usize, attempt: u32, error: SynthesisError) {
        if error.is_retryable() && self.retry.allows_retry(attempt) {
            let delay = self.retry.delay(attempt);
            warn!(
                ordinal,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "Synthesis attempt failed; retry scheduled"
            );
            if let Err(e) = self.jobs[ordinal].lock().schedule_retry(error) {
                error!(error = %e, "Could not schedule retry");
                return;
            }
            let ctx = Arc::clone(self);
            self.tracker.spawn(async move {
                tokio::select! {
                    biased;
                    _ = ctx.halt.cancelled() => {}
                    _ = tokio::time::sleep(delay) => {
                        let _ = ctx.queue.send(ordinal);
                    }
                }
            });
            return;
        }

        error!(
            ordinal,
            attempts = attempt,
            retryable = error.is_retryable(),
            error = %error,
            "Chunk synthesis failed permanently"
        );
        let record = {
            let mut job = self.jobs[ordinal].lock();
            if let Err(e) = job.fail(Some(error.clone())) {
                error!(error = %e, "Could not mark job failed");
                return;
            }
            ChunkRecord {
                ordinal,
                char_count: self.char_counts[ordinal],
                attempts: job.attempts(),
                duration_ms: job.elapsed().as_millis() as u64,
                cache_hit: false,
                status: ChunkStatus::Failed,
                error: Some(error.to_string()),
            }
        };
        self.record(record);
        let _ = self.failure.set((ordinal, attempt, error));
        self.halt.cancel();
    }

    fn record(&self, record: ChunkRecord) {
        if let Err(e) = self.telemetry.record_chunk(record) {
            warn!(error = %e, "Telemetry record rejected");
        }
    }

    /// Fail every job that did not reach a terminal state and snapshot all slots.
    fn finalize(&self) -> Vec<SynthesisJob> {
        let mut jobs = Vec::with_capacity(self.jobs.len());
        for (ordinal, slot) in self.jobs.iter().enumerate() {
            let snapshot = {
                let mut job = slot.lock();
                if !job.status().is_terminal() && job.fail(None).is_ok() {
                    let record = ChunkRecord {
                        ordinal,
                        char_count: self.char_counts[ordinal],
                        attempts: job.attempts(),
                        duration_ms: job.elapsed().as_millis() as u64,
                        cache_hit: false,
                        status: ChunkStatus::Cancelled,
                        error: Some("halted before completion".to_string()),
                    };
                    self.record(record);
                }
                job.clone()
            };
            jobs.push(snapshot);
        }
        jobs
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn run_worker(
    ctx: Arc<RunContext>,
    receiver: Arc<AsyncMutex<mpsc::UnboundedReceiver<usize>>>,
    worker_id: usize,
) {
    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.halt.cancelled() => None,
            next = async { receiver.lock().await.recv().await } => next,
        };
        let Some(ordinal) = next else {
            break;
        };
        if ctx.halt.is_cancelled() {
            break;
        }
        ctx.process(ordinal).await;
    }
    debug!(worker_id, "Synthesis worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cache::MemoryCache;
    use crate::core::planner::plan;
    use crate::utils::wav_frame_count;
    use async_trait::async_trait;
    use hound::{SampleFormat, WavSpec, WavWriter};
    use std::collections::HashMap;
    use std::sync::atomic::AtomicU32;
    use std::time::Instant;
    use tempfile::TempDir;

    /// Ten frames of audio per character of chunk text
    fn write_text_wav(output: &Path, text: &str) -> SynthesisResult<()> {
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let io = |e: hound::Error| SynthesisError::Io(e.to_string());
        let mut writer = WavWriter::create(output, spec).map_err(io)?;
        for _ in 0..text.len() * 10 {
            writer.write_sample(100i16).map_err(io)?;
        }
        writer.finalize().map_err(io)
    }

    /// Writes a WAV sized by the chunk text and fails on request
    struct ScriptedEngine {
        calls: AtomicU32,
        active: AtomicUsize,
        peak: AtomicUsize,
        failures: Mutex<HashMap<usize, u32>>,
        garbage: Mutex<HashMap<usize, u32>>,
        permanent: Option<usize>,
        delay: Duration,
    }

    impl ScriptedEngine {
        fn new() -> Self {
            Self {
                calls: AtomicU32::new(0),
                active: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                failures: Mutex::new(HashMap::new()),
                garbage: Mutex::new(HashMap::new()),
                permanent: None,
                delay: Duration::from_millis(5),
            }
        }

        fn failing(mut self, ordinal: usize, times: u32) -> Self {
            self.failures.get_mut().insert(ordinal, times);
            self
        }

        /// Report success but leave bytes that are not a WAV
        fn writing_garbage(mut self, ordinal: usize, times: u32) -> Self {
            self.garbage.get_mut().insert(ordinal, times);
            self
        }
    }

    #[async_trait]
    impl SynthesisEngine for ScriptedEngine {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn synthesize(
            &self,
            request: &SynthesisRequest,
            output: &Path,
        ) -> SynthesisResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            if self.permanent == Some(request.ordinal) {
                return Err(SynthesisError::Network("engine down".into()));
            }
            {
                let mut failures = self.failures.lock();
                if let Some(left) = failures.get_mut(&request.ordinal)
                    && *left > 0
                {
                    *left -= 1;
                    return Err(SynthesisError::ProcessFailed {
                        code: Some(1),
                        stderr: "flaky".into(),
                    });
                }
            }
            {
                let mut garbage = self.garbage.lock();
                if let Some(left) = garbage.get_mut(&request.ordinal)
                    && *left > 0
                {
                    *left -= 1;
                    std::fs::write(output, b"this is not a wav file")?;
                    return Ok(());
                }
            }
            write_text_wav(output, &request.text)
        }
    }

    fn assignments(text: &str, max_chars: usize) -> Vec<ChunkAssignment> {
        plan(text, &[], max_chars, 10)
            .unwrap()
            .into_iter()
            .map(|chunk| ChunkAssignment {
                chunk,
                voice_id: "amy".to_string(),
            })
            .collect()
    }

    fn fast_settings(concurrency: usize, max_retries: u32) -> ExecutorSettings {
        ExecutorSettings {
            concurrency,
            retry: RetryPolicy {
                max_retries,
                base_delay_ms: 1,
                multiplier: 2.0,
                max_delay_ms: 10,
                jitter_factor: 0.0,
            },
            engine_timeout: Some(Duration::from_secs(5)),
            engine_config: EngineConfig::new(),
            engine_identity: None,
        }
    }

    const FIVE: &str = "One is here. Two is here. Three is here. Four is here. Five is here.";

    #[tokio::test]
    async fn test_all_chunks_succeed_in_slots() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(ScriptedEngine::new());
        let executor =
            SynthesisExecutor::new(engine.clone(), Arc::new(MemoryCache::new()), fast_settings(2, 0));
        let work = assignments(FIVE, 15);
        assert_eq!(work.len(), 5);
        let lengths: Vec<u64> = work.iter().map(|w| w.chunk.text.len() as u64 * 10).collect();
        let telemetry = Arc::new(TelemetryRecorder::new("t", 5, Instant::now()));

        let jobs = executor
            .execute(work, dir.path(), telemetry.clone(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(jobs.len(), 5);
        for (i, job) in jobs.iter().enumerate() {
            assert_eq!(job.ordinal(), i);
            assert_eq!(job.status(), JobStatus::Succeeded);
            let frames = wav_frame_count(job.output_audio_path().unwrap()).unwrap();
            assert_eq!(frames, lengths[i]);
        }
        assert_eq!(engine.calls.load(Ordering::SeqCst), 5);
        assert!(engine.peak.load(Ordering::SeqCst) <= 2);
        assert_eq!(telemetry.recorded_count(), 5);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(ScriptedEngine::new().failing(3, 2));
        let executor =
            SynthesisExecutor::new(engine.clone(), Arc::new(MemoryCache::new()), fast_settings(2, 3));
        let telemetry = Arc::new(TelemetryRecorder::new("t", 5, Instant::now()));

        let jobs = executor
            .execute(assignments(FIVE, 15), dir.path(), telemetry.clone(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(jobs[3].attempts(), 3);
        for i in [0, 1, 2, 4] {
            assert_eq!(jobs[i].attempts(), 1);
        }
        assert_eq!(telemetry.record(3).unwrap().attempts, 3);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 7);
    }

    #[tokio::test]
    async fn test_permanent_failure_halts_run() {
        let dir = TempDir::new().unwrap();
        let mut engine = ScriptedEngine::new();
        engine.permanent = Some(2);
        let executor =
            SynthesisExecutor::new(Arc::new(engine), Arc::new(MemoryCache::new()), fast_settings(1, 2));
        let telemetry = Arc::new(TelemetryRecorder::new("t", 5, Instant::now()));

        let err = executor
            .execute(assignments(FIVE, 15), dir.path(), telemetry.clone(), &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ExecutorError::ChunkFailed {
                ordinal, attempts, ..
            } => {
                assert_eq!(ordinal, 2);
                assert_eq!(attempts, 3);
            }
            other => panic!("expected ChunkFailed, got {other:?}"),
        }
        assert_eq!(telemetry.recorded_count(), 5);
        let failed = telemetry.record(2).unwrap();
        assert_eq!(failed.status, ChunkStatus::Failed);
        assert_eq!(failed.attempts, 3);
        assert!(failed.error.as_deref().unwrap().contains("engine down"));
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_immediately() {
        struct Broken;
        #[async_trait]
        impl SynthesisEngine for Broken {
            fn name(&self) -> &str {
                "broken"
            }
            async fn synthesize(&self, _: &SynthesisRequest, _: &Path) -> SynthesisResult<()> {
                Err(SynthesisError::EngineUnavailable("no binary".into()))
            }
        }

        let dir = TempDir::new().unwrap();
        let executor =
            SynthesisExecutor::new(Arc::new(Broken), Arc::new(MemoryCache::new()), fast_settings(1, 5));
        let telemetry = Arc::new(TelemetryRecorder::new("t", 5, Instant::now()));
        let err = executor
            .execute(assignments(FIVE, 15), dir.path(), telemetry.clone(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::ChunkFailed {
                ordinal: 0,
                attempts: 1,
                ..
            }
        ));
        // One worker: nothing after the failed chunk was ever started.
        for ordinal in 1..5 {
            let record = telemetry.record(ordinal).unwrap();
            assert_eq!(record.status, ChunkStatus::Cancelled);
            assert_eq!(record.attempts, 0);
        }
    }

    #[tokio::test]
    async fn test_identical_chunks_synthesize_once() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(ScriptedEngine::new());
        let executor =
            SynthesisExecutor::new(engine.clone(), Arc::new(MemoryCache::new()), fast_settings(4, 0));
        let telemetry = Arc::new(TelemetryRecorder::new("t", 3, Instant::now()));

        let jobs = executor
            .execute(
                assignments("Same line. Same line. Same line.", 12),
                dir.path(),
                telemetry,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(jobs.len(), 3);
        assert_eq!(engine.calls.load(Ordering::SeqCst), 1);
        assert_eq!(jobs.iter().filter(|j| j.cache_hit()).count(), 2);
    }

    #[tokio::test]
    async fn test_cancel_before_start_reports_cancelled() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(ScriptedEngine::new());
        let executor =
            SynthesisExecutor::new(engine.clone(), Arc::new(MemoryCache::new()), fast_settings(2, 0));
        let telemetry = Arc::new(TelemetryRecorder::new("t", 5, Instant::now()));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = executor
            .execute(assignments(FIVE, 15), dir.path(), telemetry.clone(), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutorError::Cancelled));
        assert_eq!(engine.calls.load(Ordering::SeqCst), 0);
        assert_eq!(telemetry.recorded_count(), 5);
    }

    #[tokio::test]
    async fn test_engine_timeout_counts_as_attempt() {
        let dir = TempDir::new().unwrap();
        let mut engine = ScriptedEngine::new();
        engine.delay = Duration::from_millis(200);
        let mut settings = fast_settings(1, 1);
        settings.engine_timeout = Some(Duration::from_millis(10));
        let executor = SynthesisExecutor::new(Arc::new(engine), Arc::new(MemoryCache::new()), settings);
        let telemetry = Arc::new(TelemetryRecorder::new("t", 1, Instant::now()));

        let err = executor
            .execute(assignments("Slow.", 100), dir.path(), telemetry, &CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            ExecutorError::ChunkFailed {
                attempts, source, ..
            } => {
                assert_eq!(attempts, 2);
                assert!(matches!(source, SynthesisError::Timeout(_)));
            }
            other => panic!("expected ChunkFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_rejects_out_of_order_assignments() {
        let dir = TempDir::new().unwrap();
        let executor = SynthesisExecutor::new(
            Arc::new(ScriptedEngine::new()),
            Arc::new(MemoryCache::new()),
            fast_settings(1, 0),
        );
        let mut work = assignments(FIVE, 15);
        work.swap(0, 1);
        let telemetry = Arc::new(TelemetryRecorder::new("t", 5, Instant::now()));
        let err = executor
            .execute(work, dir.path(), telemetry, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExecutorError::OrdinalMismatch {
                position: 0,
                ordinal: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_unreadable_output_is_retried() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(ScriptedEngine::new().writing_garbage(1, 1));
        let executor =
            SynthesisExecutor::new(engine.clone(), Arc::new(MemoryCache::new()), fast_settings(2, 2));
        let telemetry = Arc::new(TelemetryRecorder::new("t", 5, Instant::now()));

        let jobs = executor
            .execute(assignments(FIVE, 15), dir.path(), telemetry, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(jobs[1].attempts(), 2);
        assert_eq!(jobs[1].status(), JobStatus::Succeeded);
        assert!(!jobs[1].cache_hit());
        assert!(wav_frame_count(jobs[1].output_audio_path().unwrap()).is_ok());
        assert_eq!(engine.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_persistently_unreadable_output_is_never_cached() {
        let dir = TempDir::new().unwrap();
        let engine = Arc::new(ScriptedEngine::new().writing_garbage(0, u32::MAX));
        let cache = Arc::new(MemoryCache::new());
        let executor = SynthesisExecutor::new(engine, cache.clone(), fast_settings(1, 1));
        let telemetry = Arc::new(TelemetryRecorder::new("t", 1, Instant::now()));

        let err = executor
            .execute(assignments("Broken.", 100), dir.path(), telemetry, &CancellationToken::new())
            .await
            .unwrap_err();

        match err {
            ExecutorError::ChunkFailed {
                ordinal,
                attempts,
                source,
            } => {
                assert_eq!(ordinal, 0);
                assert_eq!(attempts, 2);
                assert!(matches!(source, SynthesisError::InvalidAudio(_)));
            }
            other => panic!("expected ChunkFailed, got {other:?}"),
        }
        let key = CacheKey::compute("Broken.", "amy", &EngineConfig::new());
        assert_eq!(cache.lookup(&key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_engine_panic_fails_chunk_instead_of_hanging() {
        struct Panicking;
        #[async_trait]
        impl SynthesisEngine for Panicking {
            fn name(&self) -> &str {
                "panicking"
            }
            async fn synthesize(&self, request: &SynthesisRequest, output: &Path) -> SynthesisResult<()> {
                if request.ordinal == 1 {
                    panic!("voice model exploded");
                }
                write_text_wav(output, &request.text)
            }
        }

        let dir = TempDir::new().unwrap();
        let executor =
            SynthesisExecutor::new(Arc::new(Panicking), Arc::new(MemoryCache::new()), fast_settings(2, 3));
        let telemetry = Arc::new(TelemetryRecorder::new("t", 5, Instant::now()));

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            executor.execute(assignments(FIVE, 15), dir.path(), telemetry.clone(), &CancellationToken::new()),
        )
        .await
        .expect("a panicking engine must not hang the run");

        match result.unwrap_err() {
            ExecutorError::ChunkFailed {
                ordinal,
                attempts,
                source: SynthesisError::EnginePanicked(message),
            } => {
                assert_eq!(ordinal, 1);
                assert_eq!(attempts, 1);
                assert!(message.contains("voice model exploded"));
            }
            other => panic!("expected EnginePanicked, got {other:?}"),
        }
        assert_eq!(telemetry.recorded_count(), 5);
        assert_eq!(telemetry.record(1).unwrap().status, ChunkStatus::Failed);
    }

    #[tokio::test]
    async fn test_engine_identity_scopes_cache_keys() {
        let dir = TempDir::new().unwrap();
        let cache = Arc::new(MemoryCache::new());
        let run = |identity: Option<&str>| {
            let mut settings = fast_settings(1, 0);
            settings.engine_identity = identity.map(str::to_string);
            let engine = Arc::new(ScriptedEngine::new());
            let executor = SynthesisExecutor::new(engine.clone(), cache.clone(), settings);
            let staging = dir.path().join(identity.unwrap_or("none"));
            async move {
                let telemetry = Arc::new(TelemetryRecorder::new("t", 1, Instant::now()));
                let jobs = executor
                    .execute(assignments("Keyed.", 100), &staging, telemetry, &CancellationToken::new())
                    .await
                    .unwrap();
                (engine.calls.load(Ordering::SeqCst), jobs[0].cache_hit())
            }
        };

        assert_eq!(run(Some("piper --length_scale 1.0")).await, (1, false));
        assert_eq!(run(Some("piper --length_scale 1.0")).await, (0, true));
        assert_eq!(run(Some("piper --length_scale 1.5")).await, (1, false));
        assert_eq!(run(None).await, (1, false));
    }
}
