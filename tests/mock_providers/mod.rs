//! Mock synthesis engines
//!
//! `MockEngine` writes a constant-level mono WAV per chunk so stitched output
//! can be checked for segment order: chunk `n` is written at level
//! `(n + 1) * 1000`. Failures, latency, per-ordinal formats, unreadable
//! output and panics are scripted.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use hound::{SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;

use narrator::{SynthesisEngine, SynthesisError, SynthesisRequest};
use narrator::core::engine::SynthesisResult;

pub const MOCK_SAMPLE_RATE: u32 = 16000;

/// Frames written per character of chunk text
pub const FRAMES_PER_CHAR: u32 = 40;

#[derive(Debug, Clone)]
enum FailurePlan {
    /// Fail this many calls, then succeed
    Times(u32, SynthesisError),
    Always(SynthesisError),
}

#[derive(Default)]
pub struct MockEngine {
    latency: Duration,
    failures: Mutex<HashMap<usize, FailurePlan>>,
    sample_rates: Mutex<HashMap<usize, u32>>,
    corrupt: Mutex<HashSet<usize>>,
    panics: Mutex<HashSet<usize>>,
    calls: AtomicUsize,
    calls_by_ordinal: Mutex<HashMap<usize, usize>>,
    voices: Mutex<Vec<(usize, String)>>,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Fail the first `times` calls for `ordinal` with `error`
    pub fn fail_times(self, ordinal: usize, times: u32, error: SynthesisError) -> Self {
        self.failures
            .lock()
            .insert(ordinal, FailurePlan::Times(times, error));
        self
    }

    /// Fail every call for `ordinal`
    pub fn fail_always(self, ordinal: usize, error: SynthesisError) -> Self {
        self.failures.lock().insert(ordinal, FailurePlan::Always(error));
        self
    }

    /// Write `ordinal` at a different sample rate
    pub fn sample_rate_for(self, ordinal: usize, sample_rate: u32) -> Self {
        self.sample_rates.lock().insert(ordinal, sample_rate);
        self
    }

    /// Report success for `ordinal` but write bytes that are not a WAV
    pub fn corrupt_output_for(self, ordinal: usize) -> Self {
        self.corrupt.lock().insert(ordinal);
        self
    }

    /// Panic inside the engine call for `ordinal`
    pub fn panic_on(self, ordinal: usize) -> Self {
        self.panics.lock().insert(ordinal);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn calls_for(&self, ordinal: usize) -> usize {
        self.calls_by_ordinal
            .lock()
            .get(&ordinal)
            .copied()
            .unwrap_or_default()
    }

    /// Voice used for each call, sorted by ordinal
    pub fn voices(&self) -> Vec<(usize, String)> {
        let mut voices = self.voices.lock().clone();
        voices.sort();
        voices
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Level written for chunk `ordinal`
    pub fn level_for(ordinal: usize) -> i16 {
        ((ordinal + 1) * 1000) as i16
    }

    /// Frames written for `text`
    pub fn frames_for(text: &str) -> u32 {
        text.chars().count() as u32 * FRAMES_PER_CHAR
    }

    fn scripted_failure(&self, ordinal: usize) -> Option<SynthesisError> {
        let mut failures = self.failures.lock();
        match failures.get_mut(&ordinal)? {
            FailurePlan::Always(err) => Some(err.clone()),
            FailurePlan::Times(0, _) => None,
            FailurePlan::Times(remaining, err) => {
                *remaining -= 1;
                Some(err.clone())
            }
        }
    }

    fn write_audio(&self, request: &SynthesisRequest, output: &Path) -> SynthesisResult<()> {
        let sample_rate = self
            .sample_rates
            .lock()
            .get(&request.ordinal)
            .copied()
            .unwrap_or(MOCK_SAMPLE_RATE);
        let spec = WavSpec {
            channels: 1,
            sample_rate,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let io = |e: hound::Error| SynthesisError::Io(e.to_string());
        let mut writer = WavWriter::create(output, spec).map_err(io)?;
        let level = Self::level_for(request.ordinal);
        for _ in 0..Self::frames_for(&request.text) {
            writer.write_sample(level).map_err(io)?;
        }
        writer.finalize().map_err(io)
    }
}

struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl SynthesisEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn synthesize(&self, request: &SynthesisRequest, output: &Path) -> SynthesisResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self
            .calls_by_ordinal
            .lock()
            .entry(request.ordinal)
            .or_default() += 1;
        self.voices
            .lock()
            .push((request.ordinal, request.voice_id.clone()));

        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        let _guard = ActiveGuard(&self.active);
        self.peak.fetch_max(now_active, Ordering::SeqCst);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.panics.lock().contains(&request.ordinal) {
            panic!("mock engine panicked on chunk {}", request.ordinal);
        }
        if let Some(err) = self.scripted_failure(request.ordinal) {
            return Err(err);
        }
        if self.corrupt.lock().contains(&request.ordinal) {
            std::fs::write(output, b"this is not a wav file")?;
            return Ok(());
        }
        self.write_audio(request, output)
    }
}
