//! Audio stitcher
//!
//! Concatenates per-chunk WAV files strictly in ordinal order into one
//! track, with silence between chunks. Every input must share the first
//! input's format; nothing is resampled or converted.
//!
//! Output is written to `<output>.partial` and renamed into place only once
//! the whole track has been written, so a failed stitch leaves no file at
//! `output`.

mod plan;

use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::executor::JobStatus;

pub use plan::{StitchEntry, StitchPlan};

pub type StitchResult<T> = Result<T, StitchError>;

#[derive(Debug, Error)]
pub enum StitchError {
    #[error("Nothing to stitch")]
    EmptyPlan,
    #[error("Chunk {ordinal} is {status}; only fully synthesized runs are stitched")]
    IncompleteJob { ordinal: usize, status: JobStatus },
    #[error("Expected chunk {expected} but found chunk {found}")]
    OrdinalGap { expected: usize, found: usize },
    #[error("Audio for chunk {ordinal} is missing: {}", .path.display())]
    MissingFile { ordinal: usize, path: PathBuf },
    #[error("Audio for chunk {ordinal} is empty: {}", .path.display())]
    EmptyAudio { ordinal: usize, path: PathBuf },
    #[error("Audio for chunk {ordinal} is unreadable ({}): {reason}", .path.display())]
    Corrupt {
        ordinal: usize,
        path: PathBuf,
        reason: String,
    },
    #[error("Audio for chunk {ordinal} is {found}, expected {expected}")]
    FormatMismatch {
        ordinal: usize,
        expected: String,
        found: String,
    },
    #[error("Failed to write {}: {reason}", .path.display())]
    Output { path: PathBuf, reason: String },
}

/// Output format constraints applied on top of "all inputs agree"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StitchSettings {
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentSummary {
    pub ordinal: usize,
    pub start_frame: u64,
    pub frames: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StitchSummary {
    pub output_path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub total_frames: u64,
    pub duration_ms: u64,
    pub segments: Vec<SegmentSummary>,
}

/// Number of frames of silence for `ms` milliseconds, rounded down
pub fn silence_frames(ms: u32, sample_rate: u32) -> u64 {
    u64::from(ms) * u64::from(sample_rate) / 1000
}

fn describe(spec: &WavSpec) -> String {
    let kind = match spec.sample_format {
        SampleFormat::Int => "int",
        SampleFormat::Float => "float",
    };
    format!(
        "{} Hz, {} ch, {}-bit {kind}",
        spec.sample_rate, spec.channels, spec.bits_per_sample
    )
}

type FileReader = WavReader<BufReader<fs::File>>;
type FileWriter = WavWriter<BufWriter<fs::File>>;

#[derive(Debug, Clone, Default)]
pub struct AudioStitcher {
    settings: StitchSettings,
}

impl AudioStitcher {
    pub fn new(settings: StitchSettings) -> Self {
        Self { settings }
    }

    /// Assemble `plan` into `output`. Blocking; run it on a blocking thread
    /// from async code.
    pub fn stitch(&self, plan: StitchPlan, output: &Path) -> StitchResult<StitchSummary> {
        let (spec, frames) = self.validate(&plan)?;

        let partial = partial_path(output);
        if let Some(parent) = output.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| StitchError::Output {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })?;
        }

        match self.write_track(&plan, spec, &frames, &partial, output) {
            Ok(summary) => {
                fs::rename(&partial, output).map_err(|e| {
                    let _ = fs::remove_file(&partial);
                    StitchError::Output {
                        path: output.to_path_buf(),
                        reason: e.to_string(),
                    }
                })?;
                info!(
                    output = %output.display(),
                    chunks = summary.segments.len(),
                    duration_ms = summary.duration_ms,
                    "Stitched narration"
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(rm) = fs::remove_file(&partial) {
                    debug!(path = %partial.display(), error = %rm, "No partial output to remove");
                }
                warn!(error = %e, "Stitch failed; no output written");
                Err(e)
            }
        }
    }

    /// Check every input before writing anything. Returns the shared format
    /// and each chunk's frame count.
    fn validate(&self, plan: &StitchPlan) -> StitchResult<(WavSpec, Vec<u64>)> {
        let mut shared: Option<WavSpec> = None;
        let mut frames = Vec::with_capacity(plan.len());

        for entry in plan.entries() {
            let reader = open(entry)?;
            let spec = reader.spec();
            let length = u64::from(reader.duration());
            if length == 0 {
                return Err(StitchError::EmptyAudio {
                    ordinal: entry.ordinal,
                    path: entry.audio_path.clone(),
                });
            }

            match shared {
                None => {
                    self.check_settings(entry.ordinal, &spec)?;
                    shared = Some(spec);
                }
                Some(expected) if expected != spec => {
                    return Err(StitchError::FormatMismatch {
                        ordinal: entry.ordinal,
                        expected: describe(&expected),
                        found: describe(&spec),
                    });
                }
                Some(_) => {}
            }
            frames.push(length);
        }

        shared.map(|spec| (spec, frames)).ok_or(StitchError::EmptyPlan)
    }

    fn check_settings(&self, ordinal: usize, spec: &WavSpec) -> StitchResult<()> {
        let rate_ok = self.settings.sample_rate.is_none_or(|r| r == spec.sample_rate);
        let channels_ok = self.settings.channels.is_none_or(|c| c == spec.channels);
        if rate_ok && channels_ok {
            return Ok(());
        }
        let expected = format!(
            "{} Hz, {} ch",
            self.settings
                .sample_rate
                .map_or_else(|| "any".to_string(), |r| r.to_string()),
            self.settings
                .channels
                .map_or_else(|| "any".to_string(), |c| c.to_string()),
        );
        Err(StitchError::FormatMismatch {
            ordinal,
            expected,
            found: describe(spec),
        })
    }

    fn write_track(
        &self,
        plan: &StitchPlan,
        spec: WavSpec,
        frames: &[u64],
        partial: &Path,
        output: &Path,
    ) -> StitchResult<StitchSummary> {
        let output_error = |e: hound::Error| StitchError::Output {
            path: partial.to_path_buf(),
            reason: e.to_string(),
        };
        let mut writer = WavWriter::create(partial, spec).map_err(output_error)?;

        let mut cursor = 0u64;
        cursor += write_silence(&mut writer, spec, plan.lead_in_ms()).map_err(output_error)?;

        let mut segments = Vec::with_capacity(plan.len());
        let last = plan.len().saturating_sub(1);
        for (index, (entry, &length)) in plan.entries().iter().zip(frames).enumerate() {
            copy_samples(entry, spec, length, &mut writer)?;
            segments.push(SegmentSummary {
                ordinal: entry.ordinal,
                start_frame: cursor,
                frames: length,
            });
            cursor += length;
            if index < last {
                cursor +=
                    write_silence(&mut writer, spec, entry.gap_after_ms).map_err(output_error)?;
            }
        }
        cursor += write_silence(&mut writer, spec, plan.tail_ms()).map_err(output_error)?;
        writer.finalize().map_err(output_error)?;

        Ok(StitchSummary {
            output_path: output.to_path_buf(),
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
            total_frames: cursor,
            duration_ms: cursor * 1000 / u64::from(spec.sample_rate.max(1)),
            segments,
        })
    }
}

fn partial_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    output.with_file_name(name)
}

fn open(entry: &StitchEntry) -> StitchResult<FileReader> {
    match fs::metadata(&entry.audio_path) {
        Ok(meta) if meta.len() == 0 => {
            return Err(StitchError::EmptyAudio {
                ordinal: entry.ordinal,
                path: entry.audio_path.clone(),
            });
        }
        Ok(_) => {}
        Err(_) => {
            return Err(StitchError::MissingFile {
                ordinal: entry.ordinal,
                path: entry.audio_path.clone(),
            });
        }
    }
    WavReader::open(&entry.audio_path).map_err(|e| StitchError::Corrupt {
        ordinal: entry.ordinal,
        path: entry.audio_path.clone(),
        reason: e.to_string(),
    })
}

/// Copy every sample of one chunk. The file is re-opened so that a file
/// changed since validation is still caught.
fn copy_samples(
    entry: &StitchEntry,
    spec: WavSpec,
    expected_frames: u64,
    writer: &mut FileWriter,
) -> StitchResult<()> {
    let mut reader = open(entry)?;
    let corrupt = |reason: String| StitchError::Corrupt {
        ordinal: entry.ordinal,
        path: entry.audio_path.clone(),
        reason,
    };
    if reader.spec() != spec || u64::from(reader.duration()) != expected_frames {
        return Err(corrupt("file changed during stitching".to_string()));
    }

    let mut written = 0u64;
    match spec.sample_format {
        SampleFormat::Int => {
            for sample in reader.samples::<i32>() {
                let sample = sample.map_err(|e| corrupt(e.to_string()))?;
                writer
                    .write_sample(sample)
                    .map_err(|e| corrupt(e.to_string()))?;
                written += 1;
            }
        }
        SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                let sample = sample.map_err(|e| corrupt(e.to_string()))?;
                writer
                    .write_sample(sample)
                    .map_err(|e| corrupt(e.to_string()))?;
                written += 1;
            }
        }
    }

    let expected_samples = expected_frames * u64::from(spec.channels);
    if written != expected_samples {
        return Err(corrupt(format!(
            "read {written} samples, header declares {expected_samples}"
        )));
    }
    Ok(())
}

/// Write `ms` of silence; returns the number of frames written
fn write_silence(writer: &mut FileWriter, spec: WavSpec, ms: u32) -> hound::Result<u64> {
    let frames = silence_frames(ms, spec.sample_rate);
    let samples = frames * u64::from(spec.channels);
    for _ in 0..samples {
        match spec.sample_format {
            SampleFormat::Int => writer.write_sample(0i32)?,
            SampleFormat::Float => writer.write_sample(0.0f32)?,
        }
    }
    Ok(frames)
}
