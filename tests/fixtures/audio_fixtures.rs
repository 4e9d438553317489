//! Audio Test Fixtures
//!
//! Programmatically generated WAV files and helpers to inspect stitched
//! output. Default format: 16 kHz, 16-bit signed PCM, mono.

#![allow(dead_code)]

use std::f32::consts::PI;
use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

/// Standard sample rate for fixtures
pub const SAMPLE_RATE: u32 = 16000;

pub fn mono_spec(sample_rate: u32) -> WavSpec {
    WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    }
}

/// Frames covering `ms` milliseconds at `sample_rate`
pub fn frames_for_ms(ms: u32, sample_rate: u32) -> u64 {
    u64::from(ms) * u64::from(sample_rate) / 1000
}

/// Write a sine tone of `frames` frames
pub fn write_sine_wav(path: &Path, spec: WavSpec, frames: u32, frequency: f32) {
    let mut writer = WavWriter::create(path, spec).unwrap();
    for n in 0..frames {
        let t = n as f32 / spec.sample_rate as f32;
        let sample = ((2.0 * PI * frequency * t).sin() * 0.5 * i16::MAX as f32) as i16;
        for _ in 0..spec.channels {
            writer.write_sample(sample).unwrap();
        }
    }
    writer.finalize().unwrap();
}

/// Write a constant-level mono clip; handy for checking segment order
pub fn write_level_wav(path: &Path, sample_rate: u32, frames: u32, level: i16) {
    let mut writer = WavWriter::create(path, mono_spec(sample_rate)).unwrap();
    for _ in 0..frames {
        writer.write_sample(level).unwrap();
    }
    writer.finalize().unwrap();
}

pub fn wav_spec(path: &Path) -> WavSpec {
    WavReader::open(path).unwrap().spec()
}

/// Number of frames in a WAV file
pub fn wav_frames(path: &Path) -> u64 {
    u64::from(WavReader::open(path).unwrap().duration())
}

pub fn wav_duration_ms(path: &Path) -> u64 {
    let reader = WavReader::open(path).unwrap();
    u64::from(reader.duration()) * 1000 / u64::from(reader.spec().sample_rate)
}

/// All samples of a 16-bit file
pub fn read_samples_i16(path: &Path) -> Vec<i16> {
    WavReader::open(path)
        .unwrap()
        .samples::<i16>()
        .map(|s| s.unwrap())
        .collect()
}

/// Distinct non-silent levels in order of appearance, collapsing repeats
pub fn level_sequence(samples: &[i16]) -> Vec<i16> {
    let mut levels: Vec<i16> = Vec::new();
    for &sample in samples.iter().filter(|s| **s != 0) {
        if levels.last() != Some(&sample) {
            levels.push(sample);
        }
    }
    levels
}
