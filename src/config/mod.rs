//! Configuration module for the narrator
//!
//! Configuration comes from `.env` files, environment variables (`NARRATOR_*`)
//! and an optional YAML file. Priority: YAML > ENV vars > .env values > defaults.
//!
//! # Modules
//! - `yaml`: YAML configuration file loading
//! - `env`: Environment variable loading
//! - `merge`: Layering YAML over the environment
//! - `validation`: Configuration validation logic
//!
//! # Example
//! ```rust,no_run
//! use narrator::config::NarratorConfig;
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load from environment variables only
//! let config = NarratorConfig::from_env()?;
//!
//! // Load from YAML file with environment variable fallbacks
//! let config = NarratorConfig::from_file(&PathBuf::from("narrator.yaml"))?;
//! println!("Synthesizing with {} workers", config.concurrency);
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

mod env;
mod merge;
mod validation;
mod yaml;

pub use yaml::YamlConfig;

use crate::core::cache::CacheKey;
use crate::core::engine::{EngineConfig, EngineSettings};
use crate::core::executor::{ExecutorSettings, RetryPolicy};
use crate::core::stitcher::StitchSettings;

/// Narrator configuration
///
/// Covers chunk planning limits, the synthesis worker pool and its retry
/// policy, voice selection, the engine boundary, audio assembly, and where
/// caches, staging files and reports live.
#[derive(Debug, Clone, PartialEq)]
pub struct NarratorConfig {
    // Planning
    pub max_chars_per_chunk: usize,
    pub max_sentences_per_chunk: usize,

    // Synthesis
    pub concurrency: usize,
    /// Retries after the first attempt
    pub retry_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub retry_multiplier: f64,
    pub retry_max_delay_ms: u64,
    pub retry_jitter_factor: f64,
    /// Per engine call; 0 disables the timeout
    pub engine_timeout_seconds: u64,

    // Assembly
    pub inter_chunk_gap_ms: u32,
    pub lead_in_ms: u32,
    pub tail_ms: u32,
    /// Required sample rate of every chunk, if set
    pub sample_rate: Option<u32>,
    /// Required channel count of every chunk, if set
    pub channels: Option<u16>,

    // Voices
    pub default_voice: String,
    /// Speaker id → voice id
    pub voices: BTreeMap<String, String>,

    // Engine
    pub engine: EngineSettings,
    pub engine_config: EngineConfig,

    // Storage
    pub cache_enabled: bool,
    pub cache_path: PathBuf,
    pub staging_dir: PathBuf,
    /// Telemetry report location; defaults to `<output>.telemetry.json`
    pub report_path: Option<PathBuf>,
}

impl Default for NarratorConfig {
    fn default() -> Self {
        Self {
            max_chars_per_chunk: 400,
            max_sentences_per_chunk: 8,
            concurrency: 4,
            retry_attempts: 3,
            retry_base_delay_ms: 500,
            retry_multiplier: 2.0,
            retry_max_delay_ms: 30_000,
            retry_jitter_factor: 0.2,
            engine_timeout_seconds: 120,
            inter_chunk_gap_ms: 250,
            lead_in_ms: 0,
            tail_ms: 0,
            sample_rate: None,
            channels: None,
            default_voice: "en_US-lessac-medium".to_string(),
            voices: BTreeMap::new(),
            engine: EngineSettings::default(),
            engine_config: EngineConfig::new(),
            cache_enabled: true,
            cache_path: PathBuf::from(".narrator/cache"),
            staging_dir: std::env::temp_dir().join("narrator"),
            report_path: None,
        }
    }
}

impl NarratorConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let config = env::load_from_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file, falling back to environment
    /// variables for anything the file leaves out
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        // .env is loaded by main before this runs, so it already sits under
        // the real environment here.
        let yaml_config = yaml::YamlConfig::from_file(path)?;
        let config = merge::merge_config(Some(yaml_config))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), Box<dyn std::error::Error>> {
        validation::validate_limits(self)?;
        validation::validate_retry(self)?;
        validation::validate_audio(self)?;
        validation::validate_engine(self)?;
        Ok(())
    }

    /// Voice for a speaker; unknown or absent speakers get the default voice
    pub fn voice_for(&self, speaker_id: Option<&str>) -> &str {
        speaker_id
            .and_then(|id| self.voices.get(id))
            .map_or(self.default_voice.as_str(), String::as_str)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.retry_attempts,
            base_delay_ms: self.retry_base_delay_ms,
            multiplier: self.retry_multiplier,
            max_delay_ms: self.retry_max_delay_ms,
            jitter_factor: self.retry_jitter_factor,
        }
    }

    pub fn engine_timeout(&self) -> Option<Duration> {
        (self.engine_timeout_seconds > 0).then(|| Duration::from_secs(self.engine_timeout_seconds))
    }

    pub fn executor_settings(&self) -> ExecutorSettings {
        ExecutorSettings {
            concurrency: self.concurrency,
            retry: self.retry_policy(),
            engine_timeout: self.engine_timeout(),
            engine_config: self.engine_config.clone(),
            engine_identity: Some(self.engine.fingerprint()),
        }
    }

    /// Cache key a run with this configuration uses for `text` spoken by `voice`
    pub fn cache_key(&self, text: &str, voice: &str) -> CacheKey {
        CacheKey::compute_for_engine(&self.engine.fingerprint(), text, voice, &self.engine_config)
    }

    pub fn stitch_settings(&self) -> StitchSettings {
        StitchSettings {
            sample_rate: self.sample_rate,
            channels: self.channels,
        }
    }

    /// Where the telemetry report for `output` goes
    pub fn report_path_for(&self, output: &Path) -> PathBuf {
        self.report_path.clone().unwrap_or_else(|| {
            let mut name = output
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_default();
            name.push(".telemetry.json");
            output.with_file_name(name)
        })
    }
}
