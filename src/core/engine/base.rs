use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Opaque engine parameters; sorted so cache keys stay stable
pub type EngineConfig = BTreeMap<String, String>;

/// Result type for synthesis calls
pub type SynthesisResult<T> = Result<T, SynthesisError>;

/// Errors raised by a synthesis engine
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthesisError {
    #[error("Invalid engine configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Invalid synthesis request: {0}")]
    InvalidRequest(String),
    #[error("Engine unavailable: {0}")]
    EngineUnavailable(String),
    #[error("Engine process exited with {code:?}: {stderr}")]
    ProcessFailed { code: Option<i32>, stderr: String },
    #[error("Engine returned HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("Network error: {0}")]
    Network(String),
    #[error("Engine call timed out after {0:?}")]
    Timeout(Duration),
    #[error("Engine produced no audio: {0}")]
    EmptyOutput(String),
    #[error("Engine produced unreadable audio: {0}")]
    InvalidAudio(String),
    #[error("Engine panicked: {0}")]
    EnginePanicked(String),
    #[error("I/O error: {0}")]
    Io(String),
}

impl SynthesisError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            SynthesisError::InvalidConfiguration(_)
            | SynthesisError::InvalidRequest(_)
            | SynthesisError::EngineUnavailable(_)
            | SynthesisError::EnginePanicked(_) => false,
            SynthesisError::Http { status, .. } => {
                !(400..500).contains(status) || *status == 408 || *status == 429
            }
            SynthesisError::ProcessFailed { .. }
            | SynthesisError::Network(_)
            | SynthesisError::Timeout(_)
            | SynthesisError::EmptyOutput(_)
            | SynthesisError::InvalidAudio(_)
            | SynthesisError::Io(_) => true,
        }
    }
}

impl From<std::io::Error> for SynthesisError {
    fn from(err: std::io::Error) -> Self {
        SynthesisError::Io(err.to_string())
    }
}

/// One chunk's worth of work for an engine
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesisRequest {
    pub ordinal: usize,
    pub text: String,
    pub voice_id: String,
    pub engine_config: EngineConfig,
}

/// How to reach the synthesis engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// `command` or `http`
    pub kind: String,
    /// Executable for the command engine
    pub program: Option<String>,
    /// Arguments for the command engine; placeholders are substituted per request
    pub args: Vec<String>,
    /// Endpoint for the HTTP engine
    pub url: Option<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            kind: "command".to_string(),
            program: Some("piper".to_string()),
            args: vec![
                "--model".to_string(),
                "{voice}".to_string(),
                "--output_file".to_string(),
                "{output}".to_string(),
            ],
            url: None,
        }
    }
}

impl EngineSettings {
    /// Stable rendering of how the engine is invoked; scopes cache keys so
    /// audio made with other arguments is never reused
    pub fn fingerprint(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// A black-box text-to-speech engine
///
/// Implementations write exactly one audio file per call to `output`. They
/// must not assume anything about call order or concurrency; the executor
/// may call `synthesize` from several workers at once.
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &str;

    async fn synthesize(&self, request: &SynthesisRequest, output: &Path) -> SynthesisResult<()>;
}
