//! Subprocess synthesis engine
//!
//! Runs a local TTS binary (piper and friends) once per chunk. The chunk text
//! is written to the child's stdin and also available as the `{text}`
//! argument placeholder. Other placeholders:
//!
//! - `{voice}`: the chunk's voice id
//! - `{output}`: the path the engine must write
//! - `{<key>}`: any key of the engine configuration
//!
//! Unknown placeholders are left untouched.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::base::{SynthesisEngine, SynthesisError, SynthesisRequest, SynthesisResult};

static PLACEHOLDER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{([A-Za-z0-9_.\-]+)\}").expect("valid placeholder regex"));

/// Keep error messages readable when an engine dumps a lot on stderr.
const MAX_STDERR_CHARS: usize = 512;

#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> SynthesisResult<Self> {
        let program = program.into();
        if program.trim().is_empty() {
            return Err(SynthesisError::InvalidConfiguration(
                "engine.program must not be empty".to_string(),
            ));
        }
        Ok(Self { program, args })
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments with placeholders substituted for one request
    pub fn render_args(&self, request: &SynthesisRequest, output: &Path) -> Vec<String> {
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|arg| {
                PLACEHOLDER_RE
                    .replace_all(arg, |caps: &Captures| {
                        let name = &caps[1];
                        match name {
                            "voice" => request.voice_id.clone(),
                            "output" => output.to_string(),
                            "text" => request.text.clone(),
                            _ => request
                                .engine_config
                                .get(name)
                                .cloned()
                                .unwrap_or_else(|| caps[0].to_string()),
                        }
                    })
                    .into_owned()
            })
            .collect()
    }
}

#[async_trait]
impl SynthesisEngine for CommandEngine {
    fn name(&self) -> &str {
        "command"
    }

    async fn synthesize(&self, request: &SynthesisRequest, output: &Path) -> SynthesisResult<()> {
        let args = self.render_args(request, output);
        debug!(
            ordinal = request.ordinal,
            program = %self.program,
            "Spawning synthesis process"
        );

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound | ErrorKind::PermissionDenied => {
                    SynthesisError::EngineUnavailable(format!("{}: {e}", self.program))
                }
                _ => SynthesisError::Io(format!("failed to spawn {}: {e}", self.program)),
            })?;

        let stdin = child.stdin.take();
        let text = request.text.as_bytes();
        let feed = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(text).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };

        let (fed, finished) = tokio::join!(feed, child.wait_with_output());
        let finished = finished?;
        if let Err(e) = fed
            && e.kind() != ErrorKind::BrokenPipe
        {
            return Err(e.into());
        }

        if !finished.status.success() {
            let stderr = String::from_utf8_lossy(&finished.stderr);
            let stderr = stderr.trim();
            let tail_start = stderr
                .char_indices()
                .rev()
                .nth(MAX_STDERR_CHARS)
                .map_or(0, |(i, _)| i);
            return Err(SynthesisError::ProcessFailed {
                code: finished.status.code(),
                stderr: stderr[tail_start..].to_string(),
            });
        }

        match tokio::fs::metadata(output).await {
            Ok(meta) if meta.len() > 0 => Ok(()),
            Ok(_) => Err(SynthesisError::EmptyOutput(format!(
                "{} wrote an empty file",
                self.program
            ))),
            Err(_) => Err(SynthesisError::EmptyOutput(format!(
                "{} did not write {}",
                self.program,
                output.display()
            ))),
        }
    }
}
