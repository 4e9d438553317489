mod base;
mod command;
mod http;

use std::sync::Arc;

pub use base::{
    EngineConfig, EngineSettings, SynthesisEngine, SynthesisError, SynthesisRequest,
    SynthesisResult,
};
pub use command::CommandEngine;
pub use http::HttpEngine;

/// Factory function to create a synthesis engine.
///
/// # Supported kinds
///
/// - `"command"` (or `"subprocess"`): runs `program args...` per chunk
/// - `"http"`: posts each chunk to `url`
///
/// # Example
///
/// ```rust,ignore
/// use narrator::core::engine::{create_synthesis_engine, EngineSettings};
///
/// let settings = EngineSettings {
///     kind: "http".to_string(),
///     url: Some("http://127.0.0.1:5002/api/tts".to_string()),
///     ..Default::default()
/// };
/// let engine = create_synthesis_engine(&settings)?;
/// ```
pub fn create_synthesis_engine(
    settings: &EngineSettings,
) -> SynthesisResult<Arc<dyn SynthesisEngine>> {
    match settings.kind.to_lowercase().as_str() {
        "command" | "subprocess" => {
            let program = settings.program.as_deref().ok_or_else(|| {
                SynthesisError::InvalidConfiguration(
                    "engine.program is required for the command engine".to_string(),
                )
            })?;
            Ok(Arc::new(CommandEngine::new(program, settings.args.clone())?))
        }
        "http" => {
            let url = settings.url.as_deref().ok_or_else(|| {
                SynthesisError::InvalidConfiguration(
                    "engine.url is required for the http engine".to_string(),
                )
            })?;
            Ok(Arc::new(HttpEngine::new(url)?))
        }
        other => Err(SynthesisError::InvalidConfiguration(format!(
            "Unsupported engine kind: {other}. Supported kinds: command, http"
        ))),
    }
}
