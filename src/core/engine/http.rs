//! Local HTTP synthesis engine
//!
//! `POST <url>` with a JSON body `{"text", "voice", "config"}`; the response
//! body is the WAV file.

use std::path::Path;

use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use super::base::{SynthesisEngine, SynthesisError, SynthesisRequest, SynthesisResult};

/// Cap on the error body echoed back in `SynthesisError::Http`
const MAX_ERROR_BODY_CHARS: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpEngine {
    client: reqwest::Client,
    url: reqwest::Url,
}

impl HttpEngine {
    pub fn new(url: &str) -> SynthesisResult<Self> {
        let url = reqwest::Url::parse(url).map_err(|e| {
            SynthesisError::InvalidConfiguration(format!("invalid engine url {url}: {e}"))
        })?;
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| SynthesisError::EngineUnavailable(format!("HTTP client: {e}")))?;
        Ok(Self { client, url })
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

#[async_trait]
impl SynthesisEngine for HttpEngine {
    fn name(&self) -> &str {
        "http"
    }

    async fn synthesize(&self, request: &SynthesisRequest, output: &Path) -> SynthesisResult<()> {
        let body = json!({
            "text": request.text,
            "voice": request.voice_id,
            "config": request.engine_config,
        });

        debug!(ordinal = request.ordinal, url = %self.url, "Sending synthesis request");
        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| SynthesisError::Network(format!("Request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let message: String = text.trim().chars().take(MAX_ERROR_BODY_CHARS).collect();
            return Err(SynthesisError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let audio = response
            .bytes()
            .await
            .map_err(|e| SynthesisError::Network(format!("Failed to read response: {e}")))?;
        if audio.is_empty() {
            return Err(SynthesisError::EmptyOutput(format!(
                "{} returned an empty body",
                self.url
            )));
        }

        tokio::fs::write(output, &audio).await?;
        Ok(())
    }
}
