use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// Every field is optional so a file only needs to mention what it changes.
/// Values present here override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// planner:
///   max_chars_per_chunk: 400
///   max_sentences_per_chunk: 8
///
/// synthesis:
///   concurrency: 4
///   retry_attempts: 3
///   retry_base_delay_ms: 500
///   retry_multiplier: 2.0
///   retry_max_delay_ms: 30000
///   retry_jitter_factor: 0.2
///   engine_timeout_seconds: 120
///
/// audio:
///   inter_chunk_gap_ms: 250
///   lead_in_ms: 0
///   tail_ms: 500
///   sample_rate: 22050
///   channels: 1
///
/// voices:
///   default: "en_US-lessac-medium"
///   speakers:
///     host: "en_US-ryan-high"
///     guest: "en_GB-alba-medium"
///
/// engine:
///   kind: "command"
///   program: "piper"
///   args: ["--model", "{voice}", "--output_file", "{output}"]
///   config:
///     length_scale: "1.0"
///
/// cache:
///   enabled: true
///   path: "/var/cache/narrator"
///
/// output:
///   staging_dir: "/tmp/narrator"
///   report_path: "narration.telemetry.json"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub planner: Option<PlannerYaml>,
    pub synthesis: Option<SynthesisYaml>,
    pub audio: Option<AudioYaml>,
    pub voices: Option<VoicesYaml>,
    pub engine: Option<EngineYaml>,
    pub cache: Option<CacheYaml>,
    pub output: Option<OutputYaml>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct PlannerYaml {
    pub max_chars_per_chunk: Option<usize>,
    pub max_sentences_per_chunk: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct SynthesisYaml {
    pub concurrency: Option<usize>,
    pub retry_attempts: Option<u32>,
    pub retry_base_delay_ms: Option<u64>,
    pub retry_multiplier: Option<f64>,
    pub retry_max_delay_ms: Option<u64>,
    pub retry_jitter_factor: Option<f64>,
    /// 0 disables the per-call timeout
    pub engine_timeout_seconds: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AudioYaml {
    pub inter_chunk_gap_ms: Option<u32>,
    pub lead_in_ms: Option<u32>,
    pub tail_ms: Option<u32>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct VoicesYaml {
    pub default: Option<String>,
    /// Speaker id → voice id
    pub speakers: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct EngineYaml {
    pub kind: Option<String>,
    pub program: Option<String>,
    pub args: Option<Vec<String>>,
    pub url: Option<String>,
    /// Opaque key/value pairs passed to every synthesis call
    pub config: Option<BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CacheYaml {
    pub enabled: Option<bool>,
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OutputYaml {
    pub staging_dir: Option<String>,
    pub report_path: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
planner:
  max_chars_per_chunk: 300
  max_sentences_per_chunk: 4

synthesis:
  concurrency: 8
  retry_attempts: 5
  retry_multiplier: 1.5

audio:
  inter_chunk_gap_ms: 400
  sample_rate: 22050

voices:
  default: "en_US-amy-medium"
  speakers:
    host: "en_US-ryan-high"

engine:
  kind: "http"
  url: "http://127.0.0.1:5002/api/tts"
  config:
    speaker_id: "3"

cache:
  enabled: false
  path: "/tmp/narrator-cache"
"#;
        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let planner = config.planner.unwrap();
        assert_eq!(planner.max_chars_per_chunk, Some(300));
        assert_eq!(planner.max_sentences_per_chunk, Some(4));

        let synthesis = config.synthesis.unwrap();
        assert_eq!(synthesis.concurrency, Some(8));
        assert_eq!(synthesis.retry_attempts, Some(5));
        assert_eq!(synthesis.retry_multiplier, Some(1.5));
        assert_eq!(synthesis.retry_base_delay_ms, None);

        let audio = config.audio.unwrap();
        assert_eq!(audio.inter_chunk_gap_ms, Some(400));
        assert_eq!(audio.sample_rate, Some(22050));
        assert_eq!(audio.channels, None);

        let voices = config.voices.unwrap();
        assert_eq!(voices.default.as_deref(), Some("en_US-amy-medium"));
        assert_eq!(
            voices.speakers.unwrap().get("host").map(String::as_str),
            Some("en_US-ryan-high")
        );

        let engine = config.engine.unwrap();
        assert_eq!(engine.kind.as_deref(), Some("http"));
        assert_eq!(engine.config.unwrap().get("speaker_id").unwrap(), "3");

        let cache = config.cache.unwrap();
        assert_eq!(cache.enabled, Some(false));
        assert!(config.output.is_none());
    }

    #[test]
    fn test_yaml_config_empty_file() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.planner.is_none());
        assert!(config.engine.is_none());
    }

    #[test]
    fn test_from_file_errors() {
        let temp_dir = TempDir::new().unwrap();
        let missing = temp_dir.path().join("missing.yaml");
        let err = YamlConfig::from_file(&missing).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));

        let invalid = temp_dir.path().join("invalid.yaml");
        fs::write(&invalid, "planner: [unclosed").unwrap();
        let err = YamlConfig::from_file(&invalid).unwrap_err();
        assert!(err.to_string().contains("Failed to parse YAML config"));
    }
}
