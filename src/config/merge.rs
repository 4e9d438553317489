use std::path::PathBuf;

use super::NarratorConfig;
use super::env::load_from_env;
use super::yaml::YamlConfig;

/// Environment configuration with YAML values layered on top
pub(super) fn merge_config(
    yaml: Option<YamlConfig>,
) -> Result<NarratorConfig, Box<dyn std::error::Error>> {
    let mut config = load_from_env()?;
    let Some(yaml) = yaml else {
        return Ok(config);
    };

    if let Some(planner) = yaml.planner {
        if let Some(v) = planner.max_chars_per_chunk {
            config.max_chars_per_chunk = v;
        }
        if let Some(v) = planner.max_sentences_per_chunk {
            config.max_sentences_per_chunk = v;
        }
    }

    if let Some(synthesis) = yaml.synthesis {
        if let Some(v) = synthesis.concurrency {
            config.concurrency = v;
        }
        if let Some(v) = synthesis.retry_attempts {
            config.retry_attempts = v;
        }
        if let Some(v) = synthesis.retry_base_delay_ms {
            config.retry_base_delay_ms = v;
        }
        if let Some(v) = synthesis.retry_multiplier {
            config.retry_multiplier = v;
        }
        if let Some(v) = synthesis.retry_max_delay_ms {
            config.retry_max_delay_ms = v;
        }
        if let Some(v) = synthesis.retry_jitter_factor {
            config.retry_jitter_factor = v;
        }
        if let Some(v) = synthesis.engine_timeout_seconds {
            config.engine_timeout_seconds = v;
        }
    }

    if let Some(audio) = yaml.audio {
        if let Some(v) = audio.inter_chunk_gap_ms {
            config.inter_chunk_gap_ms = v;
        }
        if let Some(v) = audio.lead_in_ms {
            config.lead_in_ms = v;
        }
        if let Some(v) = audio.tail_ms {
            config.tail_ms = v;
        }
        if audio.sample_rate.is_some() {
            config.sample_rate = audio.sample_rate;
        }
        if audio.channels.is_some() {
            config.channels = audio.channels;
        }
    }

    if let Some(voices) = yaml.voices {
        if let Some(v) = voices.default {
            config.default_voice = v;
        }
        if let Some(speakers) = voices.speakers {
            config.voices = speakers;
        }
    }

    if let Some(engine) = yaml.engine {
        if let Some(v) = engine.kind {
            config.engine.kind = v;
        }
        if engine.program.is_some() {
            config.engine.program = engine.program;
        }
        if let Some(v) = engine.args {
            config.engine.args = v;
        }
        if engine.url.is_some() {
            config.engine.url = engine.url;
        }
        if let Some(v) = engine.config {
            config.engine_config = v;
        }
    }

    if let Some(cache) = yaml.cache {
        if let Some(v) = cache.enabled {
            config.cache_enabled = v;
        }
        if let Some(v) = cache.path {
            config.cache_path = PathBuf::from(v);
        }
    }

    if let Some(output) = yaml.output {
        if let Some(v) = output.staging_dir {
            config.staging_dir = PathBuf::from(v);
        }
        if let Some(v) = output.report_path {
            config.report_path = Some(PathBuf::from(v));
        }
    }

    Ok(config)
}
