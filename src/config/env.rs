use std::collections::BTreeMap;
use std::env;
use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use super::NarratorConfig;

/// Read and parse one variable; unset and empty both mean "not configured"
pub(super) fn parse_env<T>(name: &str) -> Result<Option<T>, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(value) if value.trim().is_empty() => Ok(None),
        Ok(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| format!("Invalid value for {name}: {e}").into()),
        Err(_) => Ok(None),
    }
}

pub(super) fn parse_bool_env(name: &str) -> Result<Option<bool>, Box<dyn std::error::Error>> {
    let Some(value) = parse_env::<String>(name)? else {
        return Ok(None);
    };
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(Some(true)),
        "0" | "false" | "no" | "off" => Ok(Some(false)),
        other => Err(format!("Invalid boolean for {name}: {other}").into()),
    }
}

fn parse_json_map_env(
    name: &str,
) -> Result<Option<BTreeMap<String, String>>, Box<dyn std::error::Error>> {
    let Some(raw) = parse_env::<String>(name)? else {
        return Ok(None);
    };
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|e| format!("Invalid JSON object for {name}: {e}").into())
}

/// Build a configuration from `NARRATOR_*` environment variables over defaults
pub(super) fn load_from_env() -> Result<NarratorConfig, Box<dyn std::error::Error>> {
    let mut config = NarratorConfig::default();

    if let Some(v) = parse_env("NARRATOR_MAX_CHARS_PER_CHUNK")? {
        config.max_chars_per_chunk = v;
    }
    if let Some(v) = parse_env("NARRATOR_MAX_SENTENCES_PER_CHUNK")? {
        config.max_sentences_per_chunk = v;
    }

    if let Some(v) = parse_env("NARRATOR_CONCURRENCY")? {
        config.concurrency = v;
    }
    if let Some(v) = parse_env("NARRATOR_RETRY_ATTEMPTS")? {
        config.retry_attempts = v;
    }
    if let Some(v) = parse_env("NARRATOR_RETRY_BASE_DELAY_MS")? {
        config.retry_base_delay_ms = v;
    }
    if let Some(v) = parse_env("NARRATOR_RETRY_MULTIPLIER")? {
        config.retry_multiplier = v;
    }
    if let Some(v) = parse_env("NARRATOR_RETRY_MAX_DELAY_MS")? {
        config.retry_max_delay_ms = v;
    }
    if let Some(v) = parse_env("NARRATOR_RETRY_JITTER_FACTOR")? {
        config.retry_jitter_factor = v;
    }
    if let Some(v) = parse_env("NARRATOR_ENGINE_TIMEOUT_SECONDS")? {
        config.engine_timeout_seconds = v;
    }

    if let Some(v) = parse_env("NARRATOR_INTER_CHUNK_GAP_MS")? {
        config.inter_chunk_gap_ms = v;
    }
    if let Some(v) = parse_env("NARRATOR_LEAD_IN_MS")? {
        config.lead_in_ms = v;
    }
    if let Some(v) = parse_env("NARRATOR_TAIL_MS")? {
        config.tail_ms = v;
    }
    if let Some(v) = parse_env("NARRATOR_SAMPLE_RATE")? {
        config.sample_rate = Some(v);
    }
    if let Some(v) = parse_env("NARRATOR_CHANNELS")? {
        config.channels = Some(v);
    }

    if let Some(v) = parse_env("NARRATOR_DEFAULT_VOICE")? {
        config.default_voice = v;
    }
    if let Some(voices) = parse_json_map_env("NARRATOR_VOICES_JSON")? {
        config.voices = voices;
    }

    if let Some(v) = parse_env("NARRATOR_ENGINE_KIND")? {
        config.engine.kind = v;
    }
    if let Some(v) = parse_env::<String>("NARRATOR_ENGINE_PROGRAM")? {
        config.engine.program = Some(v);
    }
    if let Some(v) = parse_env::<String>("NARRATOR_ENGINE_ARGS")? {
        config.engine.args = v.split_whitespace().map(str::to_string).collect();
    }
    if let Some(v) = parse_env::<String>("NARRATOR_ENGINE_URL")? {
        config.engine.url = Some(v);
    }
    if let Some(engine_config) = parse_json_map_env("NARRATOR_ENGINE_CONFIG_JSON")? {
        config.engine_config = engine_config;
    }

    if let Some(v) = parse_bool_env("NARRATOR_CACHE_ENABLED")? {
        config.cache_enabled = v;
    }
    if let Some(v) = parse_env::<PathBuf>("NARRATOR_CACHE_PATH")? {
        config.cache_path = v;
    }
    if let Some(v) = parse_env::<PathBuf>("NARRATOR_STAGING_DIR")? {
        config.staging_dir = v;
    }
    if let Some(v) = parse_env::<PathBuf>("NARRATOR_REPORT_PATH")? {
        config.report_path = Some(v);
    }

    Ok(config)
}
