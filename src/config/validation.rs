use super::NarratorConfig;

pub(super) fn validate_limits(config: &NarratorConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.max_chars_per_chunk == 0 {
        return Err("max_chars_per_chunk must be greater than 0".into());
    }
    if config.max_sentences_per_chunk == 0 {
        return Err("max_sentences_per_chunk must be greater than 0".into());
    }
    if config.concurrency == 0 {
        return Err("concurrency must be at least 1".into());
    }
    Ok(())
}

pub(super) fn validate_retry(config: &NarratorConfig) -> Result<(), Box<dyn std::error::Error>> {
    if !config.retry_multiplier.is_finite() || config.retry_multiplier < 1.0 {
        return Err(format!(
            "retry_multiplier must be a finite number >= 1.0, got {}",
            config.retry_multiplier
        )
        .into());
    }
    if !(0.0..=1.0).contains(&config.retry_jitter_factor) {
        return Err(format!(
            "retry_jitter_factor must be between 0.0 and 1.0, got {}",
            config.retry_jitter_factor
        )
        .into());
    }
    if config.retry_max_delay_ms < config.retry_base_delay_ms {
        return Err(format!(
            "retry_max_delay_ms ({}) must not be below retry_base_delay_ms ({})",
            config.retry_max_delay_ms, config.retry_base_delay_ms
        )
        .into());
    }
    Ok(())
}

pub(super) fn validate_audio(config: &NarratorConfig) -> Result<(), Box<dyn std::error::Error>> {
    if config.sample_rate == Some(0) {
        return Err("sample_rate must be greater than 0".into());
    }
    if config.channels == Some(0) {
        return Err("channels must be greater than 0".into());
    }
    Ok(())
}

pub(super) fn validate_engine(config: &NarratorConfig) -> Result<(), Box<dyn std::error::Error>> {
    match config.engine.kind.to_lowercase().as_str() {
        "command" | "subprocess" => {
            if config.engine.program.as_deref().is_none_or(|p| p.trim().is_empty()) {
                return Err("engine.program is required when engine.kind is command".into());
            }
        }
        "http" => {
            if config.engine.url.as_deref().is_none_or(|u| u.trim().is_empty()) {
                return Err("engine.url is required when engine.kind is http".into());
            }
        }
        other => {
            return Err(format!("Unsupported engine kind: {other}. Supported kinds: command, http").into());
        }
    }
    if config.default_voice.trim().is_empty() {
        return Err("default_voice must not be empty".into());
    }
    Ok(())
}
