use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::xxh3_hex;

/// Bumped whenever the key layout changes so stale entries stop matching.
const KEY_VERSION: &str = "narrator-cache-v1";
/// Leads keys that are also bound to an engine fingerprint
const ENGINE_SCOPED_VERSION: &str = "narrator-cache-v1+engine";

/// Content fingerprint of a synthesis request
///
/// Computed from the chunk text, the voice identifier and the engine
/// configuration, optionally scoped to an engine fingerprint. Never from
/// time, process id or file paths, so the same inputs produce the same key
/// across processes and runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn compute(text: &str, voice_id: &str, engine_config: &BTreeMap<String, String>) -> Self {
        Self::build(None, text, voice_id, engine_config)
    }

    /// Key for audio produced by one particular engine setup. Changing the
    /// engine's program, arguments or endpoint changes every key.
    pub fn compute_for_engine(
        engine: &str,
        text: &str,
        voice_id: &str,
        engine_config: &BTreeMap<String, String>,
    ) -> Self {
        Self::build(Some(engine), text, voice_id, engine_config)
    }

    fn build(
        engine: Option<&str>,
        text: &str,
        voice_id: &str,
        engine_config: &BTreeMap<String, String>,
    ) -> Self {
        let mut buf = Vec::with_capacity(text.len() + voice_id.len() + 64);
        match engine {
            Some(engine) => {
                push_field(&mut buf, ENGINE_SCOPED_VERSION);
                push_field(&mut buf, engine);
            }
            None => push_field(&mut buf, KEY_VERSION),
        }
        push_field(&mut buf, voice_id);
        buf.extend_from_slice(&(engine_config.len() as u64).to_le_bytes());
        // BTreeMap iterates in key order, so insertion order never leaks into the key.
        for (key, value) in engine_config {
            push_field(&mut buf, key);
            push_field(&mut buf, value);
        }
        push_field(&mut buf, text);
        Self(xxh3_hex(&buf))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Length-prefix every field so ("ab", "c") and ("a", "bc") never collide.
fn push_field(buf: &mut Vec<u8>, field: &str) {
    buf.extend_from_slice(&(field.len() as u64).to_le_bytes());
    buf.extend_from_slice(field.as_bytes());
}
