//! Chunk planner
//!
//! Splits a script into an ordered list of bounded [`Chunk`]s, the unit of
//! synthesis. Planning happens once per run, before any engine call, and its
//! output is never re-split or merged afterwards.
//!
//! Rules, in priority order:
//! - A sentence is never split across chunks.
//! - A chunk never spans two speaker turns, so each chunk maps to one voice.
//! - A turn stays in one chunk unless it exceeds `max_chars` or
//!   `max_sentences`; then it is packed greedily at sentence boundaries.
//! - A single sentence longer than `max_chars` is emitted whole, on its own,
//!   and flagged `oversized`.
//!
//! # Example
//!
//! ```rust
//! use narrator::core::planner::{Script, plan};
//!
//! let script = Script::parse("[speaker: host] Hello. Welcome. [speaker: guest] Hi!");
//! let chunks = plan(script.text(), script.segments(), 1000, 8).unwrap();
//! assert_eq!(chunks.len(), 2);
//! assert_eq!(chunks[1].speaker_id.as_deref(), Some("guest"));
//! ```

mod error;
mod script;
mod sentences;

use std::ops::Range;

use serde::Serialize;
use tracing::{debug, warn};

use crate::utils::content_hash;

pub use error::{PlanningError, PlanningResult};
pub use script::{Script, SpeakerSegment};
pub use sentences::{SentenceSplit, split_sentences};

/// A bounded, ordinally-positioned slice of the script
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    /// Position in the script, contiguous from 0; the only ordering key downstream
    pub ordinal: usize,
    /// Text to synthesize (trimmed span of the original script)
    pub text: String,
    /// Speaker of the turn this chunk belongs to
    pub speaker_id: Option<String>,
    /// Number of characters in `text`
    pub char_count: usize,
    /// Number of sentences in `text`
    pub sentence_count: usize,
    /// xxh3-128 fingerprint of `text`
    pub content_hash: String,
    /// Single sentence that alone exceeds the character limit
    pub oversized: bool,
}

/// Plan chunks for `text`, honouring speaker turns and size limits.
///
/// `speaker_segments` must tile `text` (as produced by [`Script::parse`]); an
/// empty slice treats the whole text as one unattributed turn.
pub fn plan(
    text: &str,
    speaker_segments: &[SpeakerSegment],
    max_chars: usize,
    max_sentences: usize,
) -> PlanningResult<Vec<Chunk>> {
    if max_chars == 0 || max_sentences == 0 {
        return Err(PlanningError::InvalidLimits {
            max_chars,
            max_sentences,
        });
    }
    if text.trim().is_empty() {
        return Err(PlanningError::EmptyScript);
    }

    let whole_text;
    let segments = if speaker_segments.is_empty() {
        whole_text = [SpeakerSegment::new(None, 0, text.len())];
        &whole_text[..]
    } else {
        validate_segments(text, speaker_segments)?;
        speaker_segments
    };

    let turns: Vec<(&SpeakerSegment, SentenceSplit)> = segments
        .iter()
        .map(|segment| (segment, split_sentences(text, segment.range())))
        .collect();
    if !turns.iter().any(|(_, split)| split.has_boundary) {
        return Err(PlanningError::NoSentenceBoundary);
    }

    let mut chunks = Vec::new();
    for (segment, split) in &turns {
        for group in pack_turn(text, &split.sentences, max_chars, max_sentences) {
            let ordinal = chunks.len();
            let chunk = build_chunk(text, ordinal, segment, &split.sentences[group], max_chars);
            if chunk.oversized {
                warn!(
                    ordinal,
                    char_count = chunk.char_count,
                    max_chars,
                    "Sentence exceeds max_chars_per_chunk; keeping it whole in its own chunk"
                );
            }
            chunks.push(chunk);
        }
    }

    debug!(
        chunk_count = chunks.len(),
        turn_count = turns.len(),
        "Planned script chunks"
    );
    Ok(chunks)
}

/// Greedily group consecutive sentences of one turn into chunk-sized runs.
///
/// Returns index ranges into `sentences`.
fn pack_turn(
    text: &str,
    sentences: &[Range<usize>],
    max_chars: usize,
    max_sentences: usize,
) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut current: Option<usize> = None;

    for (idx, sentence) in sentences.iter().enumerate() {
        if char_len(&text[sentence.clone()]) > max_chars {
            if let Some(start) = current.take() {
                groups.push(start..idx);
            }
            groups.push(idx..idx + 1);
            continue;
        }
        match current {
            Some(start) => {
                let span = sentences[start].start..sentence.end;
                let fits = char_len(&text[span]) <= max_chars && idx - start < max_sentences;
                if !fits {
                    groups.push(start..idx);
                    current = Some(idx);
                }
            }
            None => current = Some(idx),
        }
    }
    if let Some(start) = current {
        groups.push(start..sentences.len());
    }
    groups
}

fn build_chunk(
    text: &str,
    ordinal: usize,
    segment: &SpeakerSegment,
    sentences: &[Range<usize>],
    max_chars: usize,
) -> Chunk {
    let start = sentences.first().map(|r| r.start).unwrap_or_default();
    let end = sentences.last().map(|r| r.end).unwrap_or(start);
    let chunk_text = text[start..end].to_string();
    let char_count = char_len(&chunk_text);

    Chunk {
        ordinal,
        speaker_id: segment.speaker_id.clone(),
        char_count,
        sentence_count: sentences.len(),
        content_hash: content_hash(&chunk_text),
        oversized: sentences.len() == 1 && char_count > max_chars,
        text: chunk_text,
    }
}

fn validate_segments(text: &str, segments: &[SpeakerSegment]) -> PlanningResult<()> {
    let mut expected_start = 0;
    for segment in segments {
        if segment.start != expected_start {
            return Err(PlanningError::InvalidSegments(format!(
                "segment starts at {} but previous segment ended at {}",
                segment.start, expected_start
            )));
        }
        if segment.end < segment.start || segment.end > text.len() {
            return Err(PlanningError::InvalidSegments(format!(
                "segment range {}..{} is out of bounds for text of {} bytes",
                segment.start,
                segment.end,
                text.len()
            )));
        }
        if !text.is_char_boundary(segment.start) || !text.is_char_boundary(segment.end) {
            return Err(PlanningError::InvalidSegments(format!(
                "segment range {}..{} splits a UTF-8 character",
                segment.start, segment.end
            )));
        }
        expected_start = segment.end;
    }
    if expected_start != text.len() {
        return Err(PlanningError::InvalidSegments(format!(
            "segments end at {} but text is {} bytes",
            expected_start,
            text.len()
        )));
    }
    Ok(())
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}
