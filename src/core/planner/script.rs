//! Script parsing
//!
//! A script is plain text with optional inline speaker markers of the form
//! `[speaker: host]`. Markers are stripped from the text handed to the planner
//! and turned into [`SpeakerSegment`]s, byte ranges into the stripped text that
//! tile it from start to end.
//!
//! ```text
//! [speaker: host] Welcome back. [speaker: guest] Thanks for having me.
//! ```

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

static SPEAKER_MARKER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\[speaker:\s*([A-Za-z0-9_.\-]+)\s*\]").expect("valid speaker marker regex")
});

/// One speaker turn, as a byte range into the marker-stripped script text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpeakerSegment {
    /// Speaker identifier from the marker, `None` for text before any marker
    pub speaker_id: Option<String>,
    /// Inclusive start byte offset
    pub start: usize,
    /// Exclusive end byte offset
    pub end: usize,
}

impl SpeakerSegment {
    pub fn new(speaker_id: Option<String>, start: usize, end: usize) -> Self {
        Self {
            speaker_id,
            start,
            end,
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }
}

/// Parsed narration script
///
/// Immutable once built: the raw input is kept alongside the stripped text so
/// reports can refer back to what was received.
#[derive(Debug, Clone)]
pub struct Script {
    raw: String,
    text: String,
    segments: Vec<SpeakerSegment>,
}

impl Script {
    /// Parse a raw script, extracting speaker markers
    pub fn parse(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let mut text = String::with_capacity(raw.len());
        let mut segments: Vec<SpeakerSegment> = Vec::new();
        let mut current_speaker: Option<String> = None;
        let mut segment_start = 0;
        let mut cursor = 0;

        for caps in SPEAKER_MARKER_RE.captures_iter(&raw) {
            let Some(marker) = caps.get(0) else {
                continue;
            };
            text.push_str(&raw[cursor..marker.start()]);
            if text.len() > segment_start {
                segments.push(SpeakerSegment::new(
                    current_speaker.take(),
                    segment_start,
                    text.len(),
                ));
                segment_start = text.len();
            }
            current_speaker = caps.get(1).map(|m| m.as_str().to_string());
            cursor = marker.end();
        }
        text.push_str(&raw[cursor..]);
        if text.len() > segment_start {
            segments.push(SpeakerSegment::new(current_speaker, segment_start, text.len()));
        }

        let segments = normalize_segments(&text, segments);
        Self {
            raw,
            text,
            segments,
        }
    }

    /// The original input, markers included
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Marker-stripped text handed to the planner
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn segments(&self) -> &[SpeakerSegment] {
        &self.segments
    }

    /// Distinct speaker ids in order of first appearance
    pub fn speakers(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for id in self.segments.iter().filter_map(|s| s.speaker_id.as_deref()) {
            if !seen.contains(&id) {
                seen.push(id);
            }
        }
        seen
    }
}

/// Fold whitespace-only segments into their neighbours and merge adjacent
/// segments that belong to the same speaker.
fn normalize_segments(text: &str, segments: Vec<SpeakerSegment>) -> Vec<SpeakerSegment> {
    let mut out: Vec<SpeakerSegment> = Vec::with_capacity(segments.len());
    let mut pending_start: Option<usize> = None;

    for mut segment in segments {
        let blank = text[segment.range()].trim().is_empty();
        if blank {
            match out.last_mut() {
                Some(prev) => prev.end = segment.end,
                None => {
                    pending_start.get_or_insert(segment.start);
                }
            }
            continue;
        }
        if let Some(start) = pending_start.take() {
            segment.start = start;
        }
        match out.last_mut() {
            Some(prev) if prev.speaker_id == segment.speaker_id => prev.end = segment.end,
            _ => out.push(segment),
        }
    }

    // Whole text was blank: keep a single unattributed segment so the ranges still tile.
    if out.is_empty() && !text.is_empty() {
        out.push(SpeakerSegment::new(None, 0, text.len()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn segment_texts(script: &Script) -> Vec<(Option<&str>, &str)> {
        script
            .segments()
            .iter()
            .map(|s| (s.speaker_id.as_deref(), script.text()[s.range()].trim()))
            .collect()
    }

    #[test]
    fn test_parse_without_markers() {
        let script = Script::parse("Hello there. General Kenobi.");
        assert_eq!(script.text(), "Hello there. General Kenobi.");
        assert_eq!(script.segments().len(), 1);
        assert_eq!(script.segments()[0].speaker_id, None);
        assert!(script.speakers().is_empty());
    }

    #[test]
    fn test_parse_strips_markers() {
        let script = Script::parse("[speaker: host] Welcome back. [speaker: guest] Thanks!");
        assert!(!script.text().contains("[speaker"));
        assert_eq!(
            segment_texts(&script),
            vec![(Some("host"), "Welcome back."), (Some("guest"), "Thanks!")]
        );
        assert_eq!(script.speakers(), vec!["host", "guest"]);
    }

    #[test]
    fn test_parse_leading_text_has_no_speaker() {
        let script = Script::parse("Intro line. [Speaker: Narrator] Chapter one.");
        assert_eq!(
            segment_texts(&script),
            vec![(None, "Intro line."), (Some("Narrator"), "Chapter one.")]
        );
    }

    #[test]
    fn test_parse_merges_repeated_speaker() {
        let script =
            Script::parse("[speaker: a] One. [speaker: a] Two. [speaker: b] Three.");
        assert_eq!(
            segment_texts(&script),
            vec![(Some("a"), "One.  Two."), (Some("b"), "Three.")]
        );
    }

    #[test]
    fn test_parse_drops_empty_turns() {
        let script = Script::parse("[speaker: a] One. [speaker: b]  [speaker: a] Two.");
        assert_eq!(script.segments().len(), 1);
        assert_eq!(script.segments()[0].speaker_id.as_deref(), Some("a"));
    }

    #[test]
    fn test_segments_tile_text() {
        let script = Script::parse("  [speaker: x] A.\n\n[speaker: y] B. [speaker: x] C.  ");
        let segments = script.segments();
        assert_eq!(segments.first().map(|s| s.start), Some(0));
        assert_eq!(segments.last().map(|s| s.end), Some(script.text().len()));
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end, pair[1].start);
        }
    }
}
