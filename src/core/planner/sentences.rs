//! Sentence boundary detection.
//!
//! A boundary is a run of terminal punctuation (`.`, `!`, `?`, `…`) followed by
//! optional closing quotes or brackets, then whitespace or the end of the text.
//! A lone period after a known abbreviation is not a boundary.

use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;

static SENTENCE_END_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"[.!?…]+["'”’)\]]*(?:\s+|$)"#).expect("valid sentence boundary regex")
});

const ABBREVIATIONS: &[&str] = &[
    "mr.", "mrs.", "ms.", "dr.", "st.", "jr.", "sr.", "vs.", "e.g.", "i.e.", "etc.",
];

/// Sentences of one region of text
#[derive(Debug, Clone, Default)]
pub struct SentenceSplit {
    /// Trimmed sentence byte ranges in the original text, in order
    pub sentences: Vec<Range<usize>>,
    /// Whether at least one terminal punctuation boundary was found
    pub has_boundary: bool,
}

/// Split `text[region]` into sentences.
///
/// Returned ranges index into `text` (not into the region) and are trimmed of
/// surrounding whitespace. Trailing text without terminal punctuation becomes
/// the final sentence.
pub fn split_sentences(text: &str, region: Range<usize>) -> SentenceSplit {
    let slice = &text[region.clone()];
    let base = region.start;
    let mut split = SentenceSplit::default();
    let mut sentence_start = 0;

    for m in SENTENCE_END_RE.find_iter(slice) {
        let punct_end = m.start() + m.as_str().trim_end().len();
        if is_abbreviation(&slice[..m.start()], &slice[m.start()..punct_end]) {
            continue;
        }
        split.has_boundary = true;
        push_trimmed(&mut split.sentences, slice, base, sentence_start..punct_end);
        sentence_start = m.end();
    }
    push_trimmed(&mut split.sentences, slice, base, sentence_start..slice.len());
    split
}

fn is_abbreviation(before: &str, punct: &str) -> bool {
    if punct != "." {
        return false;
    }
    let word = before
        .rsplit(|c: char| c.is_whitespace())
        .next()
        .unwrap_or_default()
        .trim_start_matches(['"', '\'', '(', '“', '‘']);
    if word.is_empty() {
        return false;
    }
    let candidate = format!("{}.", word.to_lowercase());
    ABBREVIATIONS.contains(&candidate.as_str())
}

fn push_trimmed(out: &mut Vec<Range<usize>>, slice: &str, base: usize, range: Range<usize>) {
    let piece = &slice[range.clone()];
    let trimmed_start = piece.len() - piece.trim_start().len();
    let trimmed = piece.trim();
    if trimmed.is_empty() {
        return;
    }
    let start = base + range.start + trimmed_start;
    out.push(start..start + trimmed.len());
}
