//! Content fingerprinting helpers.
//!
//! All fingerprints in the crate are xxh3-128 digests rendered as 32 lowercase
//! hex characters. xxh3 is seedless here, so a digest depends only on the
//! input bytes and is stable across processes, platforms and runs.

use xxhash_rust::xxh3::xxh3_128;

/// Hash arbitrary bytes and render the digest as 32 hex characters.
pub fn xxh3_hex(bytes: &[u8]) -> String {
    let hash = xxh3_128(bytes);
    format!("{hash:032x}")
}

/// Fingerprint of a chunk's text alone.
pub fn content_hash(text: &str) -> String {
    xxh3_hex(text.as_bytes())
}
