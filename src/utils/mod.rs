pub mod audio;
pub mod hashing;

pub use audio::{check_wav, wav_frame_count};
pub use hashing::{content_hash, xxh3_hex};
