//! WAV sanity checks shared by the executor and the caches.

use std::path::{Path, PathBuf};

use hound::WavReader;

/// Frame count of the WAV at `path`.
///
/// Fails when the file cannot be parsed as WAV or holds no frames. Only the
/// header is read, so this is cheap even for long chunks.
pub fn wav_frame_count(path: &Path) -> Result<u64, String> {
    let reader = WavReader::open(path).map_err(|e| format!("{}: {e}", path.display()))?;
    match u64::from(reader.duration()) {
        0 => Err(format!("{}: no audio frames", path.display())),
        frames => Ok(frames),
    }
}

/// [`wav_frame_count`] on the blocking pool
pub async fn check_wav(path: PathBuf) -> Result<u64, String> {
    tokio::task::spawn_blocking(move || wav_frame_count(&path))
        .await
        .map_err(|e| format!("audio check did not complete: {e}"))?
}
