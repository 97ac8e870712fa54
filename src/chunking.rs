//! Whole-vs-split submission policy and the ffmpeg segment split.

use crate::error::TranscriptionError;
use crate::media;
use crate::qwen::is_file_job_model;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use tracing::info;

/// Largest file submitted inline as a single request. Base64 inflates the
/// payload by ~4/3, so this keeps inline requests under typical
/// request-size limits.
pub const INLINE_SAFE_BYTES: u64 = 7_000_000;

/// Fixed segment length for split submission.
pub const CHUNK_SECONDS: u32 = 120;

/// How an audio file is submitted for transcription.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPlan {
    /// Whole file through the job-based call path; size is irrelevant there.
    FileJob,
    /// Whole file inline in one multimodal request.
    InlineWhole,
    /// Fixed-duration segments, transcribed sequentially.
    Split,
}

/// Decide how to submit `model`'s input given the file's byte size.
pub fn plan(model: &str, file_size: u64) -> ChunkPlan {
    if is_file_job_model(model) {
        ChunkPlan::FileJob
    } else if file_size <= INLINE_SAFE_BYTES {
        ChunkPlan::InlineWhole
    } else {
        ChunkPlan::Split
    }
}

/// Split audio into fixed 120-second mono 16 kHz segments under
/// `chunk_dir`, named `chunk_NNN.mp3` so ordering is recoverable by name
/// sort. Each segment gets independent timestamps.
pub async fn split_audio(
    audio_path: &Path,
    chunk_dir: &Path,
) -> Result<Vec<PathBuf>, TranscriptionError> {
    let ffmpeg = media::resolve_ffmpeg()
        .await
        .ok_or(TranscriptionError::FfmpegMissing)?;
    fs::create_dir_all(chunk_dir).await?;

    let output_template = chunk_dir.join("chunk_%03d.mp3");
    let status = Command::new(&ffmpeg)
        .arg("-y")
        .arg("-i")
        .arg(audio_path)
        .args(["-ac", "1", "-ar", "16000", "-b:a", "64k"])
        .args(["-f", "segment", "-segment_time"])
        .arg(CHUNK_SECONDS.to_string())
        .args(["-reset_timestamps", "1"])
        .arg(&output_template)
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .await?;

    if !status.success() {
        return Err(TranscriptionError::SplitFailed(format!(
            "ffmpeg exited with {status}"
        )));
    }

    let chunks = collect_chunks(chunk_dir).await?;
    if chunks.is_empty() {
        return Err(TranscriptionError::NoChunks);
    }

    info!("✂️ Split {} into {} chunks", audio_path.display(), chunks.len());
    Ok(chunks)
}

/// Collect chunk files from a directory, ordered by name.
pub async fn collect_chunks(chunk_dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let mut chunks = Vec::new();
    let mut entries = fs::read_dir(chunk_dir).await?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.starts_with("chunk_") && name.ends_with(".mp3") {
            chunks.push(entry.path());
        }
    }
    chunks.sort();
    Ok(chunks)
}
