//! Audio acquisition: URL-keyed reuse of prior downloads, falling back to a
//! fresh yt-dlp fetch transcoded to a single audio file.

use crate::error::DownloadError;
use crate::media;
use crate::store::{SessionStore, SessionUpdate};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Source of local audio artifacts for the download stage.
#[async_trait]
pub trait AudioSource: Send + Sync {
    /// Resolve a local audio file for the session's URL, setting the
    /// session title when discoverable.
    async fn acquire(
        &self,
        store: &SessionStore,
        session_id: u64,
        url: &str,
    ) -> Result<PathBuf, DownloadError>;
}

/// Cache-first acquisition backed by yt-dlp.
pub struct AudioAcquisition {
    audio_dir: PathBuf,
}

impl AudioAcquisition {
    pub fn new(audio_dir: PathBuf) -> Self {
        Self { audio_dir }
    }

    /// Copy the most recent other session's artifact for an identical URL.
    /// Any file-system failure falls through to a fresh download.
    async fn reuse_cached(
        &self,
        store: &SessionStore,
        session_id: u64,
        url: &str,
    ) -> Option<PathBuf> {
        let owner = store.find_latest_audio_cache_owner(url).await?;
        if owner == session_id {
            return None;
        }

        let source = latest_artifact(&self.audio_dir, owner).await?;
        let extension = source.extension()?.to_string_lossy().into_owned();
        let destination = self.audio_dir.join(format!("{session_id}.{extension}"));

        if let Err(e) = fs::copy(&source, &destination).await {
            warn!(
                "Audio cache hit for session {} unusable ({}), downloading fresh",
                owner, e
            );
            return None;
        }

        if let Some(title) = store.get(owner).await.and_then(|session| session.title) {
            let _ = store
                .update(
                    session_id,
                    SessionUpdate {
                        title: Some(title),
                        ..Default::default()
                    },
                )
                .await;
        }

        info!("♻️ Reused cached audio of session {} for session {}", owner, session_id);
        Some(destination)
    }

    async fn download_fresh(
        &self,
        store: &SessionStore,
        session_id: u64,
        url: &str,
    ) -> Result<PathBuf, DownloadError> {
        let ytdlp = media::resolve_ytdlp()
            .await
            .ok_or(DownloadError::ToolMissing)?;
        fs::create_dir_all(&self.audio_dir).await?;

        let output_template = self.audio_dir.join(format!("{session_id}.%(ext)s"));

        let mut command = Command::new(&ytdlp);
        command
            .args(["-f", "bestaudio/best", "--no-playlist"])
            .args(["-x", "--audio-format", "mp3", "--audio-quality", "192K"])
            .args(["--no-warnings", "--print-json"])
            .arg("-o")
            .arg(&output_template)
            .arg(url);
        if let Some(ffmpeg) = media::resolve_ffmpeg().await {
            command.arg("--ffmpeg-location").arg(ffmpeg);
        }

        info!("⬇️ Downloading audio for session {}", session_id);
        let output = command.output().await?;
        if !output.status.success() {
            return Err(DownloadError::ToolFailed {
                status: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        if let Some(title) = parse_title(&output.stdout) {
            debug!("Resolved title for session {}: {}", session_id, title);
            let _ = store
                .update(
                    session_id,
                    SessionUpdate {
                        title: Some(title),
                        ..Default::default()
                    },
                )
                .await;
        }

        latest_artifact(&self.audio_dir, session_id)
            .await
            .ok_or(DownloadError::NoArtifact)
    }
}

#[async_trait]
impl AudioSource for AudioAcquisition {
    async fn acquire(
        &self,
        store: &SessionStore,
        session_id: u64,
        url: &str,
    ) -> Result<PathBuf, DownloadError> {
        if let Some(path) = self.reuse_cached(store, session_id, url).await {
            return Ok(path);
        }
        self.download_fresh(store, session_id, url).await
    }
}

/// Most recently modified `{id}.*` file in the audio directory.
async fn latest_artifact(audio_dir: &Path, id: u64) -> Option<PathBuf> {
    let prefix = format!("{id}.");
    let mut best: Option<(std::time::SystemTime, PathBuf)> = None;

    let mut entries = fs::read_dir(audio_dir).await.ok()?;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let name = entry.file_name().to_string_lossy().into_owned();
        if !name.starts_with(&prefix) {
            continue;
        }
        let Ok(metadata) = entry.metadata().await else { continue };
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata
            .modified()
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        if best.as_ref().map_or(true, |(time, _)| modified > *time) {
            best = Some((modified, entry.path()));
        }
    }

    best.map(|(_, path)| path)
}

/// The tool prints one JSON document describing the download; pull the
/// video title out of it.
fn parse_title(stdout: &[u8]) -> Option<String> {
    let text = String::from_utf8_lossy(stdout);
    text.lines().rev().find_map(|line| {
        let value: Value = serde_json::from_str(line.trim()).ok()?;
        value
            .get("title")
            .and_then(Value::as_str)
            .map(str::to_string)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_title_from_json_line() {
        let stdout = b"{\"id\": \"abc\", \"title\": \"How Compilers Work\", \"ext\": \"mp3\"}\n";
        assert_eq!(parse_title(stdout), Some("How Compilers Work".to_string()));
    }

    #[test]
    fn test_parse_title_ignores_noise() {
        let stdout = b"some progress line\nnot json either\n";
        assert_eq!(parse_title(stdout), None);
    }

    #[tokio::test]
    async fn test_latest_artifact_matches_exact_id() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("1.mp3"), b"one").await.unwrap();
        tokio::fs::write(dir.path().join("12.mp3"), b"twelve").await.unwrap();

        let found = latest_artifact(dir.path(), 1).await.unwrap();
        assert_eq!(found.file_name().unwrap(), "1.mp3");
    }
}
