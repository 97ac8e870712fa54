//! Transcription orchestration for one session: submission planning, the
//! sequential chunk loop with progress messages, and the single
//! fallback-model retry for file-job failures.

use crate::chunking::{self, ChunkPlan};
use crate::error::TranscriptionError;
use crate::qwen::{SpeechService, FALLBACK_AUDIO_MODEL, NO_AUDIO_FRAGMENT_SIGNATURE};
use crate::store::{SessionStatus, SessionStore, Stage};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, warn};

/// Runs the transcribe stage against a [`SpeechService`], persisting
/// progress through the session store.
pub struct TranscriptionRunner<'a, S: SpeechService> {
    service: &'a S,
    store: &'a SessionStore,
}

impl<'a, S: SpeechService> TranscriptionRunner<'a, S> {
    pub fn new(service: &'a S, store: &'a SessionStore) -> Self {
        Self { service, store }
    }

    /// Transcribe the session's audio with `model`. Fails with
    /// [`TranscriptionError::EmptyTranscript`] when nothing usable came
    /// back on any path.
    pub async fn transcribe(
        &self,
        session_id: u64,
        model: &str,
        audio_path: &Path,
        prompt: &str,
    ) -> Result<String, TranscriptionError> {
        let file_size = fs::metadata(audio_path).await?.len();

        let transcript = match chunking::plan(model, file_size) {
            ChunkPlan::FileJob => {
                self.file_job_with_fallback(session_id, model, audio_path)
                    .await?
            }
            ChunkPlan::InlineWhole => {
                self.service
                    .transcribe_inline(model, audio_path, prompt)
                    .await?
            }
            ChunkPlan::Split => {
                let chunk_dir = audio_path
                    .parent()
                    .unwrap_or_else(|| Path::new("."))
                    .join(format!("{session_id}_chunks"));
                let chunks = chunking::split_audio(audio_path, &chunk_dir).await?;
                self.transcribe_chunks(session_id, model, &chunks, prompt)
                    .await?
            }
        };

        if transcript.trim().is_empty() {
            return Err(TranscriptionError::EmptyTranscript);
        }
        Ok(transcript)
    }

    /// Transcribe chunks strictly in order, updating the step message to
    /// `chunk i/total` before each one. The result is the newline join of
    /// each chunk's trimmed, non-empty transcript.
    pub async fn transcribe_chunks(
        &self,
        session_id: u64,
        model: &str,
        chunks: &[PathBuf],
        prompt: &str,
    ) -> Result<String, TranscriptionError> {
        let total = chunks.len();
        let mut parts = Vec::with_capacity(total);

        for (index, chunk) in chunks.iter().enumerate() {
            let message = format!("chunk {}/{}", index + 1, total);
            if let Err(e) = self
                .store
                .update_step(
                    session_id,
                    Stage::Transcribe,
                    SessionStatus::Running,
                    Some(&message),
                )
                .await
            {
                warn!("Failed to persist progress for session {}: {}", session_id, e);
            }

            parts.push(self.service.transcribe_inline(model, chunk, prompt).await?);
        }

        let joined = parts
            .iter()
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join("\n");
        Ok(joined)
    }

    /// One file-job attempt, retried exactly once with the fallback model
    /// when the service reports no usable audio fragment.
    async fn file_job_with_fallback(
        &self,
        session_id: u64,
        model: &str,
        audio_path: &Path,
    ) -> Result<String, TranscriptionError> {
        match self.service.transcribe_file_job(model, audio_path).await {
            Ok(text) => Ok(text),
            Err(err) if is_no_audio_fragment(&err) => {
                info!(
                    "Model {} found no usable audio for session {}, retrying with {}",
                    model, session_id, FALLBACK_AUDIO_MODEL
                );
                let message = format!("fallback to {FALLBACK_AUDIO_MODEL}");
                if let Err(e) = self
                    .store
                    .update_step(
                        session_id,
                        Stage::Transcribe,
                        SessionStatus::Running,
                        Some(&message),
                    )
                    .await
                {
                    warn!("Failed to persist fallback note for session {}: {}", session_id, e);
                }
                self.service
                    .transcribe_file_job(FALLBACK_AUDIO_MODEL, audio_path)
                    .await
            }
            Err(err) => Err(err),
        }
    }
}

/// Whether an error carries the service's no-usable-audio signature.
pub fn is_no_audio_fragment(err: &TranscriptionError) -> bool {
    err.to_string()
        .to_ascii_lowercase()
        .contains(NO_AUDIO_FRAGMENT_SIGNATURE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;

    #[test]
    fn test_no_audio_fragment_signature_matching() {
        let matching = TranscriptionError::Service(ServiceError::Status {
            status: 400,
            body: "InvalidFile: No Valid Audio Fragment detected".to_string(),
        });
        assert!(is_no_audio_fragment(&matching));

        let other = TranscriptionError::Service(ServiceError::Status {
            status: 500,
            body: "internal error".to_string(),
        });
        assert!(!is_no_audio_fragment(&other));
    }
}
