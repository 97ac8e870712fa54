//! The session pipeline: download → transcribe → note, with every outcome
//! persisted to the session store before the next stage starts.

use crate::config::CredentialStore;
use crate::download::{AudioAcquisition, AudioSource};
use crate::prompt::build_note_prompt;
use crate::qwen::{QwenClient, SpeechService};
use crate::store::{SessionStatus, SessionStore, SessionUpdate, Stage};
use crate::transcribe::TranscriptionRunner;
use tracing::{error, info, warn};

/// Instruction given to the transcription models.
pub const TRANSCRIBE_PROMPT: &str =
    "Transcribe the audio to Simplified Chinese. Output plain text only.";

/// Drives one session through the three-stage state machine. Exactly one
/// run per session; a failed session is terminal and only ever recreated.
pub struct SessionPipeline {
    store: SessionStore,
    credentials: CredentialStore,
    base_url: String,
}

impl SessionPipeline {
    pub fn new(store: SessionStore, credentials: CredentialStore, base_url: String) -> Self {
        Self {
            store,
            credentials,
            base_url,
        }
    }

    /// Run the full pipeline for a session. All outcomes are side effects
    /// on the session store; the caller never observes an error.
    pub async fn run(&self, session_id: u64) {
        let Some(credentials) = self.credentials.load().await else {
            warn!("Session {} rejected: no API key configured", session_id);
            let _ = self
                .store
                .update(
                    session_id,
                    SessionUpdate {
                        status: Some(SessionStatus::Failed),
                        stage: Some(Stage::Download),
                        error: Some("missing api key".to_string()),
                        ..Default::default()
                    },
                )
                .await;
            let _ = self
                .store
                .update_step(
                    session_id,
                    Stage::Download,
                    SessionStatus::Failed,
                    Some("missing api key"),
                )
                .await;
            return;
        };

        let client = match QwenClient::new(&credentials.api_key, &self.base_url) {
            Ok(client) => client,
            Err(e) => {
                self.fail_stage(session_id, Stage::Download, &e.to_string())
                    .await;
                return;
            }
        };
        let downloader = AudioAcquisition::new(self.store.audio_dir().to_path_buf());

        self.run_with(
            session_id,
            &downloader,
            &client,
            &credentials.audio_model,
            &credentials.text_model,
        )
        .await;
    }

    /// Pipeline body with the external collaborators injected.
    pub async fn run_with<D: AudioSource, S: SpeechService>(
        &self,
        session_id: u64,
        downloader: &D,
        service: &S,
        audio_model: &str,
        text_model: &str,
    ) {
        let Some(session) = self.store.get(session_id).await else {
            warn!("Session {} disappeared before its run started", session_id);
            return;
        };

        // download
        self.enter_stage(session_id, Stage::Download, Some(SessionStatus::Running))
            .await;
        let audio_path = match downloader.acquire(&self.store, session_id, &session.url).await {
            Ok(path) => {
                let _ = self
                    .store
                    .update_step(session_id, Stage::Download, SessionStatus::Completed, None)
                    .await;
                path
            }
            Err(err) => {
                self.fail_stage(session_id, Stage::Download, &err.to_string())
                    .await;
                return;
            }
        };

        // transcribe
        self.enter_stage(session_id, Stage::Transcribe, None).await;
        let runner = TranscriptionRunner::new(service, &self.store);
        let transcript = match runner
            .transcribe(session_id, audio_model, &audio_path, TRANSCRIBE_PROMPT)
            .await
        {
            Ok(transcript) => {
                let _ = self
                    .store
                    .update(
                        session_id,
                        SessionUpdate {
                            transcript: Some(transcript.clone()),
                            ..Default::default()
                        },
                    )
                    .await;
                let _ = self
                    .store
                    .update_step(session_id, Stage::Transcribe, SessionStatus::Completed, None)
                    .await;
                transcript
            }
            Err(err) => {
                self.fail_stage(session_id, Stage::Transcribe, &err.to_string())
                    .await;
                return;
            }
        };

        // note
        self.enter_stage(session_id, Stage::Note, None).await;
        let note_prompt = build_note_prompt(
            &transcript,
            session.style.as_deref(),
            session.remark.as_deref(),
            session.include_joke,
        );
        match service.generate_text(text_model, &note_prompt).await {
            Ok(note) => {
                let _ = self
                    .store
                    .update(
                        session_id,
                        SessionUpdate {
                            note: Some(note),
                            status: Some(SessionStatus::Completed),
                            ..Default::default()
                        },
                    )
                    .await;
                let _ = self
                    .store
                    .update_step(session_id, Stage::Note, SessionStatus::Completed, None)
                    .await;
                info!("✅ Session {} completed", session_id);
            }
            Err(err) => {
                self.fail_stage(session_id, Stage::Note, &err.to_string())
                    .await;
            }
        }
    }

    async fn enter_stage(&self, session_id: u64, stage: Stage, status: Option<SessionStatus>) {
        let _ = self
            .store
            .update(
                session_id,
                SessionUpdate {
                    status,
                    stage: Some(stage),
                    ..Default::default()
                },
            )
            .await;
        let _ = self
            .store
            .update_step(session_id, stage, SessionStatus::Running, None)
            .await;
    }

    async fn fail_stage(&self, session_id: u64, stage: Stage, cause: &str) {
        let message = format!("{stage} failed: {cause}");
        error!("❌ Session {}: {}", session_id, message);
        let _ = self
            .store
            .update(
                session_id,
                SessionUpdate {
                    status: Some(SessionStatus::Failed),
                    stage: Some(stage),
                    error: Some(message.clone()),
                    ..Default::default()
                },
            )
            .await;
        let _ = self
            .store
            .update_step(session_id, stage, SessionStatus::Failed, Some(&message))
            .await;
    }
}
