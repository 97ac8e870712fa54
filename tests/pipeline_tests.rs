use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::TempDir;
use tubenote::config::CredentialStore;
use tubenote::download::AudioSource;
use tubenote::error::{DownloadError, NoteGenerationError, ServiceError, TranscriptionError};
use tubenote::pipeline::SessionPipeline;
use tubenote::qwen::SpeechService;
use tubenote::store::{SessionStatus, SessionStore, Stage};

struct StaticAudio {
    path: PathBuf,
}

#[async_trait]
impl AudioSource for StaticAudio {
    async fn acquire(
        &self,
        _store: &SessionStore,
        _session_id: u64,
        _url: &str,
    ) -> Result<PathBuf, DownloadError> {
        Ok(self.path.clone())
    }
}

struct FailingAudio;

#[async_trait]
impl AudioSource for FailingAudio {
    async fn acquire(
        &self,
        _store: &SessionStore,
        _session_id: u64,
        _url: &str,
    ) -> Result<PathBuf, DownloadError> {
        Err(DownloadError::NoArtifact)
    }
}

/// Speech service stub: `None` for a field makes that call fail.
#[derive(Default)]
struct MockService {
    transcript: Option<String>,
    note: Option<String>,
    calls: Mutex<Vec<String>>,
}

#[async_trait]
impl SpeechService for MockService {
    async fn transcribe_inline(
        &self,
        model: &str,
        _audio_path: &Path,
        _prompt: &str,
    ) -> Result<String, TranscriptionError> {
        self.calls.lock().unwrap().push(format!("inline:{model}"));
        match &self.transcript {
            Some(text) => Ok(text.clone()),
            None => Err(TranscriptionError::Service(ServiceError::Status {
                status: 500,
                body: "asr down".to_string(),
            })),
        }
    }

    async fn transcribe_file_job(
        &self,
        model: &str,
        _audio_path: &Path,
    ) -> Result<String, TranscriptionError> {
        self.calls.lock().unwrap().push(format!("file_job:{model}"));
        match &self.transcript {
            Some(text) => Ok(text.clone()),
            None => Err(TranscriptionError::EmptyTranscript),
        }
    }

    async fn generate_text(
        &self,
        model: &str,
        _prompt: &str,
    ) -> Result<String, NoteGenerationError> {
        self.calls.lock().unwrap().push(format!("generate:{model}"));
        match &self.note {
            Some(text) => Ok(text.clone()),
            None => Err(NoteGenerationError::EmptyNote),
        }
    }
}

async fn setup() -> (TempDir, SessionStore, SessionPipeline, PathBuf) {
    let dir = tempfile::tempdir().unwrap();
    let store = SessionStore::open(dir.path()).await.unwrap();
    let credentials = CredentialStore::new(dir.path());
    let pipeline = SessionPipeline::new(
        store.clone(),
        credentials,
        "http://localhost:1/api/v1".to_string(),
    );

    let audio = dir.path().join("clip.mp3");
    tokio::fs::write(&audio, b"tiny audio payload").await.unwrap();

    (dir, store, pipeline, audio)
}

fn step_status(steps: &[tubenote::store::SessionStep], stage: Stage) -> SessionStatus {
    steps.iter().find(|s| s.step == stage).unwrap().status
}

#[tokio::test]
async fn test_happy_path_completes_all_stages() {
    let (_dir, store, pipeline, audio) = setup().await;
    let id = store
        .create("https://example.com/v", Some("concise".into()), Some("回顾".into()), false)
        .await
        .unwrap();

    let service = MockService {
        transcript: Some("这是转写".into()),
        note: Some("【要点】一条笔记".into()),
        ..Default::default()
    };
    pipeline
        .run_with(id, &StaticAudio { path: audio }, &service, "mock-audio", "mock-text")
        .await;

    let session = store.get(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.stage, Stage::Note);
    assert_eq!(session.transcript.as_deref(), Some("这是转写"));
    assert_eq!(session.note.as_deref(), Some("【要点】一条笔记"));
    assert!(session.error.is_none());

    let steps = store.steps(id).await.unwrap();
    assert_eq!(steps.len(), 3);
    assert!(steps.iter().all(|s| s.status == SessionStatus::Completed));

    let calls = service.calls.lock().unwrap();
    assert_eq!(*calls, ["inline:mock-audio", "generate:mock-text"]);
}

#[tokio::test]
async fn test_missing_api_key_fails_download_stage() {
    let (_dir, store, pipeline, _audio) = setup().await;
    let id = store.create("https://example.com/v", None, None, false).await.unwrap();

    // no credentials were saved, so the run must fail before any stage
    pipeline.run(id).await;

    let session = store.get(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.stage, Stage::Download);
    assert_eq!(session.error.as_deref(), Some("missing api key"));

    let steps = store.steps(id).await.unwrap();
    assert_eq!(step_status(&steps, Stage::Download), SessionStatus::Failed);
    assert_eq!(
        steps.iter().find(|s| s.step == Stage::Download).unwrap().message.as_deref(),
        Some("missing api key")
    );
    assert_eq!(step_status(&steps, Stage::Transcribe), SessionStatus::Pending);
    assert_eq!(step_status(&steps, Stage::Note), SessionStatus::Pending);
}

#[tokio::test]
async fn test_download_failure_keeps_later_steps_pending() {
    let (_dir, store, pipeline, _audio) = setup().await;
    let id = store.create("https://example.com/v", None, None, false).await.unwrap();

    let service = MockService::default();
    pipeline
        .run_with(id, &FailingAudio, &service, "mock-audio", "mock-text")
        .await;

    let session = store.get(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.stage, Stage::Download);
    assert_eq!(
        session.error.as_deref(),
        Some("download failed: audio file not found after download")
    );

    let steps = store.steps(id).await.unwrap();
    assert_eq!(step_status(&steps, Stage::Download), SessionStatus::Failed);
    assert_eq!(step_status(&steps, Stage::Transcribe), SessionStatus::Pending);
    assert_eq!(step_status(&steps, Stage::Note), SessionStatus::Pending);
    assert!(service.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_transcribe_failure_propagates_cause() {
    let (_dir, store, pipeline, audio) = setup().await;
    let id = store.create("https://example.com/v", None, None, false).await.unwrap();

    let service = MockService {
        transcript: None,
        note: Some("unused".into()),
        ..Default::default()
    };
    pipeline
        .run_with(id, &StaticAudio { path: audio }, &service, "mock-audio", "mock-text")
        .await;

    let session = store.get(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.stage, Stage::Transcribe);
    let error = session.error.unwrap();
    assert!(error.starts_with("transcribe failed:"), "unexpected error: {error}");
    assert!(error.contains("asr down"));
    assert!(session.transcript.is_none());

    let steps = store.steps(id).await.unwrap();
    assert_eq!(step_status(&steps, Stage::Download), SessionStatus::Completed);
    assert_eq!(step_status(&steps, Stage::Transcribe), SessionStatus::Failed);
    assert_eq!(step_status(&steps, Stage::Note), SessionStatus::Pending);
}

#[tokio::test]
async fn test_empty_transcript_fails_transcribe_stage() {
    let (_dir, store, pipeline, audio) = setup().await;
    let id = store.create("https://example.com/v", None, None, false).await.unwrap();

    let service = MockService {
        transcript: Some("   \n  ".into()),
        note: Some("unused".into()),
        ..Default::default()
    };
    pipeline
        .run_with(id, &StaticAudio { path: audio }, &service, "mock-audio", "mock-text")
        .await;

    let session = store.get(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.error.as_deref(), Some("transcribe failed: empty transcript"));
}

#[tokio::test]
async fn test_note_failure_keeps_transcript() {
    let (_dir, store, pipeline, audio) = setup().await;
    let id = store.create("https://example.com/v", None, None, false).await.unwrap();

    let service = MockService {
        transcript: Some("完整转写".into()),
        note: None,
        ..Default::default()
    };
    pipeline
        .run_with(id, &StaticAudio { path: audio }, &service, "mock-audio", "mock-text")
        .await;

    let session = store.get(id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Failed);
    assert_eq!(session.stage, Stage::Note);
    assert_eq!(session.error.as_deref(), Some("note failed: empty note"));
    assert_eq!(session.transcript.as_deref(), Some("完整转写"));
    assert!(session.note.is_none());

    let steps = store.steps(id).await.unwrap();
    assert_eq!(step_status(&steps, Stage::Download), SessionStatus::Completed);
    assert_eq!(step_status(&steps, Stage::Transcribe), SessionStatus::Completed);
    assert_eq!(step_status(&steps, Stage::Note), SessionStatus::Failed);
}
