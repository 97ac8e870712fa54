use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Lifecycle status of a session or of one of its steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::Running => "running",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The three ordered pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Download,
    Transcribe,
    Note,
}

impl Stage {
    /// All stages in execution order.
    pub const ALL: [Stage; 3] = [Stage::Download, Stage::Transcribe, Stage::Note];

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Download => "download",
            Stage::Transcribe => "transcribe",
            Stage::Note => "note",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One video-to-note processing request and its accumulated state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: u64,
    pub url: String,
    pub style: Option<String>,
    pub remark: Option<String>,
    #[serde(default)]
    pub include_joke: bool,
    pub status: SessionStatus,
    pub stage: Stage,
    pub error: Option<String>,
    pub transcript: Option<String>,
    pub note: Option<String>,
    pub title: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Per-session tracking record for one pipeline stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStep {
    pub step: Stage,
    pub status: SessionStatus,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// On-disk document: a session and its three steps, stored as one JSON file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionRecord {
    session: Session,
    steps: Vec<SessionStep>,
}

/// Partial update applied to a session; unset fields are left untouched.
#[derive(Debug, Clone, Default)]
pub struct SessionUpdate {
    pub status: Option<SessionStatus>,
    pub stage: Option<Stage>,
    pub error: Option<String>,
    pub transcript: Option<String>,
    pub note: Option<String>,
    pub title: Option<String>,
}

/// JSON-file-backed session store with an in-memory cache.
///
/// One file per session under `{data_dir}/sessions/`; audio artifacts live
/// under `{data_dir}/audio/` and are removed together with the session.
/// Updates for a session id that is no longer present are dropped, so a
/// pipeline run whose session was deleted mid-flight cannot recreate it.
#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions_dir: PathBuf,
    audio_dir: PathBuf,
    cache: Arc<RwLock<HashMap<u64, SessionRecord>>>,
    next_id: Arc<AtomicU64>,
}

impl SessionStore {
    /// Open the store, creating its directories and loading existing
    /// session files. Files that fail to parse (including unknown status
    /// or stage strings) are skipped with a warning.
    pub async fn open(data_dir: &Path) -> Result<Self> {
        let sessions_dir = data_dir.join("sessions");
        let audio_dir = data_dir.join("audio");
        fs::create_dir_all(&sessions_dir).await?;
        fs::create_dir_all(&audio_dir).await?;

        let mut cache = HashMap::new();
        let mut max_id = 0u64;
        let mut entries = fs::read_dir(&sessions_dir).await?;
        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if !path.extension().map_or(false, |ext| ext == "json") {
                continue;
            }
            match fs::read_to_string(&path).await {
                Ok(content) => match serde_json::from_str::<SessionRecord>(&content) {
                    Ok(record) => {
                        max_id = max_id.max(record.session.id);
                        cache.insert(record.session.id, record);
                    }
                    Err(e) => {
                        warn!("Skipping malformed session file {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Failed to read session file {}: {}", path.display(), e);
                }
            }
        }

        info!("📊 Session store opened with {} sessions", cache.len());

        Ok(Self {
            sessions_dir,
            audio_dir,
            cache: Arc::new(RwLock::new(cache)),
            next_id: Arc::new(AtomicU64::new(max_id + 1)),
        })
    }

    /// Directory holding per-session audio artifacts and chunk directories.
    pub fn audio_dir(&self) -> &Path {
        &self.audio_dir
    }

    /// Create a session together with its three pending steps.
    pub async fn create(
        &self,
        url: &str,
        style: Option<String>,
        remark: Option<String>,
        include_joke: bool,
    ) -> Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();

        let session = Session {
            id,
            url: url.to_string(),
            style,
            remark,
            include_joke,
            status: SessionStatus::Pending,
            stage: Stage::Download,
            error: None,
            transcript: None,
            note: None,
            title: None,
            created_at: now,
            updated_at: now,
        };
        let steps = Stage::ALL
            .iter()
            .map(|stage| SessionStep {
                step: *stage,
                status: SessionStatus::Pending,
                message: None,
                created_at: now,
                updated_at: now,
            })
            .collect();

        let record = SessionRecord { session, steps };
        self.cache.write().await.insert(id, record.clone());
        self.persist(&record).await?;

        debug!("🆕 Created session {} for {}", id, url);
        Ok(id)
    }

    pub async fn get(&self, id: u64) -> Option<Session> {
        self.cache
            .read()
            .await
            .get(&id)
            .map(|record| record.session.clone())
    }

    /// The session's steps in execution order.
    pub async fn steps(&self, id: u64) -> Option<Vec<SessionStep>> {
        self.cache
            .read()
            .await
            .get(&id)
            .map(|record| record.steps.clone())
    }

    /// All sessions, most recently created first.
    pub async fn list(&self) -> Vec<Session> {
        let cache = self.cache.read().await;
        let mut sessions: Vec<Session> = cache.values().map(|r| r.session.clone()).collect();
        sessions.sort_by(|a, b| b.id.cmp(&a.id));
        sessions
    }

    /// Apply a partial update to a session. Updates for a deleted id are
    /// dropped with a warning instead of recreating state.
    pub async fn update(&self, id: u64, update: SessionUpdate) -> Result<()> {
        let record = {
            let mut cache = self.cache.write().await;
            let Some(record) = cache.get_mut(&id) else {
                warn!("Dropping update for deleted session {}", id);
                return Ok(());
            };

            let session = &mut record.session;
            if let Some(status) = update.status {
                session.status = status;
            }
            if let Some(stage) = update.stage {
                session.stage = stage;
            }
            if let Some(error) = update.error {
                session.error = Some(error);
            }
            if let Some(transcript) = update.transcript {
                session.transcript = Some(transcript);
            }
            if let Some(note) = update.note {
                session.note = Some(note);
            }
            if let Some(title) = update.title {
                session.title = Some(title);
            }
            session.updated_at = Utc::now();
            record.clone()
        };

        self.persist(&record).await
    }

    /// Set a step's status and replace its progress message.
    pub async fn update_step(
        &self,
        id: u64,
        step: Stage,
        status: SessionStatus,
        message: Option<&str>,
    ) -> Result<()> {
        let record = {
            let mut cache = self.cache.write().await;
            let Some(record) = cache.get_mut(&id) else {
                warn!("Dropping step update for deleted session {}", id);
                return Ok(());
            };

            if let Some(entry) = record.steps.iter_mut().find(|s| s.step == step) {
                entry.status = status;
                entry.message = message.map(str::to_string);
                entry.updated_at = Utc::now();
            }
            record.clone()
        };

        self.persist(&record).await
    }

    /// Delete a session, its steps and its on-disk audio artifacts.
    /// Returns whether the session existed.
    pub async fn delete(&self, id: u64) -> Result<bool> {
        let existed = self.cache.write().await.remove(&id).is_some();
        if !existed {
            return Ok(false);
        }

        let path = self.session_path(id);
        if let Err(e) = fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!("Failed to remove session file {}: {}", path.display(), e);
            }
        }
        self.remove_audio_artifacts(id).await;

        info!("🧹 Deleted session {}", id);
        Ok(true)
    }

    /// Most recently created session with the exact same URL (case-sensitive)
    /// whose download step completed, i.e. whose audio artifact should exist.
    pub async fn find_latest_audio_cache_owner(&self, url: &str) -> Option<u64> {
        let cache = self.cache.read().await;
        cache
            .values()
            .filter(|record| record.session.url == url)
            .filter(|record| {
                record.steps.iter().any(|step| {
                    step.step == Stage::Download && step.status == SessionStatus::Completed
                })
            })
            .max_by_key(|record| (record.session.created_at, record.session.id))
            .map(|record| record.session.id)
    }

    fn session_path(&self, id: u64) -> PathBuf {
        self.sessions_dir.join(format!("{id}.json"))
    }

    async fn persist(&self, record: &SessionRecord) -> Result<()> {
        let path = self.session_path(record.session.id);
        let content = serde_json::to_string_pretty(record)?;
        fs::write(&path, content).await?;
        Ok(())
    }

    async fn remove_audio_artifacts(&self, id: u64) {
        let prefix = format!("{id}.");
        if let Ok(mut entries) = fs::read_dir(&self.audio_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                let name = entry.file_name();
                if name.to_string_lossy().starts_with(&prefix) {
                    let _ = fs::remove_file(entry.path()).await;
                }
            }
        }
        let chunk_dir = self.audio_dir.join(format!("{id}_chunks"));
        let _ = fs::remove_dir_all(&chunk_dir).await;
    }
}
