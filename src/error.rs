use thiserror::Error;

/// Transport- and status-level failures talking to the remote service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("dashscope error {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Failures of the download stage.
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("yt-dlp not found (install it or set YTDLP_LOCATION)")]
    ToolMissing,

    #[error("yt-dlp exited with status {status}: {stderr}")]
    ToolFailed { status: i32, stderr: String },

    #[error("audio file not found after download")]
    NoArtifact,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures of the transcribe stage.
#[derive(Debug, Error)]
pub enum TranscriptionError {
    #[error("ffmpeg not found (install it or set FFMPEG_LOCATION)")]
    FfmpegMissing,

    #[error("audio split failed: {0}")]
    SplitFailed(String),

    #[error("audio split produced no chunks")]
    NoChunks,

    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("transcription job ended as {0}")]
    JobNotSucceeded(String),

    #[error("transcription job timed out")]
    JobTimedOut,

    #[error("uploaded file has no retrieval url")]
    MissingFileUrl,

    #[error("unexpected service response: {0}")]
    Malformed(String),

    #[error("empty transcript")]
    EmptyTranscript,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failures of the note stage.
#[derive(Debug, Error)]
pub enum NoteGenerationError {
    #[error(transparent)]
    Service(#[from] ServiceError),

    #[error("empty note")]
    EmptyNote,
}
