//! tubenote - video URL to structured notes
//!
//! Three-stage pipeline: download audio from a video URL, transcribe it
//! through a remote speech service, then generate a styled note from the
//! transcript. Session state is tracked per stage and served over HTTP.

pub mod api;
pub mod chunking;
pub mod config;
pub mod download;
pub mod error;
pub mod media;
pub mod pipeline;
pub mod prompt;
pub mod qwen;
pub mod store;
pub mod transcribe;

// Re-export main types for easy access
pub use crate::config::{CredentialStore, Credentials, Settings};
pub use crate::download::{AudioAcquisition, AudioSource};
pub use crate::error::{DownloadError, NoteGenerationError, ServiceError, TranscriptionError};
pub use crate::pipeline::SessionPipeline;
pub use crate::prompt::{build_note_prompt, NoteStyle};
pub use crate::qwen::{QwenClient, SpeechService};
pub use crate::store::{Session, SessionStatus, SessionStep, SessionStore, SessionUpdate, Stage};
pub use crate::transcribe::TranscriptionRunner;
