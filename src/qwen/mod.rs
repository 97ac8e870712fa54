//! Remote speech/LLM service integration (DashScope/Qwen endpoint family).

pub mod client;
pub mod extract;

pub use client::QwenClient;
pub use extract::extract_text;

use crate::error::{NoteGenerationError, TranscriptionError};
use async_trait::async_trait;
use std::path::Path;

/// Default API base URL.
pub const DEFAULT_BASE_URL: &str = "https://dashscope.aliyuncs.com/api/v1";

/// Fixed fallback model used after a file-job attempt reports no usable audio.
pub const FALLBACK_AUDIO_MODEL: &str = "paraformer-v2";

/// Error-message signature indicating the service found no usable audio
/// fragment in the uploaded file. Matched case-insensitively.
pub const NO_AUDIO_FRAGMENT_SIGNATURE: &str = "no valid audio fragment";

/// Whether a model requires the asynchronous file-upload + job-polling call
/// path instead of a single inline multimodal request.
pub fn is_file_job_model(model: &str) -> bool {
    model.contains("filetrans") || model.starts_with("qwen3-asr-")
}

/// The remote capabilities the pipeline depends on, behind one seam so the
/// concrete client can be swapped out in tests.
#[async_trait]
pub trait SpeechService: Send + Sync {
    /// Transcribe audio embedded as a base64 data URI in one synchronous
    /// multimodal request. May return an empty string when the response
    /// carries no text.
    async fn transcribe_inline(
        &self,
        model: &str,
        audio_path: &Path,
        prompt: &str,
    ) -> Result<String, TranscriptionError>;

    /// Transcribe audio via file upload + asynchronous job. Fails on an
    /// empty result.
    async fn transcribe_file_job(
        &self,
        model: &str,
        audio_path: &Path,
    ) -> Result<String, TranscriptionError>;

    /// Generate text from a prompt. Fails on an empty result.
    async fn generate_text(&self, model: &str, prompt: &str)
        -> Result<String, NoteGenerationError>;
}
