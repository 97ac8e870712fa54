//! Concrete HTTP client for the DashScope endpoint family.

use super::{extract_text, is_file_job_model, SpeechService, NO_AUDIO_FRAGMENT_SIGNATURE};
use crate::error::{NoteGenerationError, ServiceError, TranscriptionError};
use anyhow::Result;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::{json, Value};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::{debug, warn};

pub const TEXT_ENDPOINT: &str = "services/aigc/text-generation/generation";
pub const MULTIMODAL_ENDPOINT: &str = "services/aigc/multimodal-generation/generation";
pub const TRANSCRIPTION_ENDPOINT: &str = "services/audio/asr/transcription";

/// Fixed timeout applied to every outbound call.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_POLLS: u32 = 720;

/// Bearer-token client for the text, multimodal, file and transcription-job
/// calls of one base endpoint. Configuration is passed at construction;
/// there is no process-wide client state.
pub struct QwenClient {
    api_key: String,
    base_url: String,
    http: reqwest::Client,
}

impl QwenClient {
    pub fn new(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            http,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post_json(&self, path: &str, payload: &Value) -> Result<Value, ServiceError> {
        debug!("POST {}", path);
        let response = self
            .http
            .post(self.endpoint(path))
            .bearer_auth(&self.api_key)
            .json(payload)
            .send()
            .await?;
        Self::json_or_status(response).await
    }

    async fn json_or_status(response: reqwest::Response) -> Result<Value, ServiceError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Status {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }

    /// Synchronous text generation returning the raw response document.
    async fn generate(&self, model: &str, prompt: &str) -> Result<Value, ServiceError> {
        let payload = json!({
            "model": model,
            "input": {
                "messages": [
                    {"role": "user", "content": prompt}
                ]
            },
            "parameters": {"result_format": "message"}
        });
        self.post_json(TEXT_ENDPOINT, &payload).await
    }

    /// Synchronous multimodal call with audio embedded as a data URI.
    async fn multimodal(
        &self,
        model: &str,
        data_url: &str,
        format: &str,
        prompt: &str,
    ) -> Result<Value, ServiceError> {
        let payload = json!({
            "model": model,
            "input": {
                "messages": [
                    {
                        "role": "user",
                        "content": [
                            {
                                "type": "input_audio",
                                "input_audio": {"data": data_url, "format": format}
                            },
                            {"type": "text", "text": prompt}
                        ]
                    }
                ]
            },
            "parameters": {"result_format": "message"}
        });
        self.post_json(MULTIMODAL_ENDPOINT, &payload).await
    }

    /// One-token ping verifying the key against the text endpoint.
    pub async fn validate_text_model(&self, model: &str) -> Result<()> {
        self.generate(model, "ping").await?;
        Ok(())
    }

    /// Verify the key against the audio call path the model requires,
    /// using half a second of silence as the probe. The service rejecting
    /// the silence itself (empty or no usable fragment) still proves the
    /// credential worked.
    pub async fn validate_audio_model(&self, model: &str) -> Result<()> {
        let wav = silence_wav_bytes()?;

        if is_file_job_model(model) {
            let mut file = tempfile::Builder::new().suffix(".wav").tempfile()?;
            file.write_all(&wav)?;
            match self.transcribe_file_job(model, file.path()).await {
                Ok(_) | Err(TranscriptionError::EmptyTranscript) => Ok(()),
                Err(err)
                    if err
                        .to_string()
                        .to_ascii_lowercase()
                        .contains(NO_AUDIO_FRAGMENT_SIGNATURE) =>
                {
                    Ok(())
                }
                Err(err) => Err(err.into()),
            }
        } else {
            let data_url = format!("data:audio/wav;base64,{}", BASE64.encode(&wav));
            self.multimodal(model, &data_url, "wav", "transcribe").await?;
            Ok(())
        }
    }

    /// Upload an audio file; returns the remote file id.
    async fn upload_file(&self, audio_path: &Path) -> Result<String, TranscriptionError> {
        let bytes = fs::read(audio_path).await?;
        let file_name = audio_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name);
        let form = reqwest::multipart::Form::new()
            .text("purpose", "assistants")
            .part("files", part);

        let response = self
            .http
            .post(self.endpoint("files"))
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(ServiceError::from)?;
        let data = Self::json_or_status(response).await?;

        data.pointer("/output/uploaded_files/0/file_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| TranscriptionError::Malformed("upload response missing file_id".into()))
    }

    /// Resolve the retrieval URL of an uploaded file.
    async fn file_url(&self, file_id: &str) -> Result<String, TranscriptionError> {
        let response = self
            .http
            .get(self.endpoint(&format!("files/{file_id}")))
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(ServiceError::from)?;
        let data = Self::json_or_status(response).await?;

        data.pointer("/output/url")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(TranscriptionError::MissingFileUrl)
    }

    /// Best-effort remote file deletion; errors are swallowed.
    async fn delete_file(&self, file_id: &str) {
        let result = self
            .http
            .delete(self.endpoint(&format!("files/{file_id}")))
            .bearer_auth(&self.api_key)
            .send()
            .await;
        match result {
            Ok(response) if !response.status().is_success() => {
                warn!("Failed to delete remote file {}: {}", file_id, response.status());
            }
            Err(e) => warn!("Failed to delete remote file {}: {}", file_id, e),
            _ => {}
        }
    }

    /// Submit an asynchronous transcription job; returns the task id.
    async fn submit_transcription(
        &self,
        model: &str,
        file_url: &str,
    ) -> Result<String, TranscriptionError> {
        let payload = json!({
            "model": model,
            "input": {"file_urls": [file_url]}
        });
        let response = self
            .http
            .post(self.endpoint(TRANSCRIPTION_ENDPOINT))
            .bearer_auth(&self.api_key)
            .header("X-DashScope-Async", "enable")
            .json(&payload)
            .send()
            .await
            .map_err(ServiceError::from)?;
        let data = Self::json_or_status(response).await?;

        data.pointer("/output/task_id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| TranscriptionError::Malformed("job submission missing task_id".into()))
    }

    /// Poll the task until it reaches a terminal status; returns the job
    /// output on success.
    async fn wait_for_task(&self, task_id: &str) -> Result<Value, TranscriptionError> {
        for _ in 0..MAX_POLLS {
            let response = self
                .http
                .get(self.endpoint(&format!("tasks/{task_id}")))
                .bearer_auth(&self.api_key)
                .send()
                .await
                .map_err(ServiceError::from)?;
            let data = Self::json_or_status(response).await?;

            let output = data.get("output").cloned().unwrap_or(Value::Null);
            let status = output
                .get("task_status")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            match status.as_str() {
                "SUCCEEDED" => return Ok(output),
                "FAILED" | "CANCELED" => {
                    return Err(TranscriptionError::JobNotSucceeded(output.to_string()))
                }
                _ => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
        Err(TranscriptionError::JobTimedOut)
    }

    /// Fetch the result document: from the job's result URL when one is
    /// present, otherwise the job output itself is the result document.
    async fn fetch_result_document(&self, output: &Value) -> Result<Value, TranscriptionError> {
        match result_url(output) {
            Some(url) => {
                let response = self.http.get(url).send().await.map_err(ServiceError::from)?;
                Ok(Self::json_or_status(response).await?)
            }
            None => Ok(output.clone()),
        }
    }
}

fn result_url(output: &Value) -> Option<&str> {
    output
        .pointer("/result/transcription_url")
        .and_then(Value::as_str)
        .or_else(|| {
            output
                .pointer("/results/0/transcription_url")
                .and_then(Value::as_str)
        })
}

#[async_trait]
impl SpeechService for QwenClient {
    async fn transcribe_inline(
        &self,
        model: &str,
        audio_path: &Path,
        prompt: &str,
    ) -> Result<String, TranscriptionError> {
        let (data_url, format) = audio_data_url(audio_path).await?;
        let data = self.multimodal(model, &data_url, &format, prompt).await?;
        Ok(extract_text(&data))
    }

    async fn transcribe_file_job(
        &self,
        model: &str,
        audio_path: &Path,
    ) -> Result<String, TranscriptionError> {
        let file_id = self.upload_file(audio_path).await?;

        let result = async {
            let file_url = self.file_url(&file_id).await?;
            let task_id = self.submit_transcription(model, &file_url).await?;
            debug!("Submitted transcription job {} for model {}", task_id, model);
            let output = self.wait_for_task(&task_id).await?;
            let document = self.fetch_result_document(&output).await?;
            let text = extract_text(&document);
            if text.is_empty() {
                return Err(TranscriptionError::EmptyTranscript);
            }
            Ok(text)
        }
        .await;

        // The uploaded file is transient either way.
        self.delete_file(&file_id).await;
        result
    }

    async fn generate_text(
        &self,
        model: &str,
        prompt: &str,
    ) -> Result<String, NoteGenerationError> {
        let data = self.generate(model, prompt).await?;
        let text = extract_text(&data);
        if text.is_empty() {
            return Err(NoteGenerationError::EmptyNote);
        }
        Ok(text)
    }
}

/// Encode an audio file as a `data:audio/...` URI plus its format tag.
async fn audio_data_url(audio_path: &Path) -> Result<(String, String), TranscriptionError> {
    let format = audio_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_else(|| "mp3".to_string());
    let bytes = fs::read(audio_path).await?;
    let data_url = format!("data:audio/{};base64,{}", format, BASE64.encode(&bytes));
    Ok((data_url, format))
}

/// Half a second of 16 kHz mono silence, used to probe audio models.
fn silence_wav_bytes() -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16_000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for _ in 0..8_000 {
            writer.write_sample(0i16)?;
        }
        writer.finalize()?;
    }
    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_wav_is_valid() {
        let bytes = silence_wav_bytes().unwrap();
        assert!(bytes.starts_with(b"RIFF"));
        // 8000 frames of 16-bit mono plus the 44-byte header
        assert_eq!(bytes.len(), 8_000 * 2 + 44);
    }

    #[test]
    fn test_result_url_variants() {
        let direct = serde_json::json!({"result": {"transcription_url": "https://a/x.json"}});
        assert_eq!(result_url(&direct), Some("https://a/x.json"));

        let listed = serde_json::json!({"results": [{"transcription_url": "https://a/y.json"}]});
        assert_eq!(result_url(&listed), Some("https://a/y.json"));

        let none = serde_json::json!({"results": [{"subtask_status": "OK"}]});
        assert_eq!(result_url(&none), None);
    }

    #[tokio::test]
    async fn test_audio_data_url_format_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.MP3");
        tokio::fs::write(&path, b"abc").await.unwrap();

        let (data_url, format) = audio_data_url(&path).await.unwrap();
        assert_eq!(format, "mp3");
        assert!(data_url.starts_with("data:audio/mp3;base64,"));
    }
}
