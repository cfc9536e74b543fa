//! Whisper API client and the retry wrapper around it.

use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;

use genie_foundation::{CaptureError, RetryPolicy};

pub const WHISPER_API_URL: &str = "https://api.openai.com/v1/audio/transcriptions";
pub const WHISPER_MODEL: &str = "whisper-1";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A service that turns a complete WAV recording into text.
pub trait TranscriptionService: Send + Sync {
    fn transcribe(&self, wav: &[u8]) -> Result<String, CaptureError>;
}

/// Blocking client for the OpenAI transcription endpoint.
pub struct WhisperClient {
    http: reqwest::blocking::Client,
    api_key: String,
    url: String,
}

impl WhisperClient {
    pub fn new(api_key: String) -> Result<Self, CaptureError> {
        Self::with_url(api_key, WHISPER_API_URL.to_string())
    }

    pub fn with_url(api_key: String, url: String) -> Result<Self, CaptureError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CaptureError::ProcessFailure(format!("http client: {e}")))?;
        Ok(Self { http, api_key, url })
    }
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

impl TranscriptionService for WhisperClient {
    fn transcribe(&self, wav: &[u8]) -> Result<String, CaptureError> {
        let part = Part::bytes(wav.to_vec())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| CaptureError::ProcessFailure(format!("multipart: {e}")))?;
        let form = Form::new()
            .part("file", part)
            .text("model", WHISPER_MODEL)
            .text("language", "en");

        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .map_err(classify_transport)?;

        let status = response.status();
        if status.is_success() {
            let body: TranscriptionResponse = response
                .json()
                .map_err(|e| CaptureError::MalformedOutput(format!("response body: {e}")))?;
            Ok(body.text.trim().to_string())
        } else {
            let message = response
                .json::<ApiErrorBody>()
                .map(|body| body.error.message)
                .unwrap_or_else(|_| format!("http status {status}"));
            Err(classify_status(status, message))
        }
    }
}

fn classify_transport(err: reqwest::Error) -> CaptureError {
    if err.is_connect() || err.is_timeout() {
        CaptureError::NetworkUnreachable(err.to_string())
    } else {
        CaptureError::ServiceTransient(err.to_string())
    }
}

fn classify_status(status: StatusCode, message: String) -> CaptureError {
    match status.as_u16() {
        401 | 403 => CaptureError::ServiceUnauthorized(message),
        429 => CaptureError::ServiceTransient(format!("rate limited: {message}")),
        code if code >= 500 => CaptureError::ServiceTransient(message),
        // Remaining 4xx means our payload was rejected; retrying the same
        // bytes cannot help.
        _ => CaptureError::MalformedOutput(message),
    }
}

/// Fixed-delay bounded retry settings for transcription requests.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            delay: Duration::from_millis(500),
        }
    }
}

/// Call the service, retrying only failures whose policy allows it.
pub fn transcribe_with_retry(
    service: &dyn TranscriptionService,
    wav: &[u8],
    retry: &RetryConfig,
) -> Result<String, CaptureError> {
    let mut attempt = 0u32;
    loop {
        match service.transcribe(wav) {
            Ok(text) => return Ok(text),
            Err(err) => match err.retry_policy() {
                RetryPolicy::Bounded { .. } if attempt < retry.max_retries => {
                    attempt += 1;
                    tracing::warn!(error = %err, attempt, "Transcription failed, retrying");
                    std::thread::sleep(retry.delay);
                }
                _ => return Err(err),
            },
        }
    }
}
