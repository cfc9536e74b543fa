use std::time::Duration;
use thiserror::Error;

/// Failures that can occur inside a capture backend.
///
/// These never unwind out of a backend as panics; they are logged, retried
/// where the policy allows, and surfaced at most once through the error
/// callback when a backend has to shut its loop down.
#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("audio device unavailable: {0}")]
    DeviceUnavailable(#[from] AudioError),

    #[error("transcription service rejected credentials: {0}")]
    ServiceUnauthorized(String),

    #[error("transient transcription failure: {0}")]
    ServiceTransient(String),

    #[error("network unreachable: {0}")]
    NetworkUnreachable(String),

    #[error("recognizer process failure: {0}")]
    ProcessFailure(String),

    #[error("malformed recognizer output: {0}")]
    MalformedOutput(String),
}

/// Errors from the audio front-end.
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("no input device available")]
    NoDevice,

    #[error("input device disconnected")]
    Disconnected,

    #[error("format not supported: {format}")]
    FormatNotSupported { format: String },

    #[error("exceeded read failure budget after {count} consecutive errors")]
    ReadBudgetExceeded { count: u32 },

    #[error("stream error: {0}")]
    Stream(#[from] cpal::StreamError),

    #[error("build stream error: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("play stream error: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("default stream config error: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),
}

/// How a backend should react to a given failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry a bounded number of times with a fixed delay between attempts.
    Bounded { max_retries: u32, delay: Duration },
    /// Retrying cannot succeed; give up on this operation immediately.
    Never,
    /// Drop the affected unit of work and keep the loop running.
    DropAndContinue,
}

impl CaptureError {
    /// Retry policy for the error, per the transcription failure taxonomy.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            CaptureError::ServiceTransient(_) | CaptureError::NetworkUnreachable(_) => {
                RetryPolicy::Bounded {
                    max_retries: 2,
                    delay: Duration::from_millis(500),
                }
            }
            CaptureError::MalformedOutput(_) => RetryPolicy::DropAndContinue,
            CaptureError::ServiceUnauthorized(_)
            | CaptureError::DeviceUnavailable(_)
            | CaptureError::ProcessFailure(_) => RetryPolicy::Never,
        }
    }

    /// Whether the failure should count against the session-wide consecutive
    /// I/O failure budget. Only unreachable-network failures do: auth errors
    /// are surfaced immediately, and rate limits, server errors, and
    /// malformed payloads each cost one utterance without threatening the
    /// session.
    pub fn counts_toward_session_budget(&self) -> bool {
        matches!(self, CaptureError::NetworkUnreachable(_))
    }
}
