//! Cloud transcription backend.
//!
//! Unlike the offline backend this one has no streaming recognizer: the
//! capture thread segments complete utterances locally with the energy VAD,
//! encodes each one as a WAV in memory, and ships it to the Whisper API for
//! transcription. Wake detection then runs over whole-utterance transcripts.

pub mod backend;
pub mod client;
pub mod wav;

pub use backend::{WhisperCapture, WhisperConfig};
pub use client::{transcribe_with_retry, RetryConfig, TranscriptionService, WhisperClient};
