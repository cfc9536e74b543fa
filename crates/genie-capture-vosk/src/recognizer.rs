//! Streaming recognizer abstraction and the real Vosk implementation.

/// What the recognizer did with the latest frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoding {
    /// Still inside an utterance; a partial may be available.
    Running,
    /// The recognizer finalized an utterance on its own.
    Finalized,
}

/// A push-based speech recognizer fed one PCM frame at a time.
///
/// Errors are strings rather than [`CaptureError`] because a failed frame is
/// not fatal; the capture loop logs it and keeps feeding.
pub trait StreamingRecognizer: Send {
    fn accept_frame(&mut self, samples: &[i16]) -> Result<Decoding, String>;

    /// Best partial transcription of the in-flight utterance, possibly empty.
    fn partial_text(&mut self) -> String;

    /// Transcription of the utterance the recognizer just finalized.
    fn final_text(&mut self) -> String;

    /// Force-finalize the in-flight utterance, returning whatever text was
    /// buffered, and reset for the next one.
    fn flush(&mut self) -> String;
}

#[cfg(feature = "vosk")]
pub use real::VoskRecognizer;

#[cfg(feature = "vosk")]
mod real {
    use super::*;
    use genie_foundation::CaptureError;
    use std::path::Path;
    use vosk::{CompleteResult, DecodingState, Model, Recognizer};

    pub struct VoskRecognizer {
        recognizer: Recognizer,
    }

    impl VoskRecognizer {
        pub fn new(model_path: &Path, sample_rate_hz: u32) -> Result<Self, CaptureError> {
            let model = Model::new(model_path.to_string_lossy()).ok_or_else(|| {
                CaptureError::ProcessFailure(format!(
                    "failed to load Vosk model from {}",
                    model_path.display()
                ))
            })?;
            let mut recognizer =
                Recognizer::new(&model, sample_rate_hz as f32).ok_or_else(|| {
                    CaptureError::ProcessFailure("failed to create Vosk recognizer".to_string())
                })?;
            recognizer.set_words(false);
            recognizer.set_partial_words(false);
            Ok(Self { recognizer })
        }

        fn complete_text(result: CompleteResult) -> String {
            match result {
                CompleteResult::Single(single) => single.text.to_string(),
                CompleteResult::Multiple(multi) => multi
                    .alternatives
                    .first()
                    .map(|alt| alt.text.to_string())
                    .unwrap_or_default(),
            }
        }
    }

    impl StreamingRecognizer for VoskRecognizer {
        fn accept_frame(&mut self, samples: &[i16]) -> Result<Decoding, String> {
            match self.recognizer.accept_waveform(samples) {
                Ok(DecodingState::Finalized) => Ok(Decoding::Finalized),
                Ok(DecodingState::Running) => Ok(Decoding::Running),
                Ok(DecodingState::Failed) => Err("vosk decoding failed".to_string()),
                Err(e) => Err(format!("vosk rejected waveform: {e}")),
            }
        }

        fn partial_text(&mut self) -> String {
            self.recognizer.partial_result().partial.to_string()
        }

        fn final_text(&mut self) -> String {
            Self::complete_text(self.recognizer.result())
        }

        fn flush(&mut self) -> String {
            let text = Self::complete_text(self.recognizer.final_result());
            self.recognizer.reset();
            text
        }
    }
}
