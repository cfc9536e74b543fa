//! Offline wake-word and wish recognition backed by a local Vosk model.
//!
//! Audio frames stream straight into the recognizer; partial results drive
//! wake detection with no round trips, which is what makes this backend the
//! low-latency fallback when no cloud credentials are configured. The real
//! Vosk bindings sit behind the `vosk` cargo feature so the rest of the
//! workspace builds without libvosk installed.

pub mod backend;
pub mod model;
pub mod recognizer;

pub use backend::{VoskCapture, VoskConfig};
pub use model::locate_model;
pub use recognizer::{Decoding, StreamingRecognizer};
