//! Wake-phrase matching and the wish capture state machine.
//!
//! Raw transcribed text (partial or final, from any backend) flows through a
//! [`WakeDetector`]: in `Idle` it scans for a wake phrase; once one matches
//! it accumulates the trailing "wish" text until the owning backend signals
//! the end of the utterance, then strips filler prefixes and emits the wish.

pub mod detector;
pub mod phrases;

pub use detector::{WakeDetector, WakeSignal, WakeState};
pub use phrases::{
    find_wake_phrase, strip_fillers, strip_wake_phrases, LISTENING_PROMPT, WAKE_PHRASES,
};
