use crate::phrases::{find_wake_phrase, strip_fillers, strip_wake_phrases};

/// Capture state for one backend instance. Mutated only by the thread running
/// that backend's recognition loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WakeState {
    Idle,
    AwaitingWish,
}

/// Outcome of feeding transcribed text to the detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WakeSignal {
    /// A wake phrase matched; wish capture has begun.
    WakeDetected { phrase: &'static str },
    /// Live feedback text for the partial-result callback.
    Partial(String),
    /// A completed wish, filler prefixes stripped.
    Wish(String),
}

/// Idle/AwaitingWish state machine shared by all backends.
///
/// The owning backend decides when an utterance has ended (silence timer for
/// buffer-based backends, final-result signal for streaming ones) and calls
/// [`WakeDetector::finalize`]. A second wake phrase spoken while already
/// awaiting a wish is deliberately not re-interpreted as a new wake event;
/// its text is stripped from the fragment instead.
#[derive(Debug, Default)]
pub struct WakeDetector {
    state: WakeState,
    wish: String,
}

impl Default for WakeState {
    fn default() -> Self {
        WakeState::Idle
    }
}

impl WakeDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> WakeState {
        self.state
    }

    /// Whether any wish text has accumulated since the wake phrase.
    pub fn has_pending_text(&self) -> bool {
        !self.wish.is_empty()
    }

    /// Feed an in-progress (partial) transcription fragment.
    ///
    /// Partials never mutate the wish buffer; while awaiting a wish they are
    /// only surfaced for live feedback.
    pub fn observe_partial(&mut self, text: &str) -> Option<WakeSignal> {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }
        match self.state {
            // No seeding from partials: the eventual final repeats their
            // text and would duplicate it in the wish buffer.
            WakeState::Idle => self.try_wake(&text, false),
            WakeState::AwaitingWish => Some(WakeSignal::Partial(text)),
        }
    }

    /// Feed a finalized transcription fragment.
    ///
    /// While awaiting a wish the fragment (minus any wake-phrase text) is
    /// appended to the wish buffer and the accumulated text is returned for
    /// feedback.
    pub fn observe_final(&mut self, text: &str) -> Option<WakeSignal> {
        let text = text.trim().to_lowercase();
        if text.is_empty() {
            return None;
        }
        match self.state {
            WakeState::Idle => self.try_wake(&text, true),
            WakeState::AwaitingWish => {
                let fragment = strip_wake_phrases(&text);
                if fragment.is_empty() {
                    return None;
                }
                if !self.wish.is_empty() {
                    self.wish.push(' ');
                }
                self.wish.push_str(&fragment);
                Some(WakeSignal::Partial(self.wish.clone()))
            }
        }
    }

    /// End the current wish capture. Returns the wish if the stripped text is
    /// non-empty; the state returns to `Idle` either way.
    pub fn finalize(&mut self) -> Option<WakeSignal> {
        if self.state == WakeState::Idle {
            return None;
        }
        self.state = WakeState::Idle;
        let wish = strip_fillers(&std::mem::take(&mut self.wish));
        if wish.is_empty() {
            tracing::debug!("Wish finalized empty, nothing emitted");
            None
        } else {
            tracing::info!(wish = %wish, "Wish captured");
            Some(WakeSignal::Wish(wish))
        }
    }

    /// Drop all capture state, returning to `Idle`.
    pub fn reset(&mut self) {
        self.state = WakeState::Idle;
        self.wish.clear();
    }

    fn try_wake(&mut self, text: &str, seed: bool) -> Option<WakeSignal> {
        let (phrase, end) = find_wake_phrase(text)?;
        tracing::info!(phrase = phrase, "Wake phrase detected");
        self.state = WakeState::AwaitingWish;
        self.wish.clear();
        if seed {
            let trailing = text[end..].trim();
            if !trailing.is_empty() {
                self.wish.push_str(trailing);
            }
        }
        Some(WakeSignal::WakeDetected { phrase })
    }
}
