use std::time::Instant;

/// A completed wish, ready for whoever sits downstream of the pipeline.
#[derive(Debug, Clone)]
pub struct WishEvent {
    pub text: String,
    pub recognized_at: Instant,
    /// Human-readable name of the backend that produced the wish.
    pub backend: &'static str,
}

/// Live transcription feedback while a wish is being captured.
#[derive(Debug, Clone)]
pub struct PartialResult {
    pub text: String,
    pub at: Instant,
}

/// Unified event type for consumers that prefer a channel over callbacks.
#[derive(Debug, Clone)]
pub enum CaptureEvent {
    Wish(WishEvent),
    Partial(PartialResult),
    Fault { message: String },
}
