//! The capture abstraction every speech backend implements, plus the
//! callback plumbing and the [`VoiceManager`] that selects between backends.
//!
//! Backends run their recognition loops on dedicated threads; callbacks are
//! therefore stored behind `Arc<Mutex<..>>` slots and cloned out before
//! invocation so no lock is held while user code runs.

pub mod dispatch;
pub mod manager;
pub mod types;

use std::sync::Arc;

use parking_lot::Mutex;

use genie_foundation::CaptureError;

pub use dispatch::{event_channel, CaptureEventSender};
pub use manager::VoiceManager;
pub use types::{CaptureEvent, PartialResult, WishEvent};

pub type WishCallback = Arc<dyn Fn(WishEvent) + Send + Sync>;
pub type PartialCallback = Arc<dyn Fn(PartialResult) + Send + Sync>;
pub type ErrorCallback = Arc<dyn Fn(&CaptureError) + Send + Sync>;

/// Cheap availability check a backend runs before being selected.
pub type AvailabilityProbe = Arc<dyn Fn() -> bool + Send + Sync>;

/// Shared callback slots for one backend. Registration is last-writer-wins;
/// a slot that was never set simply swallows its events.
#[derive(Clone, Default)]
pub struct Callbacks {
    wish: Arc<Mutex<Option<WishCallback>>>,
    partial: Arc<Mutex<Option<PartialCallback>>>,
    error: Arc<Mutex<Option<ErrorCallback>>>,
}

impl Callbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_on_wish(&self, cb: WishCallback) {
        *self.wish.lock() = Some(cb);
    }

    pub fn set_on_partial(&self, cb: PartialCallback) {
        *self.partial.lock() = Some(cb);
    }

    pub fn set_on_error(&self, cb: ErrorCallback) {
        *self.error.lock() = Some(cb);
    }

    pub fn emit_wish(&self, event: WishEvent) {
        let cb = self.wish.lock().clone();
        if let Some(cb) = cb {
            cb(event);
        }
    }

    pub fn emit_partial(&self, result: PartialResult) {
        let cb = self.partial.lock().clone();
        if let Some(cb) = cb {
            cb(result);
        }
    }

    pub fn emit_error(&self, err: &CaptureError) {
        let cb = self.error.lock().clone();
        if let Some(cb) = cb {
            cb(err);
        }
    }
}

/// One speech recognition backend.
///
/// `start_listening` spawns the backend's capture thread and returns
/// immediately; a second call while already listening is a no-op.
/// `stop_listening` signals the thread and joins it. Implementations must be
/// safe to stop and restart repeatedly on the same instance.
pub trait VoiceCapture: Send {
    /// Stable human-readable backend name, e.g. for logging or a status bar.
    fn name(&self) -> &'static str;

    /// Whether the backend could plausibly start right now (credentials
    /// present, model on disk, input device reachable). A cheap probe, not a
    /// guarantee that `start_listening` will succeed.
    fn is_available(&self) -> bool;

    fn start_listening(&mut self) -> Result<(), CaptureError>;

    fn stop_listening(&mut self);

    fn is_listening(&self) -> bool;

    fn set_on_wish_recognized(&self, cb: WishCallback);

    fn set_on_partial_result(&self, cb: PartialCallback);

    fn set_on_error(&self, cb: ErrorCallback);

    /// Stop listening and release any held resources (API clients, models,
    /// child processes). The instance must not be restarted afterwards.
    fn shutdown(&mut self);
}
