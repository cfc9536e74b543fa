//! Backend selection and lifecycle.
//!
//! The manager owns every registered backend, picks the best available one
//! at initialization time, and forwards its events to a single set of
//! outward callbacks. Backends are injected by the caller rather than
//! constructed here so hosts and tests control exactly what is registered.

use genie_foundation::CaptureError;

use crate::{Callbacks, ErrorCallback, PartialCallback, VoiceCapture, WishCallback};

pub struct VoiceManager {
    /// Registration order is priority order: first available wins.
    backends: Vec<Box<dyn VoiceCapture>>,
    active: Option<usize>,
    callbacks: Callbacks,
    always_listening: bool,
}

impl VoiceManager {
    pub fn new(backends: Vec<Box<dyn VoiceCapture>>) -> Self {
        Self {
            backends,
            active: None,
            callbacks: Callbacks::new(),
            always_listening: false,
        }
    }

    /// Probe backends in priority order, select the first available one, and
    /// wire its events through to the manager's outward callbacks.
    ///
    /// Safe to call again after e.g. credentials change; any previously
    /// active backend keeps running until `shutdown` or a listening toggle.
    pub fn initialize(&mut self) -> Result<(), CaptureError> {
        for (idx, backend) in self.backends.iter().enumerate() {
            if backend.is_available() {
                tracing::info!(backend = backend.name(), "Selected voice backend");
                let cb = self.callbacks.clone();
                backend.set_on_wish_recognized({
                    let cb = cb.clone();
                    std::sync::Arc::new(move |event| cb.emit_wish(event))
                });
                backend.set_on_partial_result({
                    let cb = cb.clone();
                    std::sync::Arc::new(move |result| cb.emit_partial(result))
                });
                backend.set_on_error(std::sync::Arc::new(move |err: &CaptureError| {
                    cb.emit_error(err)
                }));
                self.active = Some(idx);
                return Ok(());
            }
            tracing::debug!(backend = backend.name(), "Backend unavailable, skipping");
        }
        self.active = None;
        Err(CaptureError::DeviceUnavailable(
            genie_foundation::AudioError::NoDevice,
        ))
    }

    /// Name of the currently selected backend, or `"none"`.
    pub fn active_backend_name(&self) -> &'static str {
        self.active
            .map(|idx| self.backends[idx].name())
            .unwrap_or("none")
    }

    pub fn is_listening(&self) -> bool {
        self.active
            .map(|idx| self.backends[idx].is_listening())
            .unwrap_or(false)
    }

    pub fn always_listening(&self) -> bool {
        self.always_listening
    }

    /// Toggle continuous listening on the active backend.
    pub fn set_always_listening(&mut self, enabled: bool) -> Result<(), CaptureError> {
        self.always_listening = enabled;
        let Some(idx) = self.active else {
            tracing::warn!("No active backend, always-listening toggle deferred");
            return Ok(());
        };
        let backend = &mut self.backends[idx];
        if enabled {
            if !backend.is_listening() {
                backend.start_listening()?;
            }
        } else if backend.is_listening() {
            backend.stop_listening();
        }
        Ok(())
    }

    pub fn set_on_wish_recognized(&self, cb: WishCallback) {
        self.callbacks.set_on_wish(cb);
    }

    pub fn set_on_partial_result(&self, cb: PartialCallback) {
        self.callbacks.set_on_partial(cb);
    }

    pub fn set_on_error(&self, cb: ErrorCallback) {
        self.callbacks.set_on_error(cb);
    }

    /// Stop and release every backend, not only the active one.
    pub fn shutdown(&mut self) {
        for backend in &mut self.backends {
            backend.shutdown();
        }
        self.active = None;
        self.always_listening = false;
    }
}
