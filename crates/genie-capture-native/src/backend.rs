//! Helper process lifecycle and the stdout reading loop.

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use parking_lot::Mutex;

use genie_capture::{
    Callbacks, ErrorCallback, PartialCallback, PartialResult, VoiceCapture, WishCallback,
    WishEvent,
};
use genie_foundation::CaptureError;
use genie_wake::{WakeDetector, WakeSignal, WakeState, LISTENING_PROMPT};

use crate::protocol::{parse_line, RecognizerLine};

const BACKEND_NAME: &str = "Native recognizer";

#[derive(Debug, Clone)]
pub struct NativeConfig {
    /// Helper executable. The default expects a `genie-recognizer` binary on
    /// PATH that speaks the stdout line protocol.
    pub command: String,
    pub args: Vec<String>,
}

impl Default for NativeConfig {
    fn default() -> Self {
        Self {
            command: "genie-recognizer".to_string(),
            args: Vec::new(),
        }
    }
}

pub struct NativeCapture {
    config: NativeConfig,
    callbacks: Callbacks,
    stop: Arc<AtomicBool>,
    child: Arc<Mutex<Option<Child>>>,
    worker: Option<JoinHandle<()>>,
}

impl NativeCapture {
    pub fn new(config: NativeConfig) -> Self {
        Self {
            config,
            callbacks: Callbacks::new(),
            stop: Arc::new(AtomicBool::new(false)),
            child: Arc::new(Mutex::new(None)),
            worker: None,
        }
    }
}

impl VoiceCapture for NativeCapture {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    /// The system recognizer helper only ships on macOS.
    fn is_available(&self) -> bool {
        cfg!(target_os = "macos")
    }

    fn start_listening(&mut self) -> Result<(), CaptureError> {
        if self.is_listening() {
            return Ok(());
        }
        self.stop = Arc::new(AtomicBool::new(false));
        let stop = self.stop.clone();
        let config = self.config.clone();
        let callbacks = self.callbacks.clone();
        let child_slot = self.child.clone();
        self.worker = Some(
            std::thread::Builder::new()
                .name("native-capture".to_string())
                .spawn(move || run_capture(config, child_slot, callbacks, stop))
                .map_err(|e| CaptureError::ProcessFailure(e.to_string()))?,
        );
        tracing::info!("Native capture started");
        Ok(())
    }

    fn stop_listening(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        // Killing the helper unblocks the reader at EOF.
        if let Some(child) = self.child.lock().as_mut() {
            let _ = child.kill();
        }
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("Native capture thread panicked");
            }
        }
    }

    fn is_listening(&self) -> bool {
        self.worker
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    fn set_on_wish_recognized(&self, cb: WishCallback) {
        self.callbacks.set_on_wish(cb);
    }

    fn set_on_partial_result(&self, cb: PartialCallback) {
        self.callbacks.set_on_partial(cb);
    }

    fn set_on_error(&self, cb: ErrorCallback) {
        self.callbacks.set_on_error(cb);
    }

    fn shutdown(&mut self) {
        self.stop_listening();
    }
}

impl Drop for NativeCapture {
    fn drop(&mut self) {
        self.stop_listening();
    }
}

fn run_capture(
    config: NativeConfig,
    child_slot: Arc<Mutex<Option<Child>>>,
    callbacks: Callbacks,
    stop: Arc<AtomicBool>,
) {
    let spawned = Command::new(&config.command)
        .args(&config.args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn();
    let mut child = match spawned {
        Ok(child) => child,
        Err(e) => {
            callbacks.emit_error(&CaptureError::ProcessFailure(format!(
                "failed to spawn {}: {e}",
                config.command
            )));
            return;
        }
    };
    let Some(stdout) = child.stdout.take() else {
        let _ = child.kill();
        callbacks.emit_error(&CaptureError::ProcessFailure(
            "helper stdout not captured".to_string(),
        ));
        return;
    };
    {
        let mut slot = child_slot.lock();
        *slot = Some(child);
        // stop_listening may have fired between spawn and registration; its
        // kill would have found an empty slot, so re-check and kill here.
        if stop.load(Ordering::Relaxed) {
            if let Some(child) = slot.as_mut() {
                let _ = child.kill();
            }
        }
    }

    let mut detector = WakeDetector::new();
    for line in BufReader::new(stdout).lines() {
        if stop.load(Ordering::Relaxed) {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::warn!(error = %e, "Helper stdout read failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_line(&line) {
            Some(RecognizerLine::Partial(text)) => {
                dispatch(detector.observe_partial(&text), &callbacks);
            }
            Some(RecognizerLine::Final(text)) => {
                match detector.state() {
                    WakeState::Idle => {
                        dispatch(detector.observe_final(&text), &callbacks);
                        // Wake and wish in one utterance: finish right away.
                        if detector.has_pending_text() {
                            dispatch(detector.finalize(), &callbacks);
                        }
                    }
                    WakeState::AwaitingWish => {
                        detector.observe_final(&text);
                        dispatch(detector.finalize(), &callbacks);
                    }
                }
            }
            Some(RecognizerLine::Error(message)) => {
                tracing::warn!(message, "Helper reported an error");
            }
            None => {
                tracing::warn!(line, "Dropping malformed helper output");
            }
        }
    }

    let exited_unexpectedly = !stop.load(Ordering::Relaxed);
    if let Some(mut child) = child_slot.lock().take() {
        let _ = child.kill();
        let _ = child.wait();
    }
    if exited_unexpectedly {
        callbacks.emit_error(&CaptureError::ProcessFailure(
            "recognizer process exited while listening".to_string(),
        ));
    }
    tracing::debug!("Native capture loop exited");
}

fn dispatch(signal: Option<WakeSignal>, callbacks: &Callbacks) {
    match signal {
        Some(WakeSignal::WakeDetected { phrase }) => {
            tracing::info!(phrase, "Wake phrase heard, capturing wish");
            callbacks.emit_partial(PartialResult {
                text: LISTENING_PROMPT.to_string(),
                at: Instant::now(),
            });
        }
        Some(WakeSignal::Partial(text)) => {
            callbacks.emit_partial(PartialResult {
                text,
                at: Instant::now(),
            });
        }
        Some(WakeSignal::Wish(text)) => {
            callbacks.emit_wish(WishEvent {
                text,
                recognized_at: Instant::now(),
                backend: BACKEND_NAME,
            });
        }
        None => {}
    }
}
