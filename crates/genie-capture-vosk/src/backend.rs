//! The offline capture loop.
//!
//! A dedicated thread opens the microphone, streams every frame into the
//! recognizer, and feeds the recognizer's partial and final text through a
//! [`WakeDetector`]. The recognizer usually finalizes utterances itself;
//! a trailing-silence timer force-finalizes a pending wish when the speaker
//! simply stops talking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use genie_audio::{EnergyMeter, SourceFactory};
use genie_capture::{
    AvailabilityProbe, Callbacks, ErrorCallback, PartialCallback, PartialResult, VoiceCapture,
    WishCallback, WishEvent,
};
use genie_foundation::{AudioConfig, CaptureError};
use genie_wake::{WakeDetector, WakeSignal, WakeState, LISTENING_PROMPT};

use crate::recognizer::{Decoding, StreamingRecognizer};

const BACKEND_NAME: &str = "Vosk (offline)";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub type RecognizerFactory =
    Arc<dyn Fn() -> Result<Box<dyn StreamingRecognizer>, CaptureError> + Send + Sync>;

#[derive(Debug, Clone)]
pub struct VoskConfig {
    pub audio: AudioConfig,
    /// Mean absolute amplitude above which a frame counts as sound.
    pub energy_threshold: i16,
    /// Silence after the last sound before a pending wish is force-finalized.
    pub trailing_silence: Duration,
    /// Consecutive device read failures tolerated before the loop stops.
    pub max_consecutive_read_errors: u32,
}

impl Default for VoskConfig {
    fn default() -> Self {
        Self {
            audio: AudioConfig::default(),
            energy_threshold: 500,
            trailing_silence: Duration::from_millis(1500),
            max_consecutive_read_errors: 5,
        }
    }
}

pub struct VoskCapture {
    config: VoskConfig,
    make_source: SourceFactory,
    make_recognizer: RecognizerFactory,
    probe: AvailabilityProbe,
    callbacks: Callbacks,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl VoskCapture {
    /// Build the production backend: real microphone, real Vosk model.
    #[cfg(feature = "vosk")]
    pub fn new(config: VoskConfig) -> Self {
        use crate::model::locate_model;
        use crate::recognizer::VoskRecognizer;
        use genie_audio::MicSource;

        let audio = config.audio.clone();
        let make_source: SourceFactory = Arc::new(move || {
            MicSource::open(&audio).map(|s| Box::new(s) as Box<dyn genie_audio::FrameSource>)
        });
        let sample_rate_hz = config.audio.sample_rate_hz;
        let make_recognizer: RecognizerFactory = Arc::new(move || {
            let path = locate_model().ok_or_else(|| {
                CaptureError::ProcessFailure("no Vosk model installed".to_string())
            })?;
            let recognizer = VoskRecognizer::new(&path, sample_rate_hz)?;
            Ok(Box::new(recognizer) as Box<dyn StreamingRecognizer>)
        });
        let probe: AvailabilityProbe =
            Arc::new(|| locate_model().is_some() && genie_audio::input_available());
        Self::with_parts(config, make_source, make_recognizer, probe)
    }

    /// Build a backend from injected parts. Used by tests and by hosts that
    /// supply their own audio plumbing.
    pub fn with_parts(
        config: VoskConfig,
        make_source: SourceFactory,
        make_recognizer: RecognizerFactory,
        probe: AvailabilityProbe,
    ) -> Self {
        Self {
            config,
            make_source,
            make_recognizer,
            probe,
            callbacks: Callbacks::new(),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl VoiceCapture for VoskCapture {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn is_available(&self) -> bool {
        (self.probe)()
    }

    fn start_listening(&mut self) -> Result<(), CaptureError> {
        if self.is_listening() {
            return Ok(());
        }
        self.stop = Arc::new(AtomicBool::new(false));
        let stop = self.stop.clone();
        let config = self.config.clone();
        let make_source = self.make_source.clone();
        let make_recognizer = self.make_recognizer.clone();
        let callbacks = self.callbacks.clone();
        self.worker = Some(
            std::thread::Builder::new()
                .name("vosk-capture".to_string())
                .spawn(move || run_capture(config, make_source, make_recognizer, callbacks, stop))
                .map_err(|e| CaptureError::ProcessFailure(e.to_string()))?,
        );
        tracing::info!("Offline capture started");
        Ok(())
    }

    fn stop_listening(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("Offline capture thread panicked");
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

impl Drop for VoskCapture {
    fn drop(&mut self) {
        self.stop_listening();
    }
}

fn run_capture(
    config: VoskConfig,
    make_source: SourceFactory,
    make_recognizer: RecognizerFactory,
    callbacks: Callbacks,
    stop: Arc<AtomicBool>,
) {
    let mut source = match make_source() {
        Ok(source) => source,
        Err(e) => {
            callbacks.emit_error(&CaptureError::DeviceUnavailable(e));
            return;
        }
    };
    let mut recognizer = match make_recognizer() {
        Ok(recognizer) => recognizer,
        Err(e) => {
            callbacks.emit_error(&e);
            return;
        }
    };

    let meter = EnergyMeter::new(config.energy_threshold);
    let mut detector = WakeDetector::new();
    let mut last_sound = Instant::now();
    let mut last_partial = String::new();
    let mut consecutive_errors = 0u32;

    while !stop.load(Ordering::Relaxed) {
        match source.next_frame(POLL_INTERVAL) {
            Ok(Some(frame)) => {
                consecutive_errors = 0;
                if meter.is_speech(&frame.samples) {
                    last_sound = frame.captured_at;
                }
                match recognizer.accept_frame(&frame.samples) {
                    Ok(Decoding::Finalized) => {
                        last_partial.clear();
                        let text = recognizer.final_text();
                        dispatch(detector.observe_final(&text), &callbacks);
                    }
                    Ok(Decoding::Running) => {
                        let partial = recognizer.partial_text();
                        if !partial.is_empty() && partial != last_partial {
                            last_partial = partial.clone();
                            dispatch(detector.observe_partial(&partial), &callbacks);
                        }
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Recognizer rejected a frame");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => {
                consecutive_errors += 1;
                tracing::warn!(
                    error = %e,
                    consecutive = consecutive_errors,
                    "Audio read failed"
                );
                if consecutive_errors >= config.max_consecutive_read_errors {
                    callbacks.emit_error(&CaptureError::DeviceUnavailable(e));
                    break;
                }
            }
        }

        // Speaker went quiet mid-wish: flush the recognizer and finish.
        if detector.state() == WakeState::AwaitingWish
            && last_sound.elapsed() >= config.trailing_silence
        {
            last_partial.clear();
            let remainder = recognizer.flush();
            dispatch(detector.observe_final(&remainder), &callbacks);
            dispatch(detector.finalize(), &callbacks);
        }
    }
    tracing::debug!("Offline capture loop exited");
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

#[cfg(test)]
mod tests {
    use super::*;
    use genie_audio::testing::{speech_frame, ScriptStep, ScriptedSource};
    use genie_audio::FrameSource;
    use genie_capture::{event_channel, CaptureEvent};
    use std::collections::VecDeque;
    use std::sync::Mutex;

    enum RecStep {
        Partial(&'static str),
        Final(&'static str),
        Fail,
    }

    struct ScriptRecognizer {
        steps: VecDeque<RecStep>,
        partial: String,
        finalized: String,
    }

    impl ScriptRecognizer {
        fn new(steps: Vec<RecStep>) -> Self {
            Self {
                steps: steps.into(),
                partial: String::new(),
                finalized: String::new(),
            }
        }
    }

    impl StreamingRecognizer for ScriptRecognizer {
        fn accept_frame(&mut self, _samples: &[i16]) -> Result<Decoding, String> {
            match self.steps.pop_front() {
                Some(RecStep::Partial(text)) => {
                    self.partial = text.to_string();
                    Ok(Decoding::Running)
                }
                Some(RecStep::Final(text)) => {
                    self.partial.clear();
                    self.finalized = text.to_string();
                    Ok(Decoding::Finalized)
                }
                Some(RecStep::Fail) => Err("scripted failure".to_string()),
                None => Ok(Decoding::Running),
            }
        }

        fn partial_text(&mut self) -> String {
            self.partial.clone()
        }

        fn final_text(&mut self) -> String {
            std::mem::take(&mut self.finalized)
        }

        fn flush(&mut self) -> String {
            self.finalized.clear();
            std::mem::take(&mut self.partial)
        }
    }

    fn test_config() -> VoskConfig {
        VoskConfig {
            trailing_silence: Duration::from_millis(20),
            max_consecutive_read_errors: 3,
            ..VoskConfig::default()
        }
    }

    fn backend_with(
        config: VoskConfig,
        source_steps: Vec<ScriptStep>,
        rec_steps: Vec<RecStep>,
    ) -> VoskCapture {
        let sources = Arc::new(Mutex::new(VecDeque::from([ScriptedSource::new(
            source_steps,
        )])));
        let recognizers = Arc::new(Mutex::new(VecDeque::from([ScriptRecognizer::new(
            rec_steps,
        )])));
        VoskCapture::with_parts(
            config,
            Arc::new(move || {
                let source = sources.lock().unwrap().pop_front().expect("source script");
                Ok(Box::new(source) as Box<dyn FrameSource>)
            }),
            Arc::new(move || {
                let rec = recognizers
                    .lock()
                    .unwrap()
                    .pop_front()
                    .expect("recognizer script");
                Ok(Box::new(rec) as Box<dyn StreamingRecognizer>)
            }),
            Arc::new(|| true),
        )
    }

    #[test]
    fn wake_then_silence_yields_a_wish() {
        let mut backend = backend_with(
            test_config(),
            vec![
                ScriptStep::Frame(speech_frame(2048)),
                ScriptStep::Frame(speech_frame(2048)),
            ],
            vec![
                RecStep::Partial("hey genie"),
                RecStep::Final("hey genie what is rust"),
            ],
        );
        let (sender, rx) = event_channel();
        backend.set_on_partial_result(sender.partial_callback());
        backend.set_on_wish_recognized(sender.wish_callback());
        backend.start_listening().unwrap();

        let mut partials = Vec::new();
        let wish = loop {
            match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                CaptureEvent::Partial(p) => partials.push(p.text),
                CaptureEvent::Wish(w) => break w,
                other => panic!("unexpected event: {other:?}"),
            }
        };
        backend.stop_listening();

        assert_eq!(partials.first().map(String::as_str), Some(LISTENING_PROMPT));
        assert_eq!(wish.text, "rust");
        assert_eq!(wish.backend, BACKEND_NAME);
    }

    #[test]
    fn recognizer_failure_is_tolerated() {
        let mut backend = backend_with(
            test_config(),
            vec![
                ScriptStep::Frame(speech_frame(2048)),
                ScriptStep::Frame(speech_frame(2048)),
            ],
            vec![RecStep::Fail, RecStep::Final("hey genie hello")],
        );
        let (sender, rx) = event_channel();
        backend.set_on_partial_result(sender.partial_callback());
        backend.set_on_wish_recognized(sender.wish_callback());
        backend.start_listening().unwrap();

        let wish = loop {
            match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                CaptureEvent::Wish(w) => break w,
                CaptureEvent::Partial(_) => {}
                other => panic!("unexpected event: {other:?}"),
            }
        };
        backend.stop_listening();
        assert_eq!(wish.text, "hello");
    }

    #[test]
    fn repeated_read_errors_stop_the_loop() {
        let mut backend = backend_with(
            test_config(),
            vec![
                ScriptStep::ReadError,
                ScriptStep::ReadError,
                ScriptStep::ReadError,
            ],
            vec![],
        );
        let (sender, rx) = event_channel();
        backend.set_on_error(sender.error_callback());
        backend.start_listening().unwrap();

        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            CaptureEvent::Fault { message } => {
                assert!(message.to_lowercase().contains("audio"), "{message}");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        backend.stop_listening();
        assert!(!backend.is_listening());
    }

    #[test]
    fn start_listening_is_idempotent() {
        let mut backend = backend_with(test_config(), vec![], vec![]);
        backend.start_listening().unwrap();
        assert!(backend.is_listening());
        backend.start_listening().unwrap();
        backend.stop_listening();
        assert!(!backend.is_listening());
    }

    #[test]
    fn stop_then_start_resumes_listening() {
        let sources = Arc::new(Mutex::new(VecDeque::from([
            ScriptedSource::new(vec![ScriptStep::Frame(speech_frame(2048))]),
            ScriptedSource::new(vec![ScriptStep::Frame(speech_frame(2048))]),
        ])));
        let recognizers = Arc::new(Mutex::new(VecDeque::from([
            ScriptRecognizer::new(vec![RecStep::Final("hey genie first wish")]),
            ScriptRecognizer::new(vec![RecStep::Final("hey genie second wish")]),
        ])));
        let mut backend = VoskCapture::with_parts(
            test_config(),
            Arc::new(move || {
                let source = sources.lock().unwrap().pop_front().expect("source script");
                Ok(Box::new(source) as Box<dyn FrameSource>)
            }),
            Arc::new(move || {
                let rec = recognizers
                    .lock()
                    .unwrap()
                    .pop_front()
                    .expect("recognizer script");
                Ok(Box::new(rec) as Box<dyn StreamingRecognizer>)
            }),
            Arc::new(|| true),
        );
        let (sender, rx) = event_channel();
        backend.set_on_wish_recognized(sender.wish_callback());

        backend.start_listening().unwrap();
        let first = loop {
            match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                CaptureEvent::Wish(w) => break w,
                _ => {}
            }
        };
        backend.stop_listening();
        assert!(!backend.is_listening());

        // A fresh session on the same instance picks up where it left off.
        backend.start_listening().unwrap();
        assert!(backend.is_listening());
        let second = loop {
            match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                CaptureEvent::Wish(w) => break w,
                _ => {}
            }
        };
        backend.stop_listening();

        assert_eq!(first.text, "first wish");
        assert_eq!(second.text, "second wish");
    }

    #[test]
    fn source_failure_surfaces_as_device_error() {
        let config = test_config();
        let mut backend = VoskCapture::with_parts(
            config,
            Arc::new(|| Err(genie_foundation::AudioError::NoDevice)),
            Arc::new(|| {
                Ok(Box::new(ScriptRecognizer::new(vec![])) as Box<dyn StreamingRecognizer>)
            }),
            Arc::new(|| false),
        );
        assert!(!backend.is_available());
        let (sender, rx) = event_channel();
        backend.set_on_error(sender.error_callback());
        backend.start_listening().unwrap();

        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            CaptureEvent::Fault { .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
        backend.stop_listening();
    }
}
