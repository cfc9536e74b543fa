//! The cloud capture loop.
//!
//! Each finished utterance is encoded to WAV and sent for transcription on
//! the same capture thread, so recognition stalls never block the device
//! callback (frames keep flowing into the bounded channel and are shed if
//! the upload takes too long). Transcripts arrive one utterance at a time,
//! so wake detection here works on whole utterances: a wake phrase with
//! trailing text becomes a wish immediately, a bare wake phrase arms the
//! detector for the next utterance.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use genie_audio::{SegmentEvent, SourceFactory, Utterance, UtteranceSegmenter};
use genie_capture::{
    AvailabilityProbe, Callbacks, ErrorCallback, PartialCallback, PartialResult, VoiceCapture,
    WishCallback, WishEvent,
};
use genie_foundation::{AudioConfig, CaptureError, SegmenterConfig};
use genie_wake::{WakeDetector, WakeSignal, WakeState, LISTENING_PROMPT};

use crate::client::{transcribe_with_retry, RetryConfig, TranscriptionService, WhisperClient};
use crate::wav::encode_wav;

const BACKEND_NAME: &str = "OpenAI Whisper (cloud)";
const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Clone)]
pub struct WhisperConfig {
    pub api_key: Option<String>,
    pub audio: AudioConfig,
    pub segmenter: SegmenterConfig,
    pub retry: RetryConfig,
    /// Consecutive unreachable-network failures across utterances before the
    /// backend disables itself for the session. Rate limits and server
    /// errors never count; they only cost the affected utterance.
    pub session_failure_budget: u32,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            audio: AudioConfig::default(),
            segmenter: SegmenterConfig::default(),
            retry: RetryConfig::default(),
            session_failure_budget: 5,
        }
    }
}

impl WhisperConfig {
    /// Default configuration with the API key taken from `OPENAI_API_KEY`.
    pub fn from_env() -> Self {
        Self {
            api_key: std::env::var(API_KEY_ENV).ok().filter(|k| !k.is_empty()),
            ..Self::default()
        }
    }
}

pub struct WhisperCapture {
    config: WhisperConfig,
    service: Option<Arc<dyn TranscriptionService>>,
    make_source: SourceFactory,
    probe: AvailabilityProbe,
    callbacks: Callbacks,
    stop: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl WhisperCapture {
    /// Build the production backend: real microphone, real Whisper client.
    pub fn new(config: WhisperConfig) -> Result<Self, CaptureError> {
        let service = match &config.api_key {
            Some(key) => Some(Arc::new(WhisperClient::new(key.clone())?)
                as Arc<dyn TranscriptionService>),
            None => None,
        };
        let audio = config.audio.clone();
        let make_source: SourceFactory = Arc::new(move || {
            genie_audio::MicSource::open(&audio)
                .map(|s| Box::new(s) as Box<dyn genie_audio::FrameSource>)
        });
        let have_key = service.is_some();
        let probe: AvailabilityProbe =
            Arc::new(move || have_key && genie_audio::input_available());
        Ok(Self::with_parts(config, service, make_source, probe))
    }

    pub fn with_parts(
        config: WhisperConfig,
        service: Option<Arc<dyn TranscriptionService>>,
        make_source: SourceFactory,
        probe: AvailabilityProbe,
    ) -> Self {
        Self {
            config,
            service,
            make_source,
            probe,
            callbacks: Callbacks::new(),
            stop: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }
}

impl VoiceCapture for WhisperCapture {
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
        let Some(service) = self.service.clone() else {
            return Err(CaptureError::ServiceUnauthorized(
                "no API key configured".to_string(),
            ));
        };
        self.stop = Arc::new(AtomicBool::new(false));
        let stop = self.stop.clone();
        let config = self.config.clone();
        let make_source = self.make_source.clone();
        let callbacks = self.callbacks.clone();
        self.worker = Some(
            std::thread::Builder::new()
                .name("whisper-capture".to_string())
                .spawn(move || run_capture(config, make_source, service, callbacks, stop))
                .map_err(|e| CaptureError::ProcessFailure(e.to_string()))?,
        );
        tracing::info!("Cloud capture started");
        Ok(())
    }

    fn stop_listening(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                tracing::error!("Cloud capture thread panicked");
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
        // Drops the HTTP client; a later restart needs a fresh instance.
        self.service = None;
    }
}

impl Drop for WhisperCapture {
    fn drop(&mut self) {
        self.stop_listening();
    }
}

fn run_capture(
    config: WhisperConfig,
    make_source: SourceFactory,
    service: Arc<dyn TranscriptionService>,
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
    let mut segmenter =
        UtteranceSegmenter::new(config.segmenter.clone(), config.audio.sample_rate_hz);
    let mut detector = WakeDetector::new();
    let mut consecutive_read_errors = 0u32;
    let mut session_failures = 0u32;

    while !stop.load(Ordering::Relaxed) {
        match source.next_frame(POLL_INTERVAL) {
            Ok(Some(frame)) => {
                consecutive_read_errors = 0;
                match segmenter.push_frame(&frame) {
                    Some(SegmentEvent::SpeechStarted) => {
                        tracing::debug!("Speech started");
                    }
                    Some(SegmentEvent::Discarded { samples }) => {
                        tracing::debug!(samples, "Discarded short utterance");
                    }
                    Some(SegmentEvent::Utterance(utterance)) => {
                        match transcribe_utterance(&utterance, &*service, &config) {
                            Ok(text) => {
                                session_failures = 0;
                                handle_transcript(&mut detector, &text, &callbacks);
                            }
                            Err(err) if err.counts_toward_session_budget() => {
                                session_failures += 1;
                                tracing::warn!(
                                    error = %err,
                                    consecutive = session_failures,
                                    "Transcription failed, utterance lost"
                                );
                                if session_failures >= config.session_failure_budget {
                                    callbacks.emit_error(&err);
                                    break;
                                }
                            }
                            Err(err @ CaptureError::ServiceUnauthorized(_)) => {
                                callbacks.emit_error(&err);
                                break;
                            }
                            Err(err) => {
                                tracing::warn!(error = %err, "Dropping utterance");
                            }
                        }
                    }
                    None => {}
                }
            }
            Ok(None) => {}
            Err(e) => {
                consecutive_read_errors += 1;
                tracing::warn!(
                    error = %e,
                    consecutive = consecutive_read_errors,
                    "Audio read failed"
                );
                if consecutive_read_errors >= config.segmenter.max_consecutive_read_errors {
                    callbacks.emit_error(&CaptureError::DeviceUnavailable(e));
                    break;
                }
            }
        }
    }
    tracing::debug!("Cloud capture loop exited");
}

fn transcribe_utterance(
    utterance: &Utterance,
    service: &dyn TranscriptionService,
    config: &WhisperConfig,
) -> Result<String, CaptureError> {
    let wav = encode_wav(&utterance.samples, config.audio.sample_rate_hz)?;
    tracing::debug!(
        samples = utterance.samples.len(),
        bytes = wav.len(),
        "Uploading utterance"
    );
    transcribe_with_retry(service, &wav, &config.retry)
}

/// Whole-utterance wake handling: the transcript either wakes the detector
/// (finalizing immediately when wish text followed the wake phrase) or, if
/// the detector is already armed, completes the pending wish.
fn handle_transcript(detector: &mut WakeDetector, text: &str, callbacks: &Callbacks) {
    match detector.state() {
        WakeState::Idle => {
            if let Some(WakeSignal::WakeDetected { phrase }) = detector.observe_final(text) {
                tracing::info!(phrase, "Wake phrase heard");
                if detector.has_pending_text() {
                    dispatch(detector.finalize(), callbacks);
                } else {
                    callbacks.emit_partial(PartialResult {
                        text: LISTENING_PROMPT.to_string(),
                        at: Instant::now(),
                    });
                }
            }
        }
        WakeState::AwaitingWish => {
            detector.observe_final(text);
            dispatch(detector.finalize(), callbacks);
        }
    }
}

fn dispatch(signal: Option<WakeSignal>, callbacks: &Callbacks) {
    match signal {
        Some(WakeSignal::Wish(text)) => {
            callbacks.emit_wish(WishEvent {
                text,
                recognized_at: Instant::now(),
                backend: BACKEND_NAME,
            });
        }
        Some(WakeSignal::Partial(text)) => {
            callbacks.emit_partial(PartialResult {
                text,
                at: Instant::now(),
            });
        }
        Some(WakeSignal::WakeDetected { .. }) | None => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use genie_audio::testing::{ScriptStep, ScriptedSource};
    use genie_audio::FrameSource;
    use genie_capture::{event_channel, CaptureEvent};
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct ScriptedService {
        outcomes: Mutex<VecDeque<Result<String, CaptureError>>>,
        calls: Mutex<u32>,
    }

    impl ScriptedService {
        fn new(outcomes: Vec<Result<String, CaptureError>>) -> Arc<Self> {
            Arc::new(Self {
                outcomes: Mutex::new(outcomes.into()),
                calls: Mutex::new(0),
            })
        }

        fn calls(&self) -> u32 {
            *self.calls.lock()
        }
    }

    impl TranscriptionService for ScriptedService {
        fn transcribe(&self, _wav: &[u8]) -> Result<String, CaptureError> {
            *self.calls.lock() += 1;
            self.outcomes
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(CaptureError::ServiceTransient("exhausted".into())))
        }
    }

    fn test_config() -> WhisperConfig {
        WhisperConfig {
            api_key: Some("test-key".into()),
            segmenter: SegmenterConfig {
                silence_frame_limit: 2,
                min_utterance: Duration::from_millis(100),
                max_consecutive_read_errors: 3,
                ..SegmenterConfig::default()
            },
            retry: RetryConfig {
                max_retries: 2,
                delay: Duration::from_millis(1),
            },
            session_failure_budget: 2,
            ..WhisperConfig::default()
        }
    }

    fn backend_with(
        config: WhisperConfig,
        source: ScriptedSource,
        service: Arc<ScriptedService>,
    ) -> WhisperCapture {
        let sources = Arc::new(Mutex::new(VecDeque::from([source])));
        WhisperCapture::with_parts(
            config,
            Some(service),
            Arc::new(move || {
                let source = sources.lock().pop_front().expect("source script");
                Ok(Box::new(source) as Box<dyn FrameSource>)
            }),
            Arc::new(|| true),
        )
    }

    /// Speech then enough silence to close the utterance.
    fn one_utterance() -> Vec<ScriptStep> {
        let mut steps = Vec::new();
        for _ in 0..3 {
            steps.push(ScriptStep::Frame(genie_audio::testing::speech_frame(2048)));
        }
        for _ in 0..4 {
            steps.push(ScriptStep::Frame(genie_audio::testing::silent_frame(2048)));
        }
        steps
    }

    #[test]
    fn wake_with_wish_in_one_utterance() {
        let service = ScriptedService::new(vec![Ok("hey genie what time is it".into())]);
        let mut backend = backend_with(
            test_config(),
            ScriptedSource::new(one_utterance()),
            service.clone(),
        );
        let (sender, rx) = event_channel();
        backend.set_on_wish_recognized(sender.wish_callback());
        backend.set_on_partial_result(sender.partial_callback());
        backend.start_listening().unwrap();

        let wish = loop {
            match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                CaptureEvent::Wish(w) => break w,
                CaptureEvent::Partial(_) => {}
                other => panic!("unexpected event: {other:?}"),
            }
        };
        backend.stop_listening();

        assert_eq!(wish.text, "what time is it");
        assert_eq!(wish.backend, BACKEND_NAME);
        assert_eq!(service.calls(), 1);
    }

    #[test]
    fn bare_wake_arms_for_the_next_utterance() {
        let service = ScriptedService::new(vec![
            Ok("hey genie".into()),
            Ok("how are you".into()),
        ]);
        let mut steps = one_utterance();
        steps.extend(one_utterance());
        let mut backend =
            backend_with(test_config(), ScriptedSource::new(steps), service.clone());
        let (sender, rx) = event_channel();
        backend.set_on_wish_recognized(sender.wish_callback());
        backend.set_on_partial_result(sender.partial_callback());
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

        assert_eq!(partials, vec![LISTENING_PROMPT.to_string()]);
        assert_eq!(wish.text, "how are you");
        assert_eq!(service.calls(), 2);
    }

    #[test]
    fn unauthorized_disables_the_backend() {
        let service = ScriptedService::new(vec![Err(CaptureError::ServiceUnauthorized(
            "invalid key".into(),
        ))]);
        let mut backend = backend_with(
            test_config(),
            ScriptedSource::new(one_utterance()),
            service.clone(),
        );
        let (sender, rx) = event_channel();
        backend.set_on_error(sender.error_callback());
        backend.start_listening().unwrap();

        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            CaptureEvent::Fault { message } => assert!(message.contains("invalid key")),
            other => panic!("unexpected event: {other:?}"),
        }
        backend.stop_listening();
        assert!(!backend.is_listening());
        assert_eq!(service.calls(), 1);
    }

    #[test]
    fn rate_limited_utterances_do_not_disable_the_backend() {
        // Three utterances: two rejected with 429/500, then a success. The
        // loop must survive the rejections and still deliver the wish.
        let mut config = test_config();
        config.retry.max_retries = 0;
        config.session_failure_budget = 2;
        let service = ScriptedService::new(vec![
            Err(CaptureError::ServiceTransient("rate limited: 429".into())),
            Err(CaptureError::ServiceTransient("http 500".into())),
            Ok("hey genie ping".into()),
        ]);
        let mut steps = one_utterance();
        steps.extend(one_utterance());
        steps.extend(one_utterance());
        let mut backend = backend_with(config, ScriptedSource::new(steps), service.clone());
        let (sender, rx) = event_channel();
        backend.set_on_wish_recognized(sender.wish_callback());
        backend.set_on_error(sender.error_callback());
        backend.start_listening().unwrap();

        let wish = loop {
            match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
                CaptureEvent::Wish(w) => break w,
                CaptureEvent::Partial(_) => {}
                CaptureEvent::Fault { message } => {
                    panic!("transient failures must not raise a fault: {message}")
                }
            }
        };
        backend.stop_listening();
        assert_eq!(wish.text, "ping");
        assert_eq!(service.calls(), 3);
    }

    #[test]
    fn repeated_network_failures_exhaust_the_session_budget() {
        // Budget of 2 and retries disabled: two lost utterances disable the loop.
        let mut config = test_config();
        config.retry.max_retries = 0;
        let service = ScriptedService::new(vec![
            Err(CaptureError::NetworkUnreachable("connect refused".into())),
            Err(CaptureError::NetworkUnreachable("connect refused".into())),
        ]);
        let mut steps = one_utterance();
        steps.extend(one_utterance());
        let mut backend = backend_with(config, ScriptedSource::new(steps), service.clone());
        let (sender, rx) = event_channel();
        backend.set_on_error(sender.error_callback());
        backend.start_listening().unwrap();

        match rx.recv_timeout(Duration::from_secs(2)).unwrap() {
            CaptureEvent::Fault { .. } => {}
            other => panic!("unexpected event: {other:?}"),
        }
        backend.stop_listening();
        assert_eq!(service.calls(), 2);
    }

    #[test]
    fn short_utterances_never_reach_the_service() {
        // One speech frame (128 ms) against a 500 ms minimum.
        let mut config = test_config();
        config.segmenter.min_utterance = Duration::from_millis(500);
        config.segmenter.silence_frame_limit = 1;
        let service = ScriptedService::new(vec![]);
        let steps = vec![
            ScriptStep::Frame(genie_audio::testing::speech_frame(2048)),
            ScriptStep::Frame(genie_audio::testing::silent_frame(2048)),
            ScriptStep::Frame(genie_audio::testing::silent_frame(2048)),
        ];
        let mut backend = backend_with(config, ScriptedSource::new(steps), service.clone());
        backend.start_listening().unwrap();
        std::thread::sleep(Duration::from_millis(300));
        backend.stop_listening();
        assert_eq!(service.calls(), 0);
    }

    #[test]
    fn starting_without_a_key_fails() {
        let mut backend = WhisperCapture::with_parts(
            WhisperConfig::default(),
            None,
            Arc::new(|| Err(genie_foundation::AudioError::NoDevice)),
            Arc::new(|| false),
        );
        assert!(!backend.is_available());
        assert!(matches!(
            backend.start_listening(),
            Err(CaptureError::ServiceUnauthorized(_))
        ));
    }
}
