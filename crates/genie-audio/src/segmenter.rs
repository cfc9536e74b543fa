use std::time::Instant;

use crate::energy::EnergyMeter;
use crate::AudioFrame;
use genie_foundation::SegmenterConfig;

/// A finalized span of speech bounded by silence.
#[derive(Debug, Clone)]
pub struct Utterance {
    pub samples: Vec<i16>,
    pub started_at: Instant,
    pub ended_at: Instant,
}

impl Utterance {
    pub fn duration_samples(&self) -> usize {
        self.samples.len()
    }
}

/// Events produced while segmenting the frame stream.
#[derive(Debug)]
pub enum SegmentEvent {
    /// First speech frame after silence; recording has begun.
    SpeechStarted,
    /// An utterance ended and met the minimum duration.
    Utterance(Utterance),
    /// An utterance ended but was too short; treated as noise.
    Discarded { samples: usize },
}

/// Turns the raw frame stream into discrete utterances.
///
/// While idle, a speech frame starts recording. While recording, every frame
/// (speech or silence) is appended; the utterance ends after a run of
/// consecutive silent frames or once too much time has passed since the last
/// speech frame, whichever comes first. Only one utterance accumulates at a
/// time.
pub struct UtteranceSegmenter {
    cfg: SegmenterConfig,
    meter: EnergyMeter,
    min_samples: usize,
    recording: bool,
    buffer: Vec<i16>,
    silent_frames: u32,
    last_speech: Instant,
    started_at: Instant,
}

impl UtteranceSegmenter {
    pub fn new(cfg: SegmenterConfig, sample_rate_hz: u32) -> Self {
        let meter = EnergyMeter::new(cfg.energy_threshold);
        let min_samples = cfg.min_utterance_samples(sample_rate_hz);
        Self {
            cfg,
            meter,
            min_samples,
            recording: false,
            buffer: Vec::new(),
            silent_frames: 0,
            last_speech: Instant::now(),
            started_at: Instant::now(),
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Feed one frame; returns an event when the segmentation state changes.
    pub fn push_frame(&mut self, frame: &AudioFrame) -> Option<SegmentEvent> {
        let speech = self.meter.is_speech(&frame.samples);

        if !self.recording {
            if !speech {
                return None;
            }
            self.recording = true;
            self.buffer.clear();
            self.buffer.extend_from_slice(&frame.samples);
            self.silent_frames = 0;
            self.last_speech = frame.captured_at;
            self.started_at = frame.captured_at;
            tracing::debug!(level = self.meter.level(&frame.samples), "Speech detected");
            return Some(SegmentEvent::SpeechStarted);
        }

        self.buffer.extend_from_slice(&frame.samples);
        if speech {
            self.silent_frames = 0;
            self.last_speech = frame.captured_at;
            return None;
        }

        self.silent_frames += 1;
        let stalled = frame.captured_at.duration_since(self.last_speech) > self.cfg.speech_timeout;
        if self.silent_frames > self.cfg.silence_frame_limit || stalled {
            return Some(self.finish(frame.captured_at));
        }
        None
    }

    /// Abandon any in-progress utterance, e.g. when the loop stops.
    pub fn reset(&mut self) {
        self.recording = false;
        self.buffer.clear();
        self.silent_frames = 0;
    }

    fn finish(&mut self, ended_at: Instant) -> SegmentEvent {
        self.recording = false;
        self.silent_frames = 0;
        let samples = std::mem::take(&mut self.buffer);
        if samples.len() < self.min_samples {
            tracing::trace!(samples = samples.len(), "Utterance below minimum, discarded");
            return SegmentEvent::Discarded {
                samples: samples.len(),
            };
        }
        SegmentEvent::Utterance(Utterance {
            samples,
            started_at: self.started_at,
            ended_at,
        })
    }
}
