use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Capture sample rate. All recognizers consume 16 kHz mono PCM.
pub const SAMPLE_RATE_HZ: u32 = 16_000;

/// Samples per capture frame (128 ms at 16 kHz).
pub const FRAME_SIZE_SAMPLES: usize = 2048;

/// Microphone acquisition and framing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate_hz: u32,
    pub frame_size_samples: usize,
    /// Capacity of the bounded frame channel between the device callback and
    /// the capture thread. Frames are dropped (and counted) when full.
    pub channel_capacity: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate_hz: SAMPLE_RATE_HZ,
            frame_size_samples: FRAME_SIZE_SAMPLES,
            channel_capacity: 32,
        }
    }
}

impl AudioConfig {
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frame_size_samples as f64 / self.sample_rate_hz as f64)
    }
}

/// Energy-VAD and utterance segmentation settings.
///
/// Defaults: mean-absolute-amplitude threshold of 500, a silence run of 15
/// frames or 2 s since the last speech frame to end an utterance, and a
/// 250 ms minimum below which an utterance is discarded as noise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmenterConfig {
    /// Mean absolute amplitude above which a frame counts as speech.
    pub energy_threshold: i16,
    /// Consecutive silent frames that end an utterance.
    pub silence_frame_limit: u32,
    /// Maximum time since the last speech frame before an utterance ends.
    pub speech_timeout: Duration,
    /// Utterances shorter than this are discarded silently.
    pub min_utterance: Duration,
    /// Consecutive device read failures tolerated before the capture loop
    /// stops and raises a device-unavailable condition.
    pub max_consecutive_read_errors: u32,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            energy_threshold: 500,
            silence_frame_limit: 15,
            speech_timeout: Duration::from_millis(2000),
            min_utterance: Duration::from_millis(250),
            max_consecutive_read_errors: 5,
        }
    }
}

impl SegmenterConfig {
    /// Minimum utterance length in samples at the given rate.
    pub fn min_utterance_samples(&self, sample_rate_hz: u32) -> usize {
        (self.min_utterance.as_secs_f64() * sample_rate_hz as f64) as usize
    }
}
