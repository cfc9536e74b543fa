//! Scripted frame sources for exercising capture loops without hardware.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::{AudioFrame, FrameSource};
use genie_foundation::AudioError;

/// A frame with every sample at a clearly-speech amplitude.
pub fn speech_frame(samples: usize) -> AudioFrame {
    AudioFrame {
        samples: vec![4000i16; samples],
        captured_at: Instant::now(),
    }
}

/// A frame of pure silence.
pub fn silent_frame(samples: usize) -> AudioFrame {
    AudioFrame {
        samples: vec![0i16; samples],
        captured_at: Instant::now(),
    }
}

/// One step of a scripted capture session.
pub enum ScriptStep {
    Frame(AudioFrame),
    /// Simulate a transient device read failure.
    ReadError,
}

/// Replays a fixed sequence of frames and errors, then reports no data until
/// the reading loop notices its stop flag.
pub struct ScriptedSource {
    steps: VecDeque<ScriptStep>,
}

impl ScriptedSource {
    pub fn new(steps: Vec<ScriptStep>) -> Self {
        Self {
            steps: steps.into(),
        }
    }

    /// Convenience: a burst of speech frames followed by enough silence to
    /// finalize an utterance.
    pub fn utterance(speech_frames: usize, silence_frames: usize, frame_len: usize) -> Self {
        let mut steps = Vec::new();
        for _ in 0..speech_frames {
            steps.push(ScriptStep::Frame(speech_frame(frame_len)));
        }
        for _ in 0..silence_frames {
            steps.push(ScriptStep::Frame(silent_frame(frame_len)));
        }
        Self::new(steps)
    }

    pub fn push(&mut self, step: ScriptStep) {
        self.steps.push_back(step);
    }
}

impl FrameSource for ScriptedSource {
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<AudioFrame>, AudioError> {
        match self.steps.pop_front() {
            Some(ScriptStep::Frame(frame)) => Ok(Some(frame)),
            Some(ScriptStep::ReadError) => Err(AudioError::Disconnected),
            None => {
                // Emulate a blocking read that times out with no data.
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }
}
