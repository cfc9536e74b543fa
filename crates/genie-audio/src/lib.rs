//! Audio front-end: device acquisition, fixed-size frame delivery,
//! energy-based voice activity classification, and utterance segmentation.

pub mod device;
pub mod energy;
pub mod segmenter;
pub mod testing;

pub use device::{input_available, MicSource};
pub use energy::EnergyMeter;
pub use segmenter::{SegmentEvent, Utterance, UtteranceSegmenter};

use genie_foundation::AudioError;
use std::time::{Duration, Instant};

/// A fixed-size block of signed 16-bit mono samples.
///
/// Owned exclusively by the capture loop that produced it until handed to a
/// consumer.
#[derive(Debug, Clone)]
pub struct AudioFrame {
    pub samples: Vec<i16>,
    pub captured_at: Instant,
}

/// Source of fixed-size audio frames, read in a blocking loop on a dedicated
/// thread. `Ok(None)` means no frame arrived within the timeout; the caller
/// should re-check its stop flag and try again.
pub trait FrameSource {
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<AudioFrame>, AudioError>;
}

/// Opens a frame source on the thread that will read from it. Device stream
/// handles are not `Send`, so capture threads construct their own source.
pub type SourceFactory =
    std::sync::Arc<dyn Fn() -> Result<Box<dyn FrameSource>, AudioError> + Send + Sync>;
