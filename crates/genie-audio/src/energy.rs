/// Energy-based speech/silence classification over 16-bit PCM frames.
///
/// The metric is the mean absolute amplitude of the frame, matching what the
/// recognizer backends were tuned against (threshold around 500 for typical
/// microphone input).
#[derive(Debug, Clone, Copy)]
pub struct EnergyMeter {
    threshold: i16,
}

impl EnergyMeter {
    pub fn new(threshold: i16) -> Self {
        Self { threshold }
    }

    /// Mean absolute amplitude of the frame.
    pub fn level(&self, samples: &[i16]) -> i16 {
        if samples.is_empty() {
            return 0;
        }
        let sum: i64 = samples.iter().map(|&s| (s as i64).abs()).sum();
        (sum / samples.len() as i64) as i16
    }

    /// Whether the frame counts as speech.
    pub fn is_speech(&self, samples: &[i16]) -> bool {
        self.level(samples) > self.threshold
    }
}
