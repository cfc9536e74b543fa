//! In-memory WAV encoding for API upload.

use std::io::Cursor;

use genie_foundation::CaptureError;

/// Encode mono S16LE samples as a complete WAV file in memory.
pub fn encode_wav(samples: &[i16], sample_rate_hz: u32) -> Result<Vec<u8>, CaptureError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: sample_rate_hz,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)
            .map_err(|e| CaptureError::MalformedOutput(format!("wav encode: {e}")))?;
        for &sample in samples {
            writer
                .write_sample(sample)
                .map_err(|e| CaptureError::MalformedOutput(format!("wav encode: {e}")))?;
        }
        writer
            .finalize()
            .map_err(|e| CaptureError::MalformedOutput(format!("wav encode: {e}")))?;
    }
    Ok(cursor.into_inner())
}
