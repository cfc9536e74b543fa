use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::{AudioFrame, FrameSource};
use genie_foundation::{AudioConfig, AudioError};

/// Capability probe: is a capture device present and usable?
///
/// Briefly queries the default input device; no stream is kept open.
pub fn input_available() -> bool {
    let host = cpal::default_host();
    match host.default_input_device() {
        Some(device) => device.default_input_config().is_ok(),
        None => false,
    }
}

/// Microphone frame source.
///
/// Owns a cpal input stream requesting 16 kHz mono directly. The device
/// callback assembles fixed-size frames and hands them over a bounded
/// channel; the owning capture thread drains it with `next_frame`. The
/// stream handle is not `Send`, so a `MicSource` must be opened on the
/// thread that reads from it.
pub struct MicSource {
    _stream: cpal::Stream,
    frames: Receiver<AudioFrame>,
    failed: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl MicSource {
    pub fn open(cfg: &AudioConfig) -> Result<Self, AudioError> {
        let host = cpal::default_host();
        let device = host.default_input_device().ok_or(AudioError::NoDevice)?;
        if let Ok(name) = device.name() {
            tracing::info!("Opening input device: {}", name);
        }

        let sample_format = device.default_input_config()?.sample_format();
        let stream_config = StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(cfg.sample_rate_hz),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = bounded(cfg.channel_capacity);
        let failed = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicU64::new(0));

        let failed_cb = Arc::clone(&failed);
        let err_fn = move |err: cpal::StreamError| {
            tracing::error!("Audio stream error: {}", err);
            failed_cb.store(true, Ordering::SeqCst);
        };

        let mut assembler = FrameAssembler::new(cfg.frame_size_samples, tx, Arc::clone(&dropped));
        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                move |data: &[i16], _: &_| assembler.push(data.iter().copied()),
                err_fn,
                None,
            )?,
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                move |data: &[f32], _: &_| {
                    assembler.push(
                        data.iter()
                            .map(|&s| (s.clamp(-1.0, 1.0) * 32767.0).round() as i16),
                    )
                },
                err_fn,
                None,
            )?,
            SampleFormat::U16 => device.build_input_stream(
                &stream_config,
                move |data: &[u16], _: &_| {
                    assembler.push(data.iter().map(|&s| (s as i32 - 32768) as i16))
                },
                err_fn,
                None,
            )?,
            other => {
                return Err(AudioError::FormatNotSupported {
                    format: format!("{:?}", other),
                });
            }
        };
        stream.play()?;

        Ok(Self {
            _stream: stream,
            frames: rx,
            failed,
            dropped,
        })
    }

    /// Frames dropped because the capture thread fell behind.
    pub fn dropped_frames(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl FrameSource for MicSource {
    fn next_frame(&mut self, timeout: Duration) -> Result<Option<AudioFrame>, AudioError> {
        match self.frames.recv_timeout(timeout) {
            Ok(frame) => Ok(Some(frame)),
            Err(RecvTimeoutError::Timeout) => {
                if self.failed.load(Ordering::SeqCst) {
                    Err(AudioError::Disconnected)
                } else {
                    Ok(None)
                }
            }
            Err(RecvTimeoutError::Disconnected) => Err(AudioError::Disconnected),
        }
    }
}

/// Accumulates device callback buffers into fixed-size frames.
struct FrameAssembler {
    carry: Vec<i16>,
    frame_size: usize,
    tx: Sender<AudioFrame>,
    dropped: Arc<AtomicU64>,
}

impl FrameAssembler {
    fn new(frame_size: usize, tx: Sender<AudioFrame>, dropped: Arc<AtomicU64>) -> Self {
        Self {
            carry: Vec::with_capacity(frame_size * 2),
            frame_size,
            tx,
            dropped,
        }
    }

    fn push(&mut self, samples: impl Iterator<Item = i16>) {
        self.carry.extend(samples);
        while self.carry.len() >= self.frame_size {
            let rest = self.carry.split_off(self.frame_size);
            let frame = AudioFrame {
                samples: std::mem::replace(&mut self.carry, rest),
                captured_at: Instant::now(),
            };
            if self.tx.try_send(frame).is_err() {
                // Bounded buffering: shed the frame rather than block the
                // device callback.
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
