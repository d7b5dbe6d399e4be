//! Fixed-size frame capture and RMS loudness
//!
//! cpal delivers audio through a callback on its own thread. The callback
//! converts whatever the device produces to i16 and forwards chunks over a
//! bounded channel; [`CpalSampler::next_frame`] reassembles them into frames
//! of exactly `frame_size × channels` interleaved samples. When the channel
//! is full the chunk is dropped and counted, and the next read reports
//! [`CaptureError::Overrun`].

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{SampleFormat, StreamConfig};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::config::AudioConfig;
use crate::constants::{CAPTURE_CHUNK_CAPACITY, READ_TIMEOUT};
use crate::error::CaptureError;

/// Blocking source of fixed-size i16 frames
pub trait FrameSource {
    /// Block until a full frame is available
    fn next_frame(&mut self) -> Result<Vec<i16>, CaptureError>;
}

/// Root-mean-square of a frame, in i16 sample units
pub fn rms(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum / samples.len() as f64).sqrt() as f32
}

fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16
}

fn u16_to_i16(sample: u16) -> i16 {
    (sample as i32 - 32768) as i16
}

/// Frame source backed by a live cpal input stream
///
/// The stream is released when the sampler is dropped. cpal streams are not
/// `Send` on every platform, so the sampler must be opened on the thread
/// that reads from it.
pub struct CpalSampler {
    _stream: cpal::Stream,
    chunks: Receiver<Vec<i16>>,
    errors: Receiver<CaptureError>,
    dropped: Arc<AtomicUsize>,
    pending: Vec<i16>,
    frame_len: usize,
    read_timeout: Duration,
}

impl CpalSampler {
    /// Open and start an input stream on `device`
    pub fn open(device: &cpal::Device, config: &AudioConfig) -> Result<Self, CaptureError> {
        let default_config = device.default_input_config()?;
        let sample_format = default_config.sample_format();

        let stream_config = StreamConfig {
            channels: config.channels,
            sample_rate: cpal::SampleRate(config.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (chunk_tx, chunk_rx) = bounded::<Vec<i16>>(CAPTURE_CHUNK_CAPACITY);
        let (error_tx, error_rx) = bounded::<CaptureError>(16);
        let dropped = Arc::new(AtomicUsize::new(0));

        let on_error = move |err: cpal::StreamError| {
            let _ = error_tx.try_send(CaptureError::StreamError(err.to_string()));
        };

        let stream = match sample_format {
            SampleFormat::I16 => device.build_input_stream(
                &stream_config,
                forward(chunk_tx, dropped.clone(), |s: &i16| *s),
                on_error,
                None,
            )?,
            SampleFormat::F32 => device.build_input_stream(
                &stream_config,
                forward(chunk_tx, dropped.clone(), |s: &f32| f32_to_i16(*s)),
                on_error,
                None,
            )?,
            SampleFormat::U16 => device.build_input_stream(
                &stream_config,
                forward(chunk_tx, dropped.clone(), |s: &u16| u16_to_i16(*s)),
                on_error,
                None,
            )?,
            other => {
                return Err(CaptureError::UnsupportedFormat(format!("{:?}", other)));
            }
        };

        stream.play()?;

        tracing::info!(
            "Capturing {}Hz, {} channel(s), {:?} samples, {} samples/frame",
            config.sample_rate,
            config.channels,
            sample_format,
            config.frame_size
        );

        Ok(Self {
            _stream: stream,
            chunks: chunk_rx,
            errors: error_rx,
            dropped,
            pending: Vec::with_capacity(config.samples_per_frame() * 2),
            frame_len: config.samples_per_frame(),
            read_timeout: READ_TIMEOUT,
        })
    }
}

/// Build a data callback converting samples to i16 and forwarding them
fn forward<T, F>(
    tx: Sender<Vec<i16>>,
    dropped: Arc<AtomicUsize>,
    convert: F,
) -> impl FnMut(&[T], &cpal::InputCallbackInfo) + Send + 'static
where
    T: Send + 'static,
    F: Fn(&T) -> i16 + Send + 'static,
{
    move |data: &[T], _: &cpal::InputCallbackInfo| {
        let chunk: Vec<i16> = data.iter().map(&convert).collect();
        let len = chunk.len();
        if tx.try_send(chunk).is_err() {
            dropped.fetch_add(len, Ordering::Relaxed);
        }
    }
}

impl FrameSource for CpalSampler {
    fn next_frame(&mut self) -> Result<Vec<i16>, CaptureError> {
        if let Ok(err) = self.errors.try_recv() {
            return Err(err);
        }

        let dropped = self.dropped.swap(0, Ordering::Relaxed);
        if dropped > 0 {
            // Partial frame no longer lines up with the stream
            self.pending.clear();
            return Err(CaptureError::Overrun { dropped });
        }

        while self.pending.len() < self.frame_len {
            match self.chunks.recv_timeout(self.read_timeout) {
                Ok(chunk) => self.pending.extend_from_slice(&chunk),
                Err(RecvTimeoutError::Timeout) => return Err(CaptureError::Timeout),
                Err(RecvTimeoutError::Disconnected) => return Err(CaptureError::Disconnected),
            }
        }

        Ok(self.pending.drain(..self.frame_len).collect())
    }
}

impl Drop for CpalSampler {
    fn drop(&mut self) {
        tracing::debug!("Releasing capture stream");
    }
}
