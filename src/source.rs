/// Audio source module
///
/// Abstracts a blocking microphone stream producing normalized PCM samples.
/// The cpal backend feeds a lock-free ring buffer from the device callback;
/// the reader half blocks until samples are available.

use cache_padded::CachePadded;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

/// Ring buffer capacity between the device callback and the capture loop,
/// in seconds of audio.
const RING_DURATION_SECS: usize = 3;

#[derive(Error, Debug)]
pub enum AudioError {
    #[error("audio capture initialization failed: {0}")]
    Init(String),

    #[error("no audio input device available")]
    DeviceUnavailable,

    #[error("unsupported capture format: {0}")]
    UnsupportedFormat(String),

    #[error("capture read failed: {0}")]
    Read(String),
}

/// Channel layout of the capture stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channels {
    Mono,
    Stereo,
}

/// Sample encoding delivered by the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitDepth {
    Pcm16,
    Float32,
}

/// Capture stream format requested at open time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub channels: Channels,
    pub bit_depth: BitDepth,
}

impl CaptureFormat {
    pub fn new(sample_rate: u32, channels: Channels, bit_depth: BitDepth) -> Self {
        Self {
            sample_rate,
            channels,
            bit_depth,
        }
    }

    /// Validate format parameters. Only mono capture is supported.
    pub fn validate(&self) -> Result<(), AudioError> {
        if self.sample_rate == 0 {
            return Err(AudioError::UnsupportedFormat(
                "sample rate must be greater than 0".to_string(),
            ));
        }

        if self.channels != Channels::Mono {
            return Err(AudioError::UnsupportedFormat(
                "only mono capture is supported".to_string(),
            ));
        }

        Ok(())
    }
}

impl Default for CaptureFormat {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: Channels::Mono,
            bit_depth: BitDepth::Pcm16,
        }
    }
}

/// Blocking source of normalized samples in [-1.0, 1.0].
///
/// `read` blocks until at least one sample is available and writes samples to
/// the front of `buf`, returning the count. A read error means that call's
/// samples are lost; callers retry.
pub trait AudioSource {
    fn read(&mut self, buf: &mut [f32]) -> Result<usize, AudioError>;
}

type RingBuffer = HeapRb<f32>;
type RingProducer = <RingBuffer as Split>::Prod;
type RingConsumer = <RingBuffer as Split>::Cons;

/// Handle that keeps the cpal input stream alive.
///
/// cpal streams are not `Send`, so the handle stays on the thread that opened
/// the device while the `MicrophoneSource` reader half moves into the
/// capture worker. Dropping the handle ends capture.
pub struct Microphone {
    _stream: cpal::Stream,
}

/// Reader half of the microphone: a `Send` blocking source over the ring
/// buffer filled by the device callback.
pub struct MicrophoneSource {
    consumer: CachePadded<RingConsumer>,
}

impl MicrophoneSource {
    /// Open the default input device with the requested format.
    ///
    /// Fails with `AudioError::Init` / `DeviceUnavailable` when the device is
    /// missing or cannot be configured, before any session thread exists.
    pub fn open(format: CaptureFormat) -> Result<(Microphone, MicrophoneSource), AudioError> {
        format.validate()?;

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(AudioError::DeviceUnavailable)?;

        debug!(
            "Opening input device: {} Hz, {:?}, {:?}",
            format.sample_rate, format.channels, format.bit_depth
        );

        let stream_config = cpal::StreamConfig {
            channels: 1,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let rb = RingBuffer::new(format.sample_rate as usize * RING_DURATION_SECS);
        let (producer, consumer) = rb.split();

        let err_fn = |err: cpal::StreamError| {
            warn!("input stream error: {}", err);
        };

        let stream = match format.bit_depth {
            BitDepth::Float32 => {
                let mut producer = CachePadded::new(producer);
                device.build_input_stream(
                    &stream_config,
                    move |data: &[f32], _: &cpal::InputCallbackInfo| {
                        push_samples(&mut producer, data);
                    },
                    err_fn,
                    None,
                )
            }
            BitDepth::Pcm16 => {
                let mut producer = CachePadded::new(producer);
                let mut scratch = Vec::new();
                device.build_input_stream(
                    &stream_config,
                    move |data: &[i16], _: &cpal::InputCallbackInfo| {
                        scratch.clear();
                        scratch.extend(data.iter().map(|&s| s as f32 / i16::MAX as f32));
                        push_samples(&mut producer, &scratch);
                    },
                    err_fn,
                    None,
                )
            }
        }
        .map_err(|e| AudioError::Init(e.to_string()))?;

        stream.play().map_err(|e| AudioError::Init(e.to_string()))?;

        Ok((
            Microphone { _stream: stream },
            MicrophoneSource {
                consumer: CachePadded::new(consumer),
            },
        ))
    }
}

fn push_samples(producer: &mut CachePadded<RingProducer>, data: &[f32]) {
    let written = producer.push_slice(data);
    if written < data.len() {
        warn!(
            "capture ring buffer full, dropping {} samples",
            data.len() - written
        );
    }
}

impl AudioSource for MicrophoneSource {
    fn read(&mut self, buf: &mut [f32]) -> Result<usize, AudioError> {
        loop {
            let n = self.consumer.pop_slice(buf);
            if n > 0 {
                return Ok(n);
            }

            // Device callback has not produced anything yet.
            std::thread::park_timeout(Duration::from_millis(2));
        }
    }
}
