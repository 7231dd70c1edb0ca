//! Local audio devices: microphone capture into the outgoing Opus track and
//! playback of the tutor's voice.
//!
//! Both directions run on dedicated threads because `cpal` streams cannot
//! leave the thread that built them. Each thread owns one stream and talks to
//! the async side through a bounded tokio channel and to the device callback
//! through a lock-free ring buffer.

use std::fmt::Display;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use cpal::{
    FromSample, Sample, SampleFormat, SizedSample, StreamConfig,
    traits::{DeviceTrait, HostTrait, StreamTrait},
};
use openai_realtime::{AudioFrame, AudioSource};
use opus::{Application, Channels};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Sample rate of the Opus track negotiated with the gateway.
pub const OPUS_SAMPLE_RATE: u32 = 48_000;

/// Samples per Opus frame: 20 ms at 48 kHz.
pub const FRAME_SAMPLES: usize = 960;

pub const FRAME_DURATION: Duration = Duration::from_millis(20);

/// Largest frame an Opus packet can carry (120 ms at 48 kHz).
const MAX_DECODED_SAMPLES: usize = 5_760;

const MAX_PACKET_BYTES: usize = 4_000;

/// Packets buffered between a device thread and the transport.
const CHANNEL_DEPTH: usize = 64;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("no default {0} device")]
    NoDevice(&'static str),

    #[error("audio device error: {0}")]
    Device(String),

    #[error("unsupported sample format {0:?}")]
    UnsupportedFormat(SampleFormat),

    #[error("opus error: {0}")]
    Codec(#[from] opus::Error),

    #[error("failed to create resampler: {0}")]
    ResamplerSetup(#[from] rubato::ResamplerConstructionError),

    #[error("resampling failed: {0}")]
    Resample(#[from] rubato::ResampleError),
}

impl AudioError {
    fn device(err: impl Display) -> Self {
        Self::Device(err.to_string())
    }
}

fn check_format(format: SampleFormat) -> Result<SampleFormat, AudioError> {
    match format {
        SampleFormat::F32 | SampleFormat::I16 | SampleFormat::U16 => Ok(format),
        other => Err(AudioError::UnsupportedFormat(other)),
    }
}

/// Averages one interleaved frame into a mono sample.
fn mix_frame<T>(frame: &[T]) -> f32
where
    T: Sample,
    f32: FromSample<T>,
{
    if frame.is_empty() {
        return 0.0;
    }
    let sum: f32 = frame.iter().map(|&s| f32::from_sample(s)).sum();
    sum / frame.len() as f32
}

/// Mono sample-rate converter that accepts input of any length.
///
/// Equal rates pass samples through untouched.
pub struct MonoResampler {
    inner: Option<FastFixedIn<f32>>,
    pending: Vec<f32>,
}

impl MonoResampler {
    pub fn new(from_hz: u32, to_hz: u32) -> Result<Self, AudioError> {
        if from_hz == to_hz {
            return Ok(Self {
                inner: None,
                pending: Vec::new(),
            });
        }
        // 10 ms of input per chunk.
        let chunk_size = (from_hz as usize / 100).max(1);
        let inner = FastFixedIn::<f32>::new(
            f64::from(to_hz) / f64::from(from_hz),
            1.0,
            PolynomialDegree::Cubic,
            chunk_size,
            1,
        )?;
        Ok(Self {
            inner: Some(inner),
            pending: Vec::with_capacity(chunk_size * 2),
        })
    }

    /// Converts `input`, keeping any tail shorter than a chunk for the next
    /// call.
    pub fn process(&mut self, input: &[f32]) -> Result<Vec<f32>, AudioError> {
        let Some(inner) = self.inner.as_mut() else {
            return Ok(input.to_vec());
        };
        self.pending.extend_from_slice(input);
        let mut output = Vec::new();
        loop {
            let needed = inner.input_frames_next();
            if self.pending.len() < needed {
                break;
            }
            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            if let Some(mut channel) = inner.process(&[chunk], None)?.pop() {
                output.append(&mut channel);
            }
        }
        Ok(output)
    }
}

/// Cuts 48 kHz mono samples into 20 ms Opus packets.
pub struct OpusFrameEncoder {
    encoder: opus::Encoder,
    pending: Vec<f32>,
    packet: Vec<u8>,
}

impl OpusFrameEncoder {
    pub fn new() -> Result<Self, AudioError> {
        Ok(Self {
            encoder: opus::Encoder::new(OPUS_SAMPLE_RATE, Channels::Mono, Application::Voip)?,
            pending: Vec::with_capacity(FRAME_SAMPLES * 2),
            packet: vec![0; MAX_PACKET_BYTES],
        })
    }

    /// Buffers `samples` and returns every complete frame encoded so far.
    pub fn push(&mut self, samples: &[f32]) -> Result<Vec<Bytes>, AudioError> {
        self.pending.extend_from_slice(samples);
        let mut packets = Vec::new();
        while self.pending.len() >= FRAME_SAMPLES {
            let frame: Vec<f32> = self.pending.drain(..FRAME_SAMPLES).collect();
            let len = self.encoder.encode_float(&frame, &mut self.packet)?;
            packets.push(Bytes::copy_from_slice(&self.packet[..len]));
        }
        Ok(packets)
    }
}

/// Decodes inbound Opus packets to 48 kHz mono.
pub struct OpusFrameDecoder {
    decoder: opus::Decoder,
    pcm: Vec<f32>,
}

impl OpusFrameDecoder {
    pub fn new() -> Result<Self, AudioError> {
        Ok(Self {
            decoder: opus::Decoder::new(OPUS_SAMPLE_RATE, Channels::Mono)?,
            pcm: vec![0.0; MAX_DECODED_SAMPLES],
        })
    }

    pub fn decode(&mut self, packet: &[u8]) -> Result<&[f32], AudioError> {
        let len = self.decoder.decode_float(packet, &mut self.pcm, false)?;
        Ok(&self.pcm[..len])
    }
}

/// The default input device, captured as Opus frames for the local track.
#[derive(Debug, Clone)]
pub struct MicrophoneSource {
    name: String,
    config: StreamConfig,
    format: SampleFormat,
}

impl MicrophoneSource {
    /// Resolves the default input device and its preferred stream format.
    pub fn default_input() -> Result<Self, AudioError> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or(AudioError::NoDevice("input"))?;
        let supported = device.default_input_config().map_err(AudioError::device)?;
        Ok(Self {
            name: device.name().map_err(AudioError::device)?,
            format: check_format(supported.sample_format())?,
            config: supported.config(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn capture(&self, frames: mpsc::Sender<AudioFrame>) -> Result<(), AudioError> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or(AudioError::NoDevice("input"))?;
        let rate = self.config.sample_rate.0;
        // One second of mono audio.
        let (producer, mut consumer) = HeapRb::<f32>::new(rate as usize).split();
        let stream = match self.format {
            SampleFormat::F32 => build_input::<f32>(&device, &self.config, producer)?,
            SampleFormat::I16 => build_input::<i16>(&device, &self.config, producer)?,
            SampleFormat::U16 => build_input::<u16>(&device, &self.config, producer)?,
            other => return Err(AudioError::UnsupportedFormat(other)),
        };
        stream.play().map_err(AudioError::device)?;
        info!(device = %self.name, rate, channels = self.config.channels, "Microphone capture started");

        let mut resampler = MonoResampler::new(rate, OPUS_SAMPLE_RATE)?;
        let mut encoder = OpusFrameEncoder::new()?;
        let mut buf = vec![0.0f32; rate as usize / 50];
        'capture: while !frames.is_closed() {
            let read = consumer.pop_slice(&mut buf);
            if read == 0 {
                thread::sleep(Duration::from_millis(5));
                continue;
            }
            for data in encoder.push(&resampler.process(&buf[..read])?)? {
                let frame = AudioFrame {
                    data,
                    duration: FRAME_DURATION,
                };
                if frames.blocking_send(frame).is_err() {
                    break 'capture;
                }
            }
        }
        info!("Microphone capture stopped");
        Ok(())
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut producer: HeapProd<f32>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let channels = usize::from(config.channels.max(1));
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                for frame in data.chunks_exact(channels) {
                    // A full buffer drops the newest audio.
                    let _ = producer.try_push(mix_frame(frame));
                }
            },
            |e| error!(error = %e, "Input stream error"),
            None,
        )
        .map_err(AudioError::device)
}

impl AudioSource for MicrophoneSource {
    fn start(&self) -> openai_realtime::Result<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let source = self.clone();
        thread::Builder::new()
            .name("tutor-mic".to_string())
            .spawn(move || {
                if let Err(e) = source.capture(tx) {
                    error!(error = %e, "Microphone capture failed");
                }
            })
            .map_err(|e| {
                openai_realtime::Error::Negotiation(format!("failed to start microphone: {}", e))
            })?;
        Ok(rx)
    }
}

/// The default output device, playing Opus payloads from the remote track.
#[derive(Debug, Clone)]
pub struct SpeakerSink {
    name: String,
    config: StreamConfig,
    format: SampleFormat,
}

impl SpeakerSink {
    /// Resolves the default output device and its preferred stream format.
    pub fn default_output() -> Result<Self, AudioError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(AudioError::NoDevice("output"))?;
        let supported = device.default_output_config().map_err(AudioError::device)?;
        Ok(Self {
            name: device.name().map_err(AudioError::device)?,
            format: check_format(supported.sample_format())?,
            config: supported.config(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Starts playback and returns the sender for Opus payloads. Playback
    /// ends once every sender is dropped.
    pub fn start(&self) -> Result<mpsc::Sender<Bytes>, AudioError> {
        let (tx, rx) = mpsc::channel(CHANNEL_DEPTH);
        let sink = self.clone();
        thread::Builder::new()
            .name("tutor-speaker".to_string())
            .spawn(move || {
                if let Err(e) = sink.play(rx) {
                    error!(error = %e, "Playback failed");
                }
            })
            .map_err(AudioError::device)?;
        Ok(tx)
    }

    fn play(&self, mut packets: mpsc::Receiver<Bytes>) -> Result<(), AudioError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or(AudioError::NoDevice("output"))?;
        let rate = self.config.sample_rate.0;
        // Two seconds of mono audio.
        let (mut producer, consumer) = HeapRb::<f32>::new(rate as usize * 2).split();
        let stream = match self.format {
            SampleFormat::F32 => build_output::<f32>(&device, &self.config, consumer)?,
            SampleFormat::I16 => build_output::<i16>(&device, &self.config, consumer)?,
            SampleFormat::U16 => build_output::<u16>(&device, &self.config, consumer)?,
            other => return Err(AudioError::UnsupportedFormat(other)),
        };
        stream.play().map_err(AudioError::device)?;
        info!(device = %self.name, rate, channels = self.config.channels, "Playback started");

        let mut decoder = OpusFrameDecoder::new()?;
        let mut resampler = MonoResampler::new(OPUS_SAMPLE_RATE, rate)?;
        while let Some(packet) = packets.blocking_recv() {
            let pcm = match decoder.decode(&packet) {
                Ok(pcm) => resampler.process(pcm)?,
                Err(e) => {
                    warn!(error = %e, bytes = packet.len(), "Dropping undecodable packet");
                    continue;
                }
            };
            let pushed = producer.push_slice(&pcm);
            if pushed < pcm.len() {
                debug!(dropped = pcm.len() - pushed, "Playback buffer full");
            }
        }
        info!("Playback stopped");
        Ok(())
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &StreamConfig,
    mut consumer: HeapCons<f32>,
) -> Result<cpal::Stream, AudioError>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = usize::from(config.channels.max(1));
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                for frame in data.chunks_mut(channels) {
                    let value = T::from_sample(consumer.try_pop().unwrap_or(0.0));
                    frame.fill(value);
                }
            },
            |e| error!(error = %e, "Output stream error"),
            None,
        )
        .map_err(AudioError::device)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(len: usize, rate: f32) -> Vec<f32> {
        (0..len)
            .map(|i| (i as f32 * 440.0 * std::f32::consts::TAU / rate).sin() * 0.5)
            .collect()
    }

    #[test]
    fn test_mix_frame_averages_channels() {
        assert_eq!(mix_frame(&[0.5f32, -0.5]), 0.0);
        assert_eq!(mix_frame(&[0.25f32, 0.75]), 0.5);
        assert_eq!(mix_frame(&[1.0f32]), 1.0);
        assert_eq!(mix_frame::<f32>(&[]), 0.0);
        assert_eq!(mix_frame(&[0i16, 0]), 0.0);
    }

    #[test]
    fn test_check_format_rejects_wide_integers() {
        assert!(check_format(SampleFormat::F32).is_ok());
        assert!(check_format(SampleFormat::I16).is_ok());
        assert!(matches!(
            check_format(SampleFormat::I64),
            Err(AudioError::UnsupportedFormat(SampleFormat::I64))
        ));
    }

    #[test]
    fn test_resampler_passes_through_equal_rates() {
        let mut resampler = MonoResampler::new(48_000, 48_000).unwrap();
        let input = tone(123, 48_000.0);

        assert_eq!(resampler.process(&input).unwrap(), input);
    }

    #[test]
    fn test_resampler_doubles_rate() {
        let mut resampler = MonoResampler::new(24_000, 48_000).unwrap();

        let out = resampler.process(&tone(4_800, 24_000.0)).unwrap();

        assert!((9_000..=10_200).contains(&out.len()), "got {}", out.len());
    }

    #[test]
    fn test_resampler_holds_partial_chunk() {
        let mut resampler = MonoResampler::new(16_000, 48_000).unwrap();

        // Less than one 10 ms chunk.
        assert!(resampler.process(&tone(100, 16_000.0)).unwrap().is_empty());
        assert!(!resampler.process(&tone(100, 16_000.0)).unwrap().is_empty());
    }

    #[test]
    fn test_encoder_emits_twenty_millisecond_frames() {
        let mut encoder = OpusFrameEncoder::new().unwrap();
        let pcm = tone(2_000, 48_000.0);

        let packets = encoder.push(&pcm).unwrap();
        assert_eq!(packets.len(), 2);
        assert!(packets.iter().all(|p| !p.is_empty()));

        // 80 samples carried over plus 880 completes one more frame.
        assert_eq!(encoder.push(&pcm[..880]).unwrap().len(), 1);
        assert!(encoder.push(&pcm[..10]).unwrap().is_empty());
    }

    #[test]
    fn test_decoder_restores_frame_length() {
        let mut encoder = OpusFrameEncoder::new().unwrap();
        let mut decoder = OpusFrameDecoder::new().unwrap();
        let packets = encoder.push(&tone(FRAME_SAMPLES, 48_000.0)).unwrap();

        let pcm = decoder.decode(&packets[0]).unwrap();

        assert_eq!(pcm.len(), FRAME_SAMPLES);
    }

    #[test]
    fn test_decoder_rejects_garbage() {
        let mut decoder = OpusFrameDecoder::new().unwrap();

        assert!(matches!(
            decoder.decode(&[0xff; 3]),
            Err(AudioError::Codec(_))
        ));
    }
}
