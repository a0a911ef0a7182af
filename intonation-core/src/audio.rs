//! # Audio Capture Module
//!
//! Audio input collaborators for the tracker. Every source pushes chunks of
//! mono `f32` samples into a channel and reports its sample rate when it
//! starts.
//!
//! ## Sources
//! - [`MicrophoneSource`]: the default input device through CPAL
//! - [`ToneSource`]: a synthetic sine/silence generator paced in real time,
//!   used for tests, demos and as a reference drone

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use cpal::SupportedStreamConfigRange;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use tracing::{debug, info, instrument, warn};

/// Number of samples per analysis window.
///
/// Larger windows resolve lower notes but add latency; 2048 samples at
/// 44.1 kHz cover ~46 ms and notes down to ~43 Hz.
pub const BUFFER_SIZE: usize = 2048;

/// The sample rate requested from input devices.
pub const TARGET_SAMPLE_RATE: u32 = 44_100;

/// Errors which can occur while starting an audio source.
#[derive(thiserror::Error, Debug)]
pub enum CaptureError {
    /// No default input device (no microphone, or access was denied).
    #[error("No input device available")]
    NoInputDevice,

    #[error("Couldn't query the input device: {0}")]
    DeviceName(#[from] cpal::DeviceNameError),

    #[error("Couldn't list the input configurations: {0}")]
    SupportedConfigs(#[from] cpal::SupportedStreamConfigsError),

    #[error("No suitable f32 input format found")]
    NoSupportedConfig,

    #[error("Couldn't open the input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("Couldn't start the input stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    /// The detection worker ended before it could report back.
    #[error("The detection worker exited unexpectedly")]
    WorkerExited,
}

/// An exclusively owned audio input.
pub trait AudioSource {
    /// Starts delivering mono chunks into `frames`.
    ///
    /// Returns the sample rate of the delivered audio.
    fn start(&mut self, frames: Sender<Vec<f32>>) -> Result<u32, CaptureError>;

    /// Stops delivery and releases the device. Calling it again, or on a
    /// source whose start failed, does nothing.
    fn stop(&mut self);
}

impl<S: AudioSource + ?Sized> AudioSource for Box<S> {
    fn start(&mut self, frames: Sender<Vec<f32>>) -> Result<u32, CaptureError> {
        (**self).start(frames)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

/// Captures the default input device.
#[derive(Default)]
pub struct MicrophoneSource {
    stream: Option<cpal::Stream>,
}

impl MicrophoneSource {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioSource for MicrophoneSource {
    #[instrument(name = "MicrophoneSource::start", skip_all)]
    fn start(&mut self, frames: Sender<Vec<f32>>) -> Result<u32, CaptureError> {
        self.stop();

        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .ok_or(CaptureError::NoInputDevice)?;

        info!("Using audio input device: {}", device.name()?);

        let configs = device.supported_input_configs()?.collect::<Vec<_>>();
        let supported_config = find_supported_config(configs, TARGET_SAMPLE_RATE)
            .ok_or(CaptureError::NoSupportedConfig)?;

        let sample_rate = cpal::SampleRate(TARGET_SAMPLE_RATE.clamp(
            supported_config.min_sample_rate().0,
            supported_config.max_sample_rate().0,
        ));
        let config = supported_config.with_sample_rate(sample_rate);
        let channels = config.channels().max(1) as usize;
        let sample_rate_val = config.sample_rate().0;
        let config: cpal::StreamConfig = config.into();

        debug!("Stream config: {:?}", config);

        let err_fn = |err| warn!("An error occurred on the audio stream: {}", err);

        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                let chunk = downmix(data, channels);
                // Never block the audio thread; a full channel drops the chunk.
                let _ = frames.try_send(chunk);
            },
            err_fn,
            None,
        )?;

        stream.play()?;
        self.stream = Some(stream);

        info!("Capturing at {} Hz", sample_rate_val);
        Ok(sample_rate_val)
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                warn!("Error pausing stream: {}", e);
            }
            debug!("Microphone released");
        }
    }
}

impl Drop for MicrophoneSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Averages interleaved channels into one.
fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }
    data.chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect()
}

/// Finds the best supported f32 configuration for the target sample rate,
/// preferring mono and then the closest rate.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| c.sample_format() == cpal::SampleFormat::F32)
        .min_by_key(|c| {
            let rate_distance = if (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&target_rate) {
                0
            } else {
                let min_diff = (c.min_sample_rate().0 as i64 - target_rate as i64).abs();
                let max_diff = (c.max_sample_rate().0 as i64 - target_rate as i64).abs();
                min_diff.min(max_diff)
            };
            (c.channels() != 1, rate_distance)
        })
}

/// One stretch of a [`ToneSource`] schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ToneSegment {
    /// Sine frequency, or `None` for silence.
    pub frequency_hz: Option<f32>,
    pub duration: Duration,
}

impl ToneSegment {
    pub fn tone(frequency_hz: f32, duration: Duration) -> Self {
        Self {
            frequency_hz: Some(frequency_hz),
            duration,
        }
    }

    pub fn silence(duration: Duration) -> Self {
        Self {
            frequency_hz: None,
            duration,
        }
    }
}

/// Generates sine tones and silence in real time.
///
/// The schedule plays once; after the last segment the source keeps
/// delivering silence until stopped. A schedule of a single long tone works
/// as a drone.
pub struct ToneSource {
    schedule: Vec<ToneSegment>,
    sample_rate: u32,
    amplitude: f32,
    chunk: Duration,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl ToneSource {
    pub fn new(schedule: Vec<ToneSegment>) -> Self {
        Self {
            schedule,
            sample_rate: TARGET_SAMPLE_RATE,
            amplitude: 0.5,
            chunk: Duration::from_millis(10),
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    /// A continuous tone.
    pub fn drone(frequency_hz: f32) -> Self {
        Self::new(vec![ToneSegment::tone(frequency_hz, Duration::MAX)])
    }

    pub fn with_amplitude(mut self, amplitude: f32) -> Self {
        self.amplitude = amplitude;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate.max(1);
        self
    }
}

impl AudioSource for ToneSource {
    fn start(&mut self, frames: Sender<Vec<f32>>) -> Result<u32, CaptureError> {
        self.stop();
        self.running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.running);
        let mut generator = ToneGenerator::new(self.schedule.clone(), self.sample_rate, self.amplitude);
        let chunk = self.chunk;
        let chunk_len = ((self.sample_rate as f64 * chunk.as_secs_f64()).round() as usize).max(1);

        self.worker = Some(thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                if frames.send(generator.next_chunk(chunk_len)).is_err() {
                    break;
                }
                thread::sleep(chunk);
            }
        }));

        Ok(self.sample_rate)
    }

    fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Tone generator thread panicked");
            }
        }
    }
}

impl Drop for ToneSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Sample-accurate renderer behind [`ToneSource`].
#[derive(Debug, Clone)]
pub struct ToneGenerator {
    schedule: Vec<ToneSegment>,
    sample_rate: u32,
    amplitude: f32,
    segment: usize,
    segment_pos: u64,
    phase: f64,
}

impl ToneGenerator {
    pub fn new(schedule: Vec<ToneSegment>, sample_rate: u32, amplitude: f32) -> Self {
        Self {
            schedule,
            sample_rate: sample_rate.max(1),
            amplitude,
            segment: 0,
            segment_pos: 0,
            phase: 0.0,
        }
    }

    fn segment_len(&self, segment: &ToneSegment) -> u64 {
        let samples = segment.duration.as_secs_f64() * self.sample_rate as f64;
        if samples >= u64::MAX as f64 { u64::MAX } else { samples.round() as u64 }
    }

    /// Renders the next `len` samples of the schedule.
    pub fn next_chunk(&mut self, len: usize) -> Vec<f32> {
        let mut out = Vec::with_capacity(len);
        while out.len() < len {
            let Some(segment) = self.schedule.get(self.segment).copied() else {
                out.resize(len, 0.0);
                break;
            };
            if self.segment_pos >= self.segment_len(&segment) {
                self.segment += 1;
                self.segment_pos = 0;
                continue;
            }

            let sample = match segment.frequency_hz {
                Some(freq) => {
                    let value = self.amplitude * (self.phase * std::f64::consts::TAU).sin() as f32;
                    self.phase = (self.phase + freq as f64 / self.sample_rate as f64).fract();
                    value
                }
                None => 0.0,
            };
            out.push(sample);
            self.segment_pos += 1;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_channels() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix(&[0.25, 0.75], 1), vec![0.25, 0.75]);
    }

    #[test]
    fn generator_follows_its_schedule() {
        let schedule = vec![
            ToneSegment::silence(Duration::from_millis(10)),
            ToneSegment::tone(441.0, Duration::from_millis(10)),
        ];
        let mut generator = ToneGenerator::new(schedule, 44_100, 0.5);

        let silence = generator.next_chunk(441);
        assert!(silence.iter().all(|&s| s == 0.0));

        let tone = generator.next_chunk(441);
        let peak = tone.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        assert!(peak > 0.49 && peak <= 0.5);

        let after = generator.next_chunk(100);
        assert_eq!(after.len(), 100);
        assert!(after.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn tone_source_streams_until_stopped() {
        let (tx, rx) = crossbeam_channel::unbounded();
        let mut source = ToneSource::drone(440.0);
        assert_eq!(source.start(tx).unwrap(), TARGET_SAMPLE_RATE);

        let chunk = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(chunk.len(), 441);

        source.stop();
        source.stop();
        while rx.try_recv().is_ok() {}
        assert!(rx.recv_timeout(Duration::from_millis(50)).is_err());
    }
}
