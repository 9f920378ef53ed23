use crate::audio::scheduler::OutputSink;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("No default output device found")]
    NoDefaultDevice,
    #[error("Output device not found: {0}")]
    DeviceNotFound(String),
    #[error("Output device does not support {0} Hz f32 playback")]
    UnsupportedRate(u32),
    #[error("Failed to enumerate devices: {0}")]
    Devices(#[from] cpal::DevicesError),
    #[error("Failed to query device configurations: {0}")]
    Configs(#[from] cpal::SupportedStreamConfigsError),
    #[error("Failed to build output stream: {0}")]
    Build(#[from] cpal::BuildStreamError),
    #[error("Failed to start output stream: {0}")]
    Play(#[from] cpal::PlayStreamError),
}

#[derive(Debug)]
pub struct AudioDeviceInfo {
    pub name: String,
    pub is_default: bool,
    pub supported_sample_rates: Vec<(u32, u32)>,
    pub supported_formats: Vec<SampleFormat>,
}

/// A chunk waiting on the output timeline, positioned in frames
#[derive(Debug)]
struct ScheduledChunk {
    start_frame: u64,
    samples: Vec<f32>,
}

impl ScheduledChunk {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }
}

/// Pending chunks shared between the scheduler and the device callback
#[derive(Debug)]
struct Timeline {
    pending: VecDeque<ScheduledChunk>,
    gain: f32,
}

impl Timeline {
    /// Mix every chunk overlapping `[base, base + frames)` into `out`
    ///
    /// `out` is interleaved with `channels` channels; the mono signal is
    /// copied to each of them.
    fn render(&mut self, base: u64, out: &mut [f32], channels: usize) {
        out.fill(0.0);
        let frames = (out.len() / channels) as u64;
        let end = base + frames;

        for chunk in &self.pending {
            if chunk.start_frame >= end || chunk.end_frame() <= base {
                continue;
            }
            let from = chunk.start_frame.max(base);
            let to = chunk.end_frame().min(end);
            for frame in from..to {
                let sample = chunk.samples[(frame - chunk.start_frame) as usize] * self.gain;
                let offset = (frame - base) as usize * channels;
                for slot in &mut out[offset..offset + channels] {
                    *slot += sample;
                }
            }
        }

        self.pending.retain(|chunk| chunk.end_frame() > end);
    }
}

/// Send half of the output: implements `OutputSink` for the scheduler
///
/// The clock is the number of frames the device has consumed.
#[derive(Clone)]
pub struct OutputHandle {
    timeline: Arc<Mutex<Timeline>>,
    frames_played: Arc<AtomicU64>,
    sample_rate: u32,
}

impl OutputHandle {
    /// A timeline with nothing consuming it until a device callback renders
    pub(crate) fn new(sample_rate: u32, gain: f32) -> Self {
        Self {
            timeline: Arc::new(Mutex::new(Timeline {
                pending: VecDeque::new(),
                gain,
            })),
            frames_played: Arc::new(AtomicU64::new(0)),
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn gain(&self) -> f32 {
        self.timeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gain
    }

    /// Applies from the next device callback, including to queued chunks
    pub fn set_gain(&self, gain: f32) {
        self.timeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .gain = gain.max(0.0);
    }

    /// Drop everything not yet played
    pub fn clear(&self) {
        self.timeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .clear();
    }

    fn render(&self, out: &mut [f32], channels: usize) {
        let base = self.frames_played.load(Ordering::Acquire);
        self.timeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .render(base, out, channels);
        self.frames_played
            .fetch_add((out.len() / channels) as u64, Ordering::Release);
    }
}

impl OutputSink for OutputHandle {
    fn now(&self) -> f64 {
        self.frames_played.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn play_at(&mut self, samples: &[f32], start: f64) {
        let start_frame = (start.max(0.0) * self.sample_rate as f64).round() as u64;
        self.timeline
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pending
            .push_back(ScheduledChunk {
                start_frame,
                samples: samples.to_vec(),
            });
    }
}

/// Owns the device stream; dropping it stops playback
pub struct AudioOutput {
    _stream: cpal::Stream,
    handle: OutputHandle,
}

impl AudioOutput {
    /// Open `device_name` (or the default output) at `sample_rate` and start it
    pub fn open(
        device_name: Option<&str>,
        sample_rate: u32,
        gain: f32,
    ) -> Result<Self, OutputError> {
        let device = find_device(device_name)?;
        let config = optimal_config(&device, sample_rate)?;
        let channels = config.channels.max(1) as usize;

        log::info!(
            "Audio output: {} ({} Hz, {} channel(s))",
            device.name().unwrap_or_else(|_| "unknown".to_string()),
            sample_rate,
            channels
        );

        let handle = OutputHandle::new(sample_rate, gain);
        let callback_handle = handle.clone();
        let stream = device.build_output_stream(
            &config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                callback_handle.render(data, channels);
            },
            |err| log::warn!("Audio output stream error: {}", err),
            None,
        )?;
        stream.play()?;

        Ok(Self {
            _stream: stream,
            handle,
        })
    }

    pub fn handle(&self) -> OutputHandle {
        self.handle.clone()
    }
}

fn find_device(name: Option<&str>) -> Result<Device, OutputError> {
    let host = cpal::default_host();
    match name {
        None => host.default_output_device().ok_or(OutputError::NoDefaultDevice),
        Some(name) => host
            .output_devices()?
            .find(|d| d.name().is_ok_and(|n| n == name))
            .ok_or_else(|| OutputError::DeviceNotFound(name.to_string())),
    }
}

/// Find an f32 configuration whose rate range covers the stream rate
///
/// The client does not resample, so the device must run at the server's rate.
fn optimal_config(device: &Device, target_sample_rate: u32) -> Result<StreamConfig, OutputError> {
    let best = device
        .supported_output_configs()?
        .filter(|c| c.sample_format() == SampleFormat::F32)
        .filter(|c| {
            (c.min_sample_rate().0..=c.max_sample_rate().0).contains(&target_sample_rate)
        })
        .min_by_key(|c| c.channels())
        .ok_or(OutputError::UnsupportedRate(target_sample_rate))?;

    Ok(best
        .with_sample_rate(cpal::SampleRate(target_sample_rate))
        .config())
}

pub fn list_devices() -> Result<Vec<AudioDeviceInfo>, OutputError> {
    let host = cpal::default_host();
    let default_name = host.default_output_device().and_then(|d| d.name().ok());

    let mut device_infos = Vec::new();
    for device in host.output_devices()? {
        let name = device.name().unwrap_or("Unknown Device".to_string());
        let is_default = default_name.as_deref() == Some(name.as_str());

        let (supported_sample_rates, supported_formats) = match device.supported_output_configs() {
            Ok(configs) => configs
                .map(|c| {
                    (
                        (c.min_sample_rate().0, c.max_sample_rate().0),
                        c.sample_format(),
                    )
                })
                .unzip(),
            Err(e) => {
                log::debug!("Skipping configs for {}: {}", name, e);
                (Vec::new(), Vec::new())
            }
        };

        device_infos.push(AudioDeviceInfo {
            name,
            is_default,
            supported_sample_rates,
            supported_formats,
        });
    }

    Ok(device_infos)
}
