use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, Stream};

/// Microphone recorder over the default input device. The cpal stream runs
/// for the lifetime of the recorder; samples are downmixed to mono f32 in
/// the input callback and accumulated while the recording flag is set.
pub struct Recorder {
    stream: Stream,
    state: Arc<RecorderState>,
    input_sample_rate: u32,
}

#[derive(Default)]
struct RecorderState {
    buffer: Mutex<Vec<f32>>,
    recording: AtomicBool,
}

impl Recorder {
    pub fn open() -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_input_device()
            .context("no default audio input device found")?;

        let supported_config = device
            .default_input_config()
            .context("no supported input config for default audio device")?;

        let sample_format = supported_config.sample_format();
        let config: cpal::StreamConfig = supported_config.into();
        let input_sample_rate = config.sample_rate.0;
        let channels = config.channels as usize;

        let state = Arc::new(RecorderState::default());
        let stream = match sample_format {
            SampleFormat::F32 => build_input_stream_f32(&device, &config, state.clone(), channels)?,
            SampleFormat::I16 => build_input_stream_i16(&device, &config, state.clone(), channels)?,
            SampleFormat::U16 => build_input_stream_u16(&device, &config, state.clone(), channels)?,
            other => return Err(anyhow!("unsupported input sample format: {other:?}")),
        };

        stream
            .play()
            .context("failed to start audio capture stream")?;

        Ok(Self {
            stream,
            state,
            input_sample_rate,
        })
    }

    pub fn input_sample_rate(&self) -> u32 {
        self.input_sample_rate
    }

    pub fn start(&self) {
        {
            let mut buffer = self.state.buffer.lock().expect("recorder buffer poisoned");
            buffer.clear();
        }
        self.state.recording.store(true, Ordering::SeqCst);
    }

    pub fn stop(&self) -> Result<Vec<f32>> {
        if !self.state.recording.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("recorder was not active"));
        }

        // Let the callback drain any buffered frames.
        thread::sleep(Duration::from_millis(50));

        let mut buffer = self.state.buffer.lock().expect("recorder buffer poisoned");
        Ok(std::mem::take(&mut *buffer))
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        self.state.recording.store(false, Ordering::SeqCst);
        let _ = self.stream.pause();
    }
}

fn build_input_stream_f32(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    state: Arc<RecorderState>,
    channels: usize,
) -> Result<Stream> {
    let err_fn = |err| tracing::error!("audio input stream error: {err}");

    let stream = device.build_input_stream(
        config,
        move |data: &[f32], _| {
            if !state.recording.load(Ordering::Relaxed) {
                return;
            }

            let mut buffer = state.buffer.lock().expect("recorder buffer poisoned");
            for frame in data.chunks(channels) {
                let mut sum = 0.0f32;
                for &sample in frame {
                    sum += sample.clamp(-1.0, 1.0);
                }
                buffer.push(sum / channels as f32);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

fn build_input_stream_i16(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    state: Arc<RecorderState>,
    channels: usize,
) -> Result<Stream> {
    let err_fn = |err| tracing::error!("audio input stream error: {err}");

    let stream = device.build_input_stream(
        config,
        move |data: &[i16], _| {
            if !state.recording.load(Ordering::Relaxed) {
                return;
            }

            let mut buffer = state.buffer.lock().expect("recorder buffer poisoned");
            for frame in data.chunks(channels) {
                let mut sum = 0.0f32;
                for &sample in frame {
                    sum += (sample as f32 / i16::MAX as f32).clamp(-1.0, 1.0);
                }
                buffer.push(sum / channels as f32);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

fn build_input_stream_u16(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    state: Arc<RecorderState>,
    channels: usize,
) -> Result<Stream> {
    let err_fn = |err| tracing::error!("audio input stream error: {err}");

    let stream = device.build_input_stream(
        config,
        move |data: &[u16], _| {
            if !state.recording.load(Ordering::Relaxed) {
                return;
            }

            let mut buffer = state.buffer.lock().expect("recorder buffer poisoned");
            for frame in data.chunks(channels) {
                let mut sum = 0.0f32;
                for &sample in frame {
                    let normalized = (sample as f32 / u16::MAX as f32) * 2.0 - 1.0;
                    sum += normalized.clamp(-1.0, 1.0);
                }
                buffer.push(sum / channels as f32);
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}
