//! Output stream wrapper
//!
//! Owns the cpal stream and adapts the device layout (f32, any channel
//! count) to the engine callback's interleaved stereo f64 buffers.

use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{
    BufferSize as CpalBufferSize, Device, SampleFormat, Stream, StreamConfig,
    SupportedStreamConfig,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use au_core::Sample;

use crate::{AudioConfig, AudioError, AudioResult};

/// Engine callback: fill an interleaved stereo f64 buffer
pub type OutputCallback = Box<dyn FnMut(&mut [Sample]) + Send + 'static>;

/// Output stream wrapper
pub struct OutputStream {
    _stream: Stream,
    running: Arc<AtomicBool>,
    config: AudioConfig,
}

impl OutputStream {
    /// Build an output stream on the given device.
    ///
    /// The callback runs on the audio thread; it must not block or
    /// allocate.
    pub fn new(
        device: &Device,
        config: AudioConfig,
        callback: OutputCallback,
    ) -> AudioResult<Self> {
        let supported = output_stream_config(device, &config)?;
        let stream = build_output_stream(device, &supported, &config, callback)?;
        Ok(Self {
            _stream: stream,
            running: Arc::new(AtomicBool::new(false)),
            config,
        })
    }

    /// Start the stream
    pub fn start(&self) -> AudioResult<()> {
        self._stream
            .play()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        self.running.store(true, Ordering::Release);
        Ok(())
    }

    /// Stop the stream
    pub fn stop(&self) -> AudioResult<()> {
        self._stream
            .pause()
            .map_err(|e| AudioError::StreamError(e.to_string()))?;
        self.running.store(false, Ordering::Release);
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &AudioConfig {
        &self.config
    }
}

fn output_stream_config(
    device: &Device,
    config: &AudioConfig,
) -> AudioResult<SupportedStreamConfig> {
    let sample_rate = cpal::SampleRate(config.sample_rate.as_u32());

    let configs = device
        .supported_output_configs()
        .map_err(|e| AudioError::ConfigError(e.to_string()))?;

    for supported in configs {
        if supported.channels() >= config.output_channels
            && supported.min_sample_rate() <= sample_rate
            && supported.max_sample_rate() >= sample_rate
            && supported.sample_format() == SampleFormat::F32
        {
            return Ok(supported.with_sample_rate(sample_rate));
        }
    }

    Err(AudioError::ConfigError(format!(
        "No matching output config for {} channels @ {} Hz",
        config.output_channels,
        config.sample_rate.as_u32()
    )))
}

fn build_output_stream(
    device: &Device,
    supported_config: &SupportedStreamConfig,
    config: &AudioConfig,
    mut callback: OutputCallback,
) -> AudioResult<Stream> {
    let channels = supported_config.channels() as usize;

    let stream_config = StreamConfig {
        channels: supported_config.channels(),
        sample_rate: supported_config.sample_rate(),
        buffer_size: CpalBufferSize::Fixed(config.buffer_size.as_usize() as u32),
    };

    // Pre-allocated stereo scratch; sized for the largest block cpal
    // may deliver if the fixed buffer size request is not honored.
    let mut scratch = vec![0.0f64; config.buffer_size.as_usize() * 2 * 4];

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                let frames = data.len() / channels;
                let needed = frames * 2;
                if needed > scratch.len() {
                    // Degrade to silence rather than allocate here.
                    data.fill(0.0);
                    return;
                }

                let buffer = &mut scratch[..needed];
                buffer.fill(0.0);
                callback(buffer);

                match channels {
                    1 => {
                        for (i, sample) in data.iter_mut().enumerate() {
                            *sample = ((buffer[i * 2] + buffer[i * 2 + 1]) * 0.5) as f32;
                        }
                    }
                    2 => {
                        for (i, sample) in data.iter_mut().enumerate() {
                            *sample = buffer[i] as f32;
                        }
                    }
                    _ => {
                        for (i, chunk) in data.chunks_mut(channels).enumerate() {
                            chunk[0] = buffer[i * 2] as f32;
                            chunk[1] = buffer[i * 2 + 1] as f32;
                            for sample in chunk.iter_mut().skip(2) {
                                *sample = 0.0;
                            }
                        }
                    }
                }
            },
            move |err| {
                log::error!("Audio output stream error: {err}");
            },
            None,
        )
        .map_err(|e| AudioError::StreamBuildError(e.to_string()))?;

    Ok(stream)
}
