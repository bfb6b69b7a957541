//! au-audio: Audio output using cpal
//!
//! Thin wrapper around the platform audio backend: device discovery and
//! a low-latency output stream that drives the engine callback with
//! interleaved stereo f64 buffers.

mod device;
mod error;
mod stream;

pub use device::*;
pub use error::*;
pub use stream::*;

use au_core::{BufferSize, SampleRate};

/// Output stream configuration
#[derive(Debug, Clone, Copy)]
pub struct AudioConfig {
    pub sample_rate: SampleRate,
    pub buffer_size: BufferSize,
    pub output_channels: u16,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: SampleRate::Hz48000,
            buffer_size: BufferSize::Samples256,
            output_channels: 2,
        }
    }
}
