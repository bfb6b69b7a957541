//! au-dsp: DSP processors for the Auricle playback chain
//!
//! ## Modules
//! - `biquad` - TDF-II biquad sections (peaking, shelving)
//! - `eq` - FilterBank: 10-band graphic EQ plus parametric bands
//! - `dynamics` - Preamp gain and feed-forward limiter

pub mod biquad;
pub mod dynamics;
pub mod eq;

use au_core::Sample;
use thiserror::Error;

/// DSP configuration errors
///
/// Invalid filter requests are rejected with the target band left
/// unchanged; they are never clamped into an unstable filter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DspError {
    #[error("Center frequency {freq} Hz outside (0, {nyquist}) Hz")]
    InvalidFrequency { freq: f64, nyquist: f64 },

    #[error("Q must be positive and finite, got {0}")]
    InvalidQ(f64),

    #[error("Graphic EQ band index {0} out of range")]
    InvalidBandIndex(usize),

    #[error("Parametric band table full ({0} bands)")]
    TooManyBands(usize),
}

/// Result type for DSP operations
pub type DspResult<T> = Result<T, DspError>;

/// Trait for all DSP processors
pub trait Processor: Send {
    /// Reset processor state (delay lines), parameters unchanged
    fn reset(&mut self);
}

/// Block processor over interleaved audio
pub trait BlockProcessor: Processor {
    /// Process an interleaved buffer in place
    fn process_block(&mut self, buffer: &mut [Sample], channels: usize);
}

/// Processor configuration for sample rate changes
pub trait ProcessorConfig {
    fn set_sample_rate(&mut self, sample_rate: f64);
}
