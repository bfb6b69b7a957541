//! au-engine: real-time playback engine for Auricle
//!
//! Owns the output stream callback, the EQ/dynamics processing graph
//! and the live analyzer. Control calls validate parameters, mirror
//! them in a shadow copy for reads, and queue them over an SPSC ring
//! for pickup at the next buffer boundary. The audio thread never
//! blocks or allocates.
//!
//! ## Modules
//! - `engine` - PlayerEngine state machine and audio callback
//! - `graph` - Filter Bank -> volume -> Dynamics chain
//! - `analyzer` - FFT spectrum, waveform preview, peak/RMS meters
//! - `params` - control messages for the audio thread
//! - `source` - PCM source trait and in-memory sources
//! - `state` - triple-buffered snapshot publication

pub mod analyzer;
pub mod engine;
pub mod graph;
pub mod params;
pub mod source;
pub mod state;

use thiserror::Error;

use au_audio::AudioError;
use au_dsp::DspError;

/// Engine control errors
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Engine is not initialized")]
    NotInitialized,

    #[error("Engine has been destroyed")]
    Destroyed,

    #[error("Audio device: {0}")]
    Device(#[from] AudioError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(#[from] DspError),

    #[error("Control queue full, command dropped")]
    ControlQueueFull,
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

pub use analyzer::{AnalysisSnapshot, AnalyzerConfig, SpectrumAnalyzer};
pub use engine::{EngineConfig, EngineState, PlayerEngine};
pub use graph::ProcessingGraph;
pub use params::{EngineCommand, ParamUpdate};
pub use source::{MemorySource, PcmSource, SilenceSource};
