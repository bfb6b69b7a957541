//! Control messages for the audio thread
//!
//! Every change the control API makes to playback or DSP parameters
//! travels through a single SPSC ring so the audio thread applies them
//! in submission order at a buffer boundary. Messages are `Copy` and
//! carry no heap data.

use au_dsp::eq::{ParametricBand, GRAPHIC_BAND_COUNT};

/// A validated DSP parameter change
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamUpdate {
    GraphicBandGain { index: usize, gain_db: f64 },
    GraphicBandGains([f64; GRAPHIC_BAND_COUNT]),
    SetParametricBand { id: u64, band: ParametricBand },
    RemoveParametricBand { id: u64 },
    ClearParametric,
    ResetEq,
    Preamp(f64),
    LimiterThreshold(f64),
    LimiterRatio(f64),
    EqEnabled(bool),
    Volume(f64),
}

/// Transport and parameter commands consumed by the audio callback
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EngineCommand {
    Play,
    Pause,
    /// Stop playback, rewind to frame zero and clear filter state
    Stop,
    /// Jump to an absolute frame position
    Seek(u64),
    Param(ParamUpdate),
}

/// Command ring capacity. Large enough that a burst of slider moves
/// between two callbacks never drops an update.
pub(crate) const COMMAND_QUEUE_CAPACITY: usize = 512;
