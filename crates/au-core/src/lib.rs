//! au-core: Shared types and utilities for the Auricle audio engine
//!
//! Foundational definitions used across all Auricle crates: the sample
//! type, standard sample rates and buffer sizes, and gain conversions.

mod sample;

pub use sample::*;

/// Standard sample rate options
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum SampleRate {
    Hz44100 = 44100,
    Hz48000 = 48000,
    Hz88200 = 88200,
    Hz96000 = 96000,
    Hz192000 = 192000,
}

impl SampleRate {
    #[inline]
    pub fn as_f64(self) -> f64 {
        self as u32 as f64
    }

    #[inline]
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Nyquist frequency in Hz
    #[inline]
    pub fn nyquist(self) -> f64 {
        self.as_f64() * 0.5
    }
}

impl Default for SampleRate {
    fn default() -> Self {
        Self::Hz48000
    }
}

/// Buffer size options for the output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u32)]
pub enum BufferSize {
    Samples64 = 64,
    Samples128 = 128,
    Samples256 = 256,
    Samples512 = 512,
    Samples1024 = 1024,
    Samples2048 = 2048,
}

impl BufferSize {
    #[inline]
    pub fn as_usize(self) -> usize {
        self as u32 as usize
    }
}

impl Default for BufferSize {
    fn default() -> Self {
        Self::Samples256
    }
}

/// Convert decibels to linear gain
#[inline]
pub fn db_to_gain(db: f64) -> f64 {
    if db <= -144.0 {
        0.0
    } else {
        10.0_f64.powf(db / 20.0)
    }
}

/// Convert linear gain to decibels
#[inline]
pub fn gain_to_db(gain: f64) -> f64 {
    if gain <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * gain.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_gain_round_trip() {
        for db in [-24.0, -12.0, -6.0, 0.0, 6.0, 12.0] {
            let gain = db_to_gain(db);
            assert!((gain_to_db(gain) - db).abs() < 1e-9);
        }
    }

    #[test]
    fn test_unity_gain() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_nyquist() {
        assert_eq!(SampleRate::Hz48000.nyquist(), 24000.0);
    }
}
