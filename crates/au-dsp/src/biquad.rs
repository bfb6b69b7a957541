//! Biquad filter sections using Transposed Direct Form II
//!
//! TDF-II is numerically optimal for floating-point arithmetic,
//! minimizing quantization noise and ensuring stability.

use au_core::Sample;
use std::f64::consts::PI;

use crate::{DspError, DspResult};

/// Delay state below this magnitude is flushed to zero at block
/// boundaries so decaying tails cannot park in denormal range.
pub const DENORMAL_FLOOR: f64 = 1e-20;

/// Filter section kinds supported by the EQ
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FilterKind {
    Peaking,
    LowShelf,
    HighShelf,
}

/// Biquad coefficients, normalized so a0 = 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BiquadCoeffs {
    pub b0: f64,
    pub b1: f64,
    pub b2: f64,
    pub a1: f64,
    pub a2: f64,
}

impl Default for BiquadCoeffs {
    fn default() -> Self {
        Self::bypass()
    }
}

impl BiquadCoeffs {
    /// Bypass (unity gain, no filtering)
    pub const fn bypass() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
        }
    }

    /// Design a section from the standard cookbook equations.
    ///
    /// Rejects a center frequency outside (0, Nyquist) or a non-positive
    /// Q rather than clamping into an unstable filter.
    pub fn design(
        kind: FilterKind,
        freq: f64,
        q: f64,
        gain_db: f64,
        sample_rate: f64,
    ) -> DspResult<Self> {
        let nyquist = sample_rate * 0.5;
        if !freq.is_finite() || freq <= 0.0 || freq >= nyquist {
            return Err(DspError::InvalidFrequency { freq, nyquist });
        }
        if !q.is_finite() || q <= 0.0 {
            return Err(DspError::InvalidQ(q));
        }

        Ok(match kind {
            FilterKind::Peaking => Self::peaking(freq, q, gain_db, sample_rate),
            FilterKind::LowShelf => Self::low_shelf(freq, q, gain_db, sample_rate),
            FilterKind::HighShelf => Self::high_shelf(freq, q, gain_db, sample_rate),
        })
    }

    /// Peaking EQ coefficients
    pub fn peaking(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);

        let b0 = 1.0 + alpha * a;
        let b1 = -2.0 * cos_omega;
        let b2 = 1.0 - alpha * a;
        let a0 = 1.0 + alpha / a;
        let a1 = -2.0 * cos_omega;
        let a2 = 1.0 - alpha / a;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// Low shelf coefficients
    pub fn low_shelf(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha);
        let b1 = 2.0 * a * ((a - 1.0) - (a + 1.0) * cos_omega);
        let b2 = a * ((a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha);
        let a0 = (a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha;
        let a1 = -2.0 * ((a - 1.0) + (a + 1.0) * cos_omega);
        let a2 = (a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    /// High shelf coefficients
    pub fn high_shelf(freq: f64, q: f64, gain_db: f64, sample_rate: f64) -> Self {
        let a = 10.0_f64.powf(gain_db / 40.0);
        let omega = 2.0 * PI * freq / sample_rate;
        let sin_omega = omega.sin();
        let cos_omega = omega.cos();
        let alpha = sin_omega / (2.0 * q);
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos_omega + two_sqrt_a_alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_omega);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos_omega - two_sqrt_a_alpha);
        let a0 = (a + 1.0) - (a - 1.0) * cos_omega + two_sqrt_a_alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_omega);
        let a2 = (a + 1.0) - (a - 1.0) * cos_omega - two_sqrt_a_alpha;

        Self {
            b0: b0 / a0,
            b1: b1 / a0,
            b2: b2 / a0,
            a1: a1 / a0,
            a2: a2 / a0,
        }
    }

    fn is_bypass(&self) -> bool {
        *self == Self::bypass()
    }
}

/// Per-channel delay state (2 samples)
#[derive(Debug, Clone, Copy, Default)]
pub struct BiquadState {
    pub(crate) z1: f64,
    pub(crate) z2: f64,
}

impl BiquadState {
    #[inline]
    pub fn clear(&mut self) {
        self.z1 = 0.0;
        self.z2 = 0.0;
    }

    /// Flush near-zero state so it cannot linger as a denormal
    #[inline]
    pub fn flush_denormals(&mut self) {
        if self.z1.abs() < DENORMAL_FLOOR {
            self.z1 = 0.0;
        }
        if self.z2.abs() < DENORMAL_FLOOR {
            self.z2 = 0.0;
        }
    }
}

/// Transposed Direct Form II biquad filter (single channel)
#[derive(Debug, Clone, Default)]
pub struct BiquadTDF2 {
    coeffs: BiquadCoeffs,
    state: BiquadState,
}

impl BiquadTDF2 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_coeffs(coeffs: BiquadCoeffs) -> Self {
        Self {
            coeffs,
            state: BiquadState::default(),
        }
    }

    /// Replace coefficients; delay state persists so parameter changes
    /// do not click.
    #[inline]
    pub fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.coeffs = coeffs;
    }

    #[inline]
    pub fn coeffs(&self) -> &BiquadCoeffs {
        &self.coeffs
    }

    #[inline]
    pub fn is_bypass(&self) -> bool {
        self.coeffs.is_bypass()
    }

    #[inline(always)]
    pub fn process_sample(&mut self, input: Sample) -> Sample {
        let output = self.coeffs.b0 * input + self.state.z1;
        self.state.z1 = self.coeffs.b1 * input - self.coeffs.a1 * output + self.state.z2;
        self.state.z2 = self.coeffs.b2 * input - self.coeffs.a2 * output;
        output
    }

    #[inline]
    pub fn reset(&mut self) {
        self.state.clear();
    }

    #[inline]
    pub fn flush_denormals(&mut self) {
        self.state.flush_denormals();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use au_core::gain_to_db;

    /// Steady-state gain of a filter at a given frequency, measured by
    /// driving it with a sinusoid and comparing output amplitude.
    fn measure_gain_db(coeffs: BiquadCoeffs, freq: f64, sample_rate: f64) -> f64 {
        let mut filter = BiquadTDF2::with_coeffs(coeffs);
        let total = (sample_rate as usize) / 2;
        let settle = total / 2;
        let mut peak: f64 = 0.0;
        for i in 0..total {
            let x = (2.0 * PI * freq * i as f64 / sample_rate).sin();
            let y = filter.process_sample(x);
            if i >= settle {
                peak = peak.max(y.abs());
            }
        }
        gain_to_db(peak)
    }

    #[test]
    fn test_bypass_identity() {
        let mut filter = BiquadTDF2::new();
        for x in [0.5, -0.25, 1.0, 0.0] {
            assert_relative_eq!(filter.process_sample(x), x, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_peaking_boost_at_center() {
        let coeffs = BiquadCoeffs::peaking(1000.0, 1.41, 6.0, 48000.0);
        let gain = measure_gain_db(coeffs, 1000.0, 48000.0);
        assert!((gain - 6.0).abs() < 0.5, "center gain {gain} dB");
    }

    #[test]
    fn test_peaking_flat_far_from_center() {
        let coeffs = BiquadCoeffs::peaking(1000.0, 1.41, 12.0, 48000.0);
        let gain = measure_gain_db(coeffs, 31.25, 48000.0);
        assert!(gain.abs() < 0.5, "out-of-band gain {gain} dB");
    }

    #[test]
    fn test_low_shelf_dc_gain() {
        let coeffs = BiquadCoeffs::low_shelf(500.0, 0.707, 6.0, 48000.0);
        let gain = measure_gain_db(coeffs, 20.0, 48000.0);
        assert!((gain - 6.0).abs() < 0.5);
    }

    #[test]
    fn test_design_rejects_bad_params() {
        assert!(BiquadCoeffs::design(FilterKind::Peaking, 0.0, 1.0, 0.0, 48000.0).is_err());
        assert!(BiquadCoeffs::design(FilterKind::Peaking, 24000.0, 1.0, 0.0, 48000.0).is_err());
        assert!(BiquadCoeffs::design(FilterKind::Peaking, 1000.0, 0.0, 0.0, 48000.0).is_err());
        assert!(BiquadCoeffs::design(FilterKind::Peaking, 1000.0, -1.0, 0.0, 48000.0).is_err());
        assert!(BiquadCoeffs::design(FilterKind::Peaking, f64::NAN, 1.0, 0.0, 48000.0).is_err());
    }

    #[test]
    fn test_design_deterministic() {
        let a = BiquadCoeffs::design(FilterKind::Peaking, 1000.0, 1.41, 6.0, 48000.0).unwrap();
        let b = BiquadCoeffs::design(FilterKind::Peaking, 1000.0, 1.41, 6.0, 48000.0).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_state_persists_across_coeff_change() {
        let mut filter =
            BiquadTDF2::with_coeffs(BiquadCoeffs::peaking(1000.0, 1.0, 6.0, 48000.0));
        for i in 0..64 {
            filter.process_sample((i as f64 * 0.1).sin());
        }
        let state_before = filter.state;
        filter.set_coeffs(BiquadCoeffs::peaking(1000.0, 1.0, 3.0, 48000.0));
        assert_eq!(state_before.z1, filter.state.z1);
        assert_eq!(state_before.z2, filter.state.z2);
    }

    #[test]
    fn test_denormal_flush() {
        let mut state = BiquadState {
            z1: 1e-30,
            z2: 0.5,
        };
        state.flush_denormals();
        assert_eq!(state.z1, 0.0);
        assert_eq!(state.z2, 0.5);
    }
}
