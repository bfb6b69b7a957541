//! Preamp gain and feed-forward limiter
//!
//! The limiter is hard-knee: excess over the threshold is scaled by
//! 1/ratio, and the final output is clamped to [-1, 1]. It is stateless
//! beyond its three parameters, so steady-state behavior is exactly the
//! threshold/ratio contract.

use au_core::Sample;

use crate::{BlockProcessor, Processor};

/// Preamp gain range (linear)
pub const PREAMP_RANGE: (f64, f64) = (0.1, 3.0);

/// Limiter threshold range (linear)
pub const THRESHOLD_RANGE: (f64, f64) = (0.1, 1.0);

/// Limiter ratio range
pub const RATIO_RANGE: (f64, f64) = (1.0, 20.0);

/// Dynamics parameters, read once per processing block
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DynamicsParams {
    pub preamp_gain: f64,
    pub limiter_threshold: f64,
    pub limiter_ratio: f64,
}

impl Default for DynamicsParams {
    fn default() -> Self {
        Self {
            preamp_gain: 1.0,
            limiter_threshold: 0.95,
            limiter_ratio: 10.0,
        }
    }
}

/// Preamp + limiter stage of the playback chain
#[derive(Debug, Clone, Default)]
pub struct DynamicsProcessor {
    params: DynamicsParams,
}

impl DynamicsProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_preamp(&mut self, gain: f64) {
        self.params.preamp_gain = gain.clamp(PREAMP_RANGE.0, PREAMP_RANGE.1);
    }

    pub fn set_limiter_threshold(&mut self, threshold: f64) {
        self.params.limiter_threshold = threshold.clamp(THRESHOLD_RANGE.0, THRESHOLD_RANGE.1);
    }

    pub fn set_limiter_ratio(&mut self, ratio: f64) {
        self.params.limiter_ratio = ratio.clamp(RATIO_RANGE.0, RATIO_RANGE.1);
    }

    pub fn params(&self) -> DynamicsParams {
        self.params
    }

    #[inline(always)]
    fn limit(&self, sample: Sample) -> Sample {
        let t = self.params.limiter_threshold;
        let abs = sample.abs();
        let out = if abs > t {
            let limited = t + (abs - t) / self.params.limiter_ratio;
            sample.signum() * limited
        } else {
            sample
        };
        out.clamp(-1.0, 1.0)
    }
}

impl Processor for DynamicsProcessor {
    fn reset(&mut self) {
        // Stateless beyond parameters.
    }
}

impl BlockProcessor for DynamicsProcessor {
    fn process_block(&mut self, buffer: &mut [Sample], _channels: usize) {
        let gain = self.params.preamp_gain;
        for sample in buffer.iter_mut() {
            *sample = self.limit(*sample * gain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_preamp_below_threshold() {
        let mut dyn_proc = DynamicsProcessor::new();
        dyn_proc.set_preamp(2.0);
        dyn_proc.set_limiter_threshold(0.9);
        let mut buf = vec![0.1, -0.2, 0.3];
        dyn_proc.process_block(&mut buf, 1);
        assert_relative_eq!(buf[0], 0.2, epsilon = 1e-12);
        assert_relative_eq!(buf[1], -0.4, epsilon = 1e-12);
        assert_relative_eq!(buf[2], 0.6, epsilon = 1e-12);
    }

    #[test]
    fn test_limiter_bound() {
        let mut dyn_proc = DynamicsProcessor::new();
        dyn_proc.set_preamp(1.0);
        dyn_proc.set_limiter_threshold(0.5);
        dyn_proc.set_limiter_ratio(4.0);

        for input in [0.6, 0.8, 1.0, -0.75, -1.0] {
            let mut buf = vec![input];
            dyn_proc.process_block(&mut buf, 1);
            let bound = 0.5 + (input.abs() - 0.5) / 4.0;
            assert!(buf[0].abs() <= bound + 1e-12, "input {input} out {}", buf[0]);
            assert!(buf[0].abs() <= 1.0);
            assert_eq!(buf[0].signum(), input.signum());
        }
    }

    #[test]
    fn test_output_never_exceeds_unity() {
        let mut dyn_proc = DynamicsProcessor::new();
        dyn_proc.set_preamp(3.0);
        dyn_proc.set_limiter_threshold(1.0);
        dyn_proc.set_limiter_ratio(1.0);
        let mut buf = vec![1.0, -1.0, 0.9];
        dyn_proc.process_block(&mut buf, 1);
        for s in &buf {
            assert!(s.abs() <= 1.0);
        }
    }

    #[test]
    fn test_parameter_clamping() {
        let mut dyn_proc = DynamicsProcessor::new();
        dyn_proc.set_preamp(100.0);
        dyn_proc.set_limiter_threshold(0.0);
        dyn_proc.set_limiter_ratio(0.5);
        let p = dyn_proc.params();
        assert_eq!(p.preamp_gain, PREAMP_RANGE.1);
        assert_eq!(p.limiter_threshold, THRESHOLD_RANGE.0);
        assert_eq!(p.limiter_ratio, RATIO_RANGE.0);
    }
}
