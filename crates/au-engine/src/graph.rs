//! Playback processing graph
//!
//! Fixed chain applied in place to each interleaved stereo block:
//! graphic + parametric EQ, then master volume, then preamp/limiter.
//! Volume sits ahead of the limiter so the [-1, 1] output clamp holds
//! for the final samples handed to the device.

use au_core::Sample;
use au_dsp::dynamics::DynamicsProcessor;
use au_dsp::eq::FilterBank;
use au_dsp::{BlockProcessor, Processor, ProcessorConfig};

use crate::params::ParamUpdate;

pub struct ProcessingGraph {
    filter_bank: FilterBank,
    dynamics: DynamicsProcessor,
    eq_enabled: bool,
    volume: f64,
}

impl ProcessingGraph {
    pub fn new(sample_rate: f64) -> Self {
        Self {
            filter_bank: FilterBank::new(sample_rate),
            dynamics: DynamicsProcessor::new(),
            eq_enabled: true,
            volume: 1.0,
        }
    }

    /// Apply one parameter change.
    ///
    /// Values were validated on the control side; a rejected update
    /// here (stale after a sample-rate change) is dropped silently.
    pub fn apply_update(&mut self, update: ParamUpdate) {
        match update {
            ParamUpdate::GraphicBandGain { index, gain_db } => {
                let _ = self.filter_bank.set_band_gain(index, gain_db);
            }
            ParamUpdate::GraphicBandGains(gains) => self.filter_bank.set_band_gains(gains),
            ParamUpdate::SetParametricBand { id, band } => {
                let _ = self.filter_bank.set_parametric(id, band);
            }
            ParamUpdate::RemoveParametricBand { id } => {
                self.filter_bank.remove_parametric(id);
            }
            ParamUpdate::ClearParametric => self.filter_bank.clear_parametric(),
            ParamUpdate::ResetEq => self.filter_bank.reset(),
            ParamUpdate::Preamp(gain) => self.dynamics.set_preamp(gain),
            ParamUpdate::LimiterThreshold(t) => self.dynamics.set_limiter_threshold(t),
            ParamUpdate::LimiterRatio(r) => self.dynamics.set_limiter_ratio(r),
            ParamUpdate::EqEnabled(enabled) => {
                if enabled && !self.eq_enabled {
                    // Stale delay state from before the bypass would
                    // otherwise leak into the first enabled block.
                    Processor::reset(&mut self.filter_bank);
                }
                self.eq_enabled = enabled;
            }
            ParamUpdate::Volume(v) => self.volume = v.clamp(0.0, 1.0),
        }
    }

    /// Process one interleaved block in place
    pub fn process(&mut self, buffer: &mut [Sample], channels: usize) {
        if self.eq_enabled {
            self.filter_bank.process_block(buffer, channels);
        }
        if self.volume != 1.0 {
            for sample in buffer.iter_mut() {
                *sample *= self.volume;
            }
        }
        self.dynamics.process_block(buffer, channels);
    }

    /// Clear delay state, parameters unchanged
    pub fn reset_state(&mut self) {
        Processor::reset(&mut self.filter_bank);
        Processor::reset(&mut self.dynamics);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f64) {
        self.filter_bank.set_sample_rate(sample_rate);
    }

    pub fn eq_enabled(&self) -> bool {
        self.eq_enabled
    }

    pub fn filter_bank(&self) -> &FilterBank {
        &self.filter_bank
    }

    pub fn filter_bank_mut(&mut self) -> &mut FilterBank {
        &mut self.filter_bank
    }

    pub fn dynamics(&self) -> &DynamicsProcessor {
        &self.dynamics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use au_dsp::eq::ParametricBand;

    fn sine(freq: f64, sr: f64, frames: usize) -> Vec<Sample> {
        (0..frames)
            .flat_map(|i| {
                let s = (2.0 * std::f64::consts::PI * freq * i as f64 / sr).sin() * 0.5;
                [s, s]
            })
            .collect()
    }

    #[test]
    fn test_eq_bypass_is_transparent() {
        let mut graph = ProcessingGraph::new(48000.0);
        graph.apply_update(ParamUpdate::GraphicBandGain {
            index: 5,
            gain_db: 12.0,
        });
        graph.apply_update(ParamUpdate::EqEnabled(false));

        let mut buf = sine(1000.0, 48000.0, 2048);
        let original = buf.clone();
        graph.process(&mut buf, 2);
        for (a, b) in buf.iter().zip(&original) {
            assert!((a - b).abs() < 1e-12);
        }
    }

    #[test]
    fn test_volume_scales_output() {
        let mut graph = ProcessingGraph::new(48000.0);
        graph.apply_update(ParamUpdate::Volume(0.5));
        let mut buf = vec![0.8, 0.8, -0.4, -0.4];
        graph.process(&mut buf, 2);
        assert!((buf[0] - 0.4).abs() < 1e-12);
        assert!((buf[2] + 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_output_clamped_after_volume() {
        let mut graph = ProcessingGraph::new(48000.0);
        graph.apply_update(ParamUpdate::Volume(1.0));
        graph.apply_update(ParamUpdate::Preamp(3.0));
        let mut buf = vec![1.0, -1.0];
        graph.process(&mut buf, 2);
        for s in &buf {
            assert!(s.abs() <= 1.0);
        }
    }

    #[test]
    fn test_reenable_clears_filter_state() {
        let mut graph = ProcessingGraph::new(48000.0);
        graph.apply_update(ParamUpdate::SetParametricBand {
            id: 1,
            band: ParametricBand {
                frequency: 1000.0,
                q: 1.0,
                gain_db: 12.0,
            },
        });
        let mut warmup = sine(1000.0, 48000.0, 4096);
        graph.process(&mut warmup, 2);

        graph.apply_update(ParamUpdate::EqEnabled(false));
        graph.apply_update(ParamUpdate::EqEnabled(true));

        // First sample after re-enable must not ring from old state.
        let mut buf = vec![0.0; 64];
        graph.process(&mut buf, 2);
        for s in &buf {
            assert!(s.abs() < 1e-9);
        }
    }
}
