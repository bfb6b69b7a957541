//! Spectral and level analysis of post-chain audio
//!
//! The analyzer keeps a mono ring of the most recent samples. Each
//! `analyze` call windows the ring, runs a real FFT, bins magnitudes to
//! a fixed bar count on a dB scale, and refreshes the waveform preview
//! and peak/RMS meters. Bars are exponentially smoothed so the display
//! does not flicker.

use std::sync::Arc;

use realfft::{RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use au_core::{db_to_gain, gain_to_db, mono_mix, Sample};

/// One complete analysis frame.
///
/// Published as a whole: every field belongs to the same `generation`.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisSnapshot {
    /// Normalized spectrum bars in [0, 1]
    pub spectrum: Vec<f32>,
    /// Decimated copy of the most recent samples in [-1, 1]
    pub waveform: Vec<f32>,
    pub left_peak: f32,
    pub right_peak: f32,
    pub rms: f32,
    pub generation: u64,
}

impl AnalysisSnapshot {
    pub fn empty(config: &AnalyzerConfig) -> Self {
        Self {
            spectrum: vec![0.0; config.bar_count],
            waveform: vec![0.0; config.waveform_len],
            left_peak: 0.0,
            right_peak: 0.0,
            rms: 0.0,
            generation: 0,
        }
    }
}

/// Analyzer tuning
#[derive(Debug, Clone, Copy)]
pub struct AnalyzerConfig {
    /// FFT frame length, power of two
    pub fft_size: usize,
    /// Number of spectrum bars
    pub bar_count: usize,
    /// Waveform preview length, at most `fft_size`
    pub waveform_len: usize,
    /// Bar smoothing factor in [0, 1); higher is smoother
    pub smoothing: f64,
    /// dB value mapped to bar 0.0; bar 1.0 is 0 dBFS
    pub db_floor: f64,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            bar_count: 64,
            waveform_len: 2048,
            smoothing: 0.8,
            db_floor: -60.0,
        }
    }
}

pub struct SpectrumAnalyzer {
    config: AnalyzerConfig,
    fft: Arc<dyn RealToComplex<f64>>,
    window: Vec<f64>,
    /// Mono history, circular; `write_pos` is the next slot
    ring: Vec<f64>,
    write_pos: usize,
    /// Time-ordered windowed frame handed to the FFT
    frame: Vec<f64>,
    spectrum_buf: Vec<Complex<f64>>,
    scratch: Vec<Complex<f64>>,
    /// Smoothed bar values carried between frames
    bars: Vec<f64>,
    current: AnalysisSnapshot,
}

impl SpectrumAnalyzer {
    pub fn new(mut config: AnalyzerConfig) -> Self {
        config.fft_size = config.fft_size.next_power_of_two().max(1024);
        config.bar_count = config.bar_count.clamp(1, config.fft_size / 2);
        config.waveform_len = config.waveform_len.clamp(1, config.fft_size);
        config.smoothing = config.smoothing.clamp(0.0, 0.999);

        let mut planner = RealFftPlanner::<f64>::new();
        let fft = planner.plan_fft_forward(config.fft_size);
        let spectrum_buf = fft.make_output_vec();
        let scratch = fft.make_scratch_vec();

        let n = config.fft_size;
        let window: Vec<f64> = (0..n)
            .map(|i| {
                0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos())
            })
            .collect();

        Self {
            fft,
            window,
            ring: vec![0.0; n],
            write_pos: 0,
            frame: vec![0.0; n],
            spectrum_buf,
            scratch,
            bars: vec![0.0; config.bar_count],
            current: AnalysisSnapshot::empty(&config),
            config,
        }
    }

    pub fn config(&self) -> &AnalyzerConfig {
        &self.config
    }

    /// Fold one interleaved block into the analysis state and rebuild
    /// the current snapshot.
    pub fn analyze(&mut self, interleaved: &[Sample], channels: usize) {
        if channels == 0 || interleaved.is_empty() {
            return;
        }
        self.update_meters(interleaved, channels);
        self.push_samples(interleaved, channels);
        self.compute_spectrum();
        self.copy_waveform();
        self.current.generation += 1;
    }

    /// The latest complete snapshot
    pub fn snapshot(&self) -> &AnalysisSnapshot {
        &self.current
    }

    /// Forget all history and meters
    pub fn reset(&mut self) {
        self.ring.fill(0.0);
        self.write_pos = 0;
        self.bars.fill(0.0);
        let generation = self.current.generation;
        self.current = AnalysisSnapshot::empty(&self.config);
        self.current.generation = generation;
    }

    fn update_meters(&mut self, interleaved: &[Sample], channels: usize) {
        let mut left = 0.0_f64;
        let mut right = 0.0_f64;
        let mut sum_sq = 0.0_f64;
        for frame in interleaved.chunks_exact(channels) {
            left = left.max(frame[0].abs());
            right = right.max(frame.get(1).copied().unwrap_or(frame[0]).abs());
            for s in frame {
                sum_sq += s * s;
            }
        }
        self.current.left_peak = left.min(1.0) as f32;
        self.current.right_peak = right.min(1.0) as f32;
        self.current.rms = (sum_sq / interleaved.len() as f64).sqrt().min(1.0) as f32;
    }

    fn push_samples(&mut self, interleaved: &[Sample], channels: usize) {
        for frame in interleaved.chunks_exact(channels) {
            self.ring[self.write_pos] = mono_mix(frame);
            self.write_pos = (self.write_pos + 1) % self.ring.len();
        }
    }

    fn compute_spectrum(&mut self) {
        let n = self.config.fft_size;
        // Unroll the ring into time order, oldest sample first.
        for (i, out) in self.frame.iter_mut().enumerate() {
            *out = self.ring[(self.write_pos + i) % n] * self.window[i];
        }
        if self
            .fft
            .process_with_scratch(&mut self.frame, &mut self.spectrum_buf, &mut self.scratch)
            .is_err()
        {
            return;
        }

        let bins = n / 2;
        let bins_per_bar = (bins / self.config.bar_count).max(1);
        let scale = 2.0 / n as f64;
        let floor = self.config.db_floor;
        let floor_gain = db_to_gain(floor);
        let smoothing = self.config.smoothing;

        for (bar_idx, bar) in self.bars.iter_mut().enumerate() {
            let start = 1 + bar_idx * bins_per_bar;
            let end = (start + bins_per_bar).min(bins + 1);
            let mut sum = 0.0;
            for bin in &self.spectrum_buf[start..end] {
                sum += bin.norm() * scale;
            }
            let mag = sum / (end - start) as f64;
            let db = gain_to_db(mag.max(floor_gain)).min(0.0);
            let value = (db - floor) / -floor;
            *bar = smoothing * *bar + (1.0 - smoothing) * value;
        }

        for (out, bar) in self.current.spectrum.iter_mut().zip(&self.bars) {
            *out = *bar as f32;
        }
    }

    fn copy_waveform(&mut self) {
        let n = self.ring.len();
        let step = n / self.config.waveform_len;
        for (i, out) in self.current.waveform.iter_mut().enumerate() {
            *out = self.ring[(self.write_pos + i * step) % n] as f32;
        }
    }
}
