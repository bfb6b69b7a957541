//! STFT, inverse STFT and mel filterbank projection
//!
//! Feature extraction runs a Hann-windowed STFT at a fixed FFT size and
//! hop, projects magnitudes onto a mel filterbank for the model, and
//! maps mel-domain masks back to FFT bins for reconstruction. The
//! inverse transform is windowed overlap-add normalized by the summed
//! squared window.

use std::sync::Arc;

use ndarray::Array2;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};
use rustfft::num_complex::Complex;

use au_core::Sample;

use crate::{SeparationError, SeparationResult};

fn hann(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / (n - 1) as f64).cos()))
        .collect()
}

/// Fixed-parameter short-time Fourier transform
pub struct Stft {
    fft_size: usize,
    hop: usize,
    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,
    window: Vec<f64>,
}

impl Stft {
    pub fn new(fft_size: usize, hop: usize) -> Self {
        let mut planner = RealFftPlanner::<f64>::new();
        Self {
            forward: planner.plan_fft_forward(fft_size),
            inverse: planner.plan_fft_inverse(fft_size),
            window: hann(fft_size),
            fft_size,
            hop,
        }
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    pub fn hop(&self) -> usize {
        self.hop
    }

    pub fn bins(&self) -> usize {
        self.fft_size / 2 + 1
    }

    pub fn num_frames(&self, len: usize) -> usize {
        len.div_ceil(self.hop)
    }

    /// Complex spectrogram, `num_frames(len)` rows by `bins()` columns.
    /// Frames past the end of the signal are zero padded.
    pub fn forward(&self, samples: &[Sample]) -> SeparationResult<Array2<Complex<f64>>> {
        let frames = self.num_frames(samples.len());
        let mut spec = Array2::from_elem((frames, self.bins()), Complex::new(0.0, 0.0));
        let mut input = self.forward.make_input_vec();
        let mut output = self.forward.make_output_vec();
        let mut scratch = self.forward.make_scratch_vec();

        for frame in 0..frames {
            let start = frame * self.hop;
            let avail = self.fft_size.min(samples.len().saturating_sub(start));
            for i in 0..avail {
                input[i] = samples[start + i] * self.window[i];
            }
            input[avail..].fill(0.0);
            self.forward
                .process_with_scratch(&mut input, &mut output, &mut scratch)
                .map_err(|e| SeparationError::Model(e.to_string()))?;
            for (bin, value) in output.iter().enumerate() {
                spec[(frame, bin)] = *value;
            }
        }
        Ok(spec)
    }

    /// Magnitudes of a complex spectrogram
    pub fn magnitudes(spec: &Array2<Complex<f64>>) -> Array2<f64> {
        spec.mapv(|c| c.norm())
    }

    /// Windowed overlap-add inverse, truncated to `out_len` samples
    pub fn inverse(
        &self,
        spec: &Array2<Complex<f64>>,
        out_len: usize,
    ) -> SeparationResult<Vec<Sample>> {
        let frames = spec.nrows();
        let mut out = vec![0.0; out_len];
        let mut weight = vec![0.0; out_len];
        let mut input = self.inverse.make_input_vec();
        let mut output = self.inverse.make_output_vec();
        let mut scratch = self.inverse.make_scratch_vec();
        let scale = 1.0 / self.fft_size as f64;

        for frame in 0..frames {
            for (bin, value) in input.iter_mut().enumerate() {
                *value = spec[(frame, bin)];
            }
            // DC and Nyquist bins of a real signal carry no phase.
            input[0].im = 0.0;
            let last = input.len() - 1;
            input[last].im = 0.0;
            self.inverse
                .process_with_scratch(&mut input, &mut output, &mut scratch)
                .map_err(|e| SeparationError::Model(e.to_string()))?;

            let start = frame * self.hop;
            for i in 0..self.fft_size {
                let pos = start + i;
                if pos >= out_len {
                    break;
                }
                out[pos] += output[i] * scale * self.window[i];
                weight[pos] += self.window[i] * self.window[i];
            }
        }

        for (sample, w) in out.iter_mut().zip(&weight) {
            if *w > 1e-8 {
                *sample /= *w;
            }
        }
        Ok(out)
    }
}

/// Triangular mel filterbank over FFT bins
pub struct MelFilterbank {
    n_mels: usize,
    n_bins: usize,
    /// n_mels rows by n_bins columns
    weights: Array2<f64>,
}

fn hz_to_mel(hz: f64) -> f64 {
    2595.0 * (1.0 + hz / 700.0).log10()
}

fn mel_to_hz(mel: f64) -> f64 {
    700.0 * (10.0_f64.powf(mel / 2595.0) - 1.0)
}

impl MelFilterbank {
    pub fn new(n_mels: usize, fft_size: usize, sample_rate: f64) -> Self {
        let n_bins = fft_size / 2 + 1;
        let max_mel = hz_to_mel(sample_rate * 0.5);
        let points: Vec<f64> = (0..n_mels + 2)
            .map(|i| {
                let hz = mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64);
                hz * fft_size as f64 / sample_rate
            })
            .collect();

        let mut weights = Array2::zeros((n_mels, n_bins));
        for m in 0..n_mels {
            let (lo, center, hi) = (points[m], points[m + 1], points[m + 2]);
            for bin in 0..n_bins {
                let b = bin as f64;
                let w = if b >= lo && b <= center && center > lo {
                    (b - lo) / (center - lo)
                } else if b > center && b <= hi && hi > center {
                    (hi - b) / (hi - center)
                } else {
                    0.0
                };
                weights[(m, bin)] = w;
            }
        }
        Self {
            n_mels,
            n_bins,
            weights,
        }
    }

    pub fn n_mels(&self) -> usize {
        self.n_mels
    }

    /// Project a magnitude spectrogram (frames x bins) onto the mel
    /// scale (frames x n_mels).
    pub fn project(&self, mags: &Array2<f64>) -> Array2<f64> {
        mags.dot(&self.weights.t())
    }

    /// Expand one mel-domain mask frame back to FFT bins.
    ///
    /// Each bin takes the filterbank-weighted average of the mel masks
    /// covering it; bins outside filterbank coverage copy the nearest
    /// covered bin.
    pub fn unproject_mask(&self, mel_mask: &[f64], out: &mut [f64]) {
        debug_assert_eq!(mel_mask.len(), self.n_mels);
        debug_assert_eq!(out.len(), self.n_bins);

        let mut first_covered = None;
        let mut last_covered = None;
        for bin in 0..self.n_bins {
            let mut num = 0.0;
            let mut den = 0.0;
            for m in 0..self.n_mels {
                let w = self.weights[(m, bin)];
                num += w * mel_mask[m];
                den += w;
            }
            if den > 1e-12 {
                out[bin] = num / den;
                if first_covered.is_none() {
                    first_covered = Some(bin);
                }
                last_covered = Some(bin);
            } else {
                out[bin] = f64::NAN;
            }
        }

        let first = first_covered.unwrap_or(0);
        let last = last_covered.unwrap_or(0);
        let lead = if out[first].is_nan() { 1.0 } else { out[first] };
        let tail = if out[last].is_nan() { 1.0 } else { out[last] };
        for bin in 0..self.n_bins {
            if out[bin].is_nan() {
                out[bin] = if bin < first { lead } else { tail };
            }
        }
    }
}
