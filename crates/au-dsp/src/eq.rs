//! FilterBank: 10-band graphic EQ plus user parametric bands
//!
//! Sections apply in a fixed, deterministic order: graphic bands by
//! ascending frequency, then parametric bands by insertion order.
//! Coefficients are recomputed on parameter change only; per-channel
//! delay state survives recomputation so gain moves do not click.

use au_core::Sample;

use crate::biquad::{BiquadCoeffs, BiquadState, FilterKind};
use crate::{BlockProcessor, DspError, DspResult, Processor, ProcessorConfig};

/// Fixed graphic EQ center frequencies in Hz
pub const GRAPHIC_EQ_FREQUENCIES: [f64; 10] = [
    31.25, 62.5, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

/// Number of graphic EQ bands
pub const GRAPHIC_BAND_COUNT: usize = 10;

/// Q for graphic bands (one-octave bandwidth)
pub const GRAPHIC_EQ_Q: f64 = 1.41;

/// Graphic and parametric band gain range in dB
pub const GAIN_RANGE_DB: (f64, f64) = (-12.0, 12.0);

/// Parametric band frequency range in Hz
pub const PARAMETRIC_FREQ_RANGE: (f64, f64) = (20.0, 20_000.0);

/// Parametric band Q range
pub const PARAMETRIC_Q_RANGE: (f64, f64) = (0.1, 10.0);

/// Parametric band slots are preallocated so an upsert applied on the
/// audio thread never allocates.
pub const MAX_PARAMETRIC_BANDS: usize = 32;

/// Channel state is stored in fixed arrays; the playback path is stereo.
pub const MAX_CHANNELS: usize = 2;

/// Graphic bands whose gain magnitude is below this are bypassed.
const FLAT_GAIN_DB: f64 = 0.05;

/// A user parametric band
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ParametricBand {
    pub frequency: f64,
    pub q: f64,
    pub gain_db: f64,
}

/// One filter section: coefficients plus per-channel delay state
#[derive(Debug, Clone, Copy, Default)]
struct Section {
    coeffs: BiquadCoeffs,
    bypass: bool,
    state: [BiquadState; MAX_CHANNELS],
}

impl Section {
    #[inline]
    fn set_coeffs(&mut self, coeffs: BiquadCoeffs) {
        self.bypass = coeffs == BiquadCoeffs::bypass();
        self.coeffs = coeffs;
    }

    #[inline]
    fn process(&mut self, buffer: &mut [Sample], channels: usize) {
        if self.bypass {
            return;
        }
        let c = &self.coeffs;
        for frame in buffer.chunks_exact_mut(channels) {
            for (ch, sample) in frame.iter_mut().enumerate() {
                let s = &mut self.state[ch];
                let x = *sample;
                let y = c.b0 * x + s.z1;
                s.z1 = c.b1 * x - c.a1 * y + s.z2;
                s.z2 = c.b2 * x - c.a2 * y;
                *sample = y;
            }
        }
        for s in &mut self.state[..channels] {
            s.flush_denormals();
        }
    }

    #[inline]
    fn reset(&mut self) {
        for s in &mut self.state {
            s.clear();
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ParametricEntry {
    id: u64,
    band: ParametricBand,
    section: Section,
}

/// Serializable EQ settings (graphic gains plus parametric bands)
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EqSettings {
    pub graphic_gains_db: [f64; GRAPHIC_BAND_COUNT],
    pub parametric: Vec<(u64, ParametricBand)>,
}

/// Series filter bank: graphic EQ then parametric EQ
#[derive(Debug, Clone)]
pub struct FilterBank {
    sample_rate: f64,
    graphic_gains_db: [f64; GRAPHIC_BAND_COUNT],
    graphic: [Section; GRAPHIC_BAND_COUNT],
    parametric: Vec<ParametricEntry>,
}

impl FilterBank {
    pub fn new(sample_rate: f64) -> Self {
        let mut bank = Self {
            sample_rate,
            graphic_gains_db: [0.0; GRAPHIC_BAND_COUNT],
            graphic: [Section::default(); GRAPHIC_BAND_COUNT],
            parametric: Vec::with_capacity(MAX_PARAMETRIC_BANDS),
        };
        bank.redesign_graphic();
        bank
    }

    /// Set one graphic band gain in dB, clamped to [-12, +12]
    pub fn set_band_gain(&mut self, index: usize, gain_db: f64) -> DspResult<()> {
        if index >= GRAPHIC_BAND_COUNT {
            return Err(DspError::InvalidBandIndex(index));
        }
        self.graphic_gains_db[index] = gain_db.clamp(GAIN_RANGE_DB.0, GAIN_RANGE_DB.1);
        self.redesign_graphic_band(index);
        Ok(())
    }

    /// Set all ten graphic band gains at once
    pub fn set_band_gains(&mut self, gains_db: [f64; GRAPHIC_BAND_COUNT]) {
        for (i, g) in gains_db.iter().enumerate() {
            self.graphic_gains_db[i] = g.clamp(GAIN_RANGE_DB.0, GAIN_RANGE_DB.1);
        }
        self.redesign_graphic();
    }

    pub fn band_gain(&self, index: usize) -> Option<f64> {
        self.graphic_gains_db.get(index).copied()
    }

    pub fn band_gains(&self) -> [f64; GRAPHIC_BAND_COUNT] {
        self.graphic_gains_db
    }

    /// Upsert a parametric band by id.
    ///
    /// Updating an existing id keeps its position in the chain and its
    /// delay state; a new id appends in insertion order. Out-of-range
    /// frequency or Q is rejected and the table is left unchanged.
    pub fn set_parametric(&mut self, id: u64, band: ParametricBand) -> DspResult<()> {
        let nyquist = self.sample_rate * 0.5;
        let (f_lo, f_hi) = PARAMETRIC_FREQ_RANGE;
        if !band.frequency.is_finite()
            || band.frequency < f_lo
            || band.frequency > f_hi
            || band.frequency >= nyquist
        {
            return Err(DspError::InvalidFrequency {
                freq: band.frequency,
                nyquist,
            });
        }
        let (q_lo, q_hi) = PARAMETRIC_Q_RANGE;
        if !band.q.is_finite() || band.q < q_lo || band.q > q_hi {
            return Err(DspError::InvalidQ(band.q));
        }
        let band = ParametricBand {
            gain_db: band.gain_db.clamp(GAIN_RANGE_DB.0, GAIN_RANGE_DB.1),
            ..band
        };

        let coeffs = BiquadCoeffs::design(
            FilterKind::Peaking,
            band.frequency,
            band.q,
            band.gain_db,
            self.sample_rate,
        )?;

        if let Some(entry) = self.parametric.iter_mut().find(|e| e.id == id) {
            entry.band = band;
            entry.section.set_coeffs(coeffs);
            return Ok(());
        }
        if self.parametric.len() >= MAX_PARAMETRIC_BANDS {
            return Err(DspError::TooManyBands(MAX_PARAMETRIC_BANDS));
        }
        let mut section = Section::default();
        section.set_coeffs(coeffs);
        self.parametric.push(ParametricEntry { id, band, section });
        Ok(())
    }

    /// Remove a parametric band; returns false if the id is unknown
    pub fn remove_parametric(&mut self, id: u64) -> bool {
        let before = self.parametric.len();
        self.parametric.retain(|e| e.id != id);
        self.parametric.len() != before
    }

    pub fn clear_parametric(&mut self) {
        self.parametric.clear();
    }

    pub fn parametric_band(&self, id: u64) -> Option<ParametricBand> {
        self.parametric.iter().find(|e| e.id == id).map(|e| e.band)
    }

    pub fn parametric_count(&self) -> usize {
        self.parametric.len()
    }

    /// Zero all graphic gains and drop all parametric bands
    pub fn reset(&mut self) {
        self.graphic_gains_db = [0.0; GRAPHIC_BAND_COUNT];
        self.redesign_graphic();
        self.parametric.clear();
    }

    /// Snapshot of the current settings
    pub fn settings(&self) -> EqSettings {
        EqSettings {
            graphic_gains_db: self.graphic_gains_db,
            parametric: self.parametric.iter().map(|e| (e.id, e.band)).collect(),
        }
    }

    /// Apply previously captured settings
    pub fn apply_settings(&mut self, settings: &EqSettings) -> DspResult<()> {
        self.set_band_gains(settings.graphic_gains_db);
        self.parametric.clear();
        for (id, band) in &settings.parametric {
            self.set_parametric(*id, *band)?;
        }
        Ok(())
    }

    fn redesign_graphic(&mut self) {
        for i in 0..GRAPHIC_BAND_COUNT {
            self.redesign_graphic_band(i);
        }
    }

    fn redesign_graphic_band(&mut self, index: usize) {
        let freq = GRAPHIC_EQ_FREQUENCIES[index];
        let gain_db = self.graphic_gains_db[index];
        // A band at or above Nyquist (low sample rates) stays bypassed.
        let coeffs = if gain_db.abs() < FLAT_GAIN_DB || freq >= self.sample_rate * 0.5 {
            BiquadCoeffs::bypass()
        } else {
            BiquadCoeffs::peaking(freq, GRAPHIC_EQ_Q, gain_db, self.sample_rate)
        };
        self.graphic[index].set_coeffs(coeffs);
    }
}

impl Processor for FilterBank {
    fn reset(&mut self) {
        for section in &mut self.graphic {
            section.reset();
        }
        for entry in &mut self.parametric {
            entry.section.reset();
        }
    }
}

impl BlockProcessor for FilterBank {
    fn process_block(&mut self, buffer: &mut [Sample], channels: usize) {
        debug_assert!(channels >= 1 && channels <= MAX_CHANNELS);
        let channels = channels.clamp(1, MAX_CHANNELS);
        for section in &mut self.graphic {
            section.process(buffer, channels);
        }
        for entry in &mut self.parametric {
            entry.section.process(buffer, channels);
        }
    }
}

impl ProcessorConfig for FilterBank {
    fn set_sample_rate(&mut self, sample_rate: f64) {
        if sample_rate <= 0.0 || !sample_rate.is_finite() {
            log::warn!("ignoring invalid sample rate {sample_rate}");
            return;
        }
        self.sample_rate = sample_rate;
        self.redesign_graphic();
        // Parametric bands keep their parameters; drop any that no
        // longer fit below the new Nyquist.
        let sr = self.sample_rate;
        self.parametric.retain(|e| e.band.frequency < sr * 0.5);
        for i in 0..self.parametric.len() {
            let entry = self.parametric[i];
            if let Ok(coeffs) = BiquadCoeffs::design(
                FilterKind::Peaking,
                entry.band.frequency,
                entry.band.q,
                entry.band.gain_db,
                sr,
            ) {
                self.parametric[i].section.set_coeffs(coeffs);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use au_core::gain_to_db;
    use std::f64::consts::PI;

    fn sine(freq: f64, sample_rate: f64, frames: usize, channels: usize) -> Vec<Sample> {
        let mut buf = Vec::with_capacity(frames * channels);
        for i in 0..frames {
            let s = (2.0 * PI * freq * i as f64 / sample_rate).sin();
            for _ in 0..channels {
                buf.push(s);
            }
        }
        buf
    }

    fn peak_tail(buffer: &[Sample], channels: usize) -> f64 {
        let tail = buffer.len() / 2;
        buffer[tail..]
            .iter()
            .step_by(channels)
            .fold(0.0_f64, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_band_gain_at_center() {
        let sr = 48000.0;
        for gain_db in [-12.0, -6.0, 6.0, 12.0] {
            let mut bank = FilterBank::new(sr);
            bank.set_band_gain(5, gain_db).unwrap(); // 1 kHz
            let mut buf = sine(1000.0, sr, 48000, 2);
            bank.process_block(&mut buf, 2);
            let measured = gain_to_db(peak_tail(&buf, 2));
            assert!(
                (measured - gain_db).abs() < 0.5,
                "gain {gain_db} dB measured {measured} dB"
            );
        }
    }

    #[test]
    fn test_band_gain_isolated() {
        let sr = 48000.0;
        let mut bank = FilterBank::new(sr);
        bank.set_band_gain(0, 12.0).unwrap(); // 31.25 Hz
        let mut buf = sine(8000.0, sr, 48000, 2);
        bank.process_block(&mut buf, 2);
        let measured = gain_to_db(peak_tail(&buf, 2));
        assert!(measured.abs() < 0.5, "off-band change {measured} dB");
    }

    #[test]
    fn test_reset_is_passthrough() {
        let mut bank = FilterBank::new(48000.0);
        bank.set_band_gain(3, 9.0).unwrap();
        bank.set_parametric(
            1,
            ParametricBand {
                frequency: 2500.0,
                q: 2.0,
                gain_db: -6.0,
            },
        )
        .unwrap();
        bank.reset();

        let mut buf = sine(440.0, 48000.0, 4096, 2);
        let original = buf.clone();
        bank.process_block(&mut buf, 2);
        for (a, b) in buf.iter().zip(&original) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_set_band_gain_idempotent() {
        let mut once = FilterBank::new(48000.0);
        once.set_band_gain(4, 7.5).unwrap();
        let mut twice = FilterBank::new(48000.0);
        twice.set_band_gain(4, 7.5).unwrap();
        twice.set_band_gain(4, 7.5).unwrap();

        let mut buf_a = sine(500.0, 48000.0, 8192, 2);
        let mut buf_b = buf_a.clone();
        once.process_block(&mut buf_a, 2);
        twice.process_block(&mut buf_b, 2);
        assert_eq!(buf_a, buf_b);
    }

    #[test]
    fn test_parametric_rejects_invalid() {
        let mut bank = FilterBank::new(48000.0);
        let bad_freq = ParametricBand {
            frequency: 30000.0,
            q: 1.0,
            gain_db: 3.0,
        };
        assert!(bank.set_parametric(1, bad_freq).is_err());
        let bad_q = ParametricBand {
            frequency: 1000.0,
            q: 0.0,
            gain_db: 3.0,
        };
        assert!(bank.set_parametric(1, bad_q).is_err());
        assert_eq!(bank.parametric_count(), 0);
    }

    #[test]
    fn test_parametric_upsert_keeps_order() {
        let mut bank = FilterBank::new(48000.0);
        let band = |f| ParametricBand {
            frequency: f,
            q: 1.0,
            gain_db: 3.0,
        };
        bank.set_parametric(10, band(100.0)).unwrap();
        bank.set_parametric(20, band(200.0)).unwrap();
        bank.set_parametric(10, band(150.0)).unwrap();
        assert_eq!(bank.parametric_count(), 2);
        assert_eq!(bank.parametric_band(10).unwrap().frequency, 150.0);
        let ids: Vec<u64> = bank.settings().parametric.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec![10, 20]);
    }

    #[test]
    fn test_parametric_table_capacity() {
        let mut bank = FilterBank::new(48000.0);
        for id in 0..MAX_PARAMETRIC_BANDS as u64 {
            bank.set_parametric(
                id,
                ParametricBand {
                    frequency: 100.0 + id as f64 * 10.0,
                    q: 1.0,
                    gain_db: 1.0,
                },
            )
            .unwrap();
        }
        let overflow = bank.set_parametric(
            999,
            ParametricBand {
                frequency: 5000.0,
                q: 1.0,
                gain_db: 1.0,
            },
        );
        assert!(matches!(overflow, Err(DspError::TooManyBands(_))));
    }

    #[test]
    fn test_settings_round_trip() {
        let mut bank = FilterBank::new(48000.0);
        bank.set_band_gain(2, -4.0).unwrap();
        bank.set_parametric(
            7,
            ParametricBand {
                frequency: 3000.0,
                q: 4.0,
                gain_db: 5.0,
            },
        )
        .unwrap();
        let settings = bank.settings();

        let mut restored = FilterBank::new(48000.0);
        restored.apply_settings(&settings).unwrap();
        assert_eq!(restored.settings(), settings);
    }
}
