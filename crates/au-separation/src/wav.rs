//! WAV input and stem output via hound

use std::path::Path;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use au_core::{mono_mix, Sample};

use crate::{SeparationError, SeparationResult};

/// Read a WAV file as mono f64, averaging channels
pub fn read_mono(path: &Path) -> SeparationResult<(Vec<Sample>, u32)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels as usize;

    let interleaved: Vec<f64> = match (spec.sample_format, spec.bits_per_sample) {
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| v as f64))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, bits) => {
            let scale = 1.0 / (1i64 << (bits - 1)) as f64;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f64 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    if interleaved.is_empty() {
        return Err(SeparationError::EmptyInput);
    }

    let mono = if channels <= 1 {
        interleaved
    } else {
        interleaved.chunks(channels).map(mono_mix).collect()
    };
    Ok((mono, spec.sample_rate))
}

/// Write mono f64 samples as a 16-bit WAV file
pub fn write_mono(path: &Path, samples: &[Sample], sample_rate: u32) -> SeparationResult<()> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f64).round() as i16;
        writer.write_sample(value)?;
    }
    writer.finalize()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wav");
        let samples: Vec<f64> = (0..1000)
            .map(|i| (i as f64 * 0.01).sin() * 0.8)
            .collect();
        write_mono(&path, &samples, 44100).unwrap();

        let (restored, rate) = read_mono(&path).unwrap();
        assert_eq!(rate, 44100);
        assert_eq!(restored.len(), samples.len());
        for (a, b) in samples.iter().zip(&restored) {
            assert!((a - b).abs() < 1.0 / 16384.0);
        }
    }

    #[test]
    fn test_stereo_downmix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 48000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(16384i16).unwrap(); // left 0.5
            writer.write_sample(0i16).unwrap(); // right 0.0
        }
        writer.finalize().unwrap();

        let (mono, rate) = read_mono(&path).unwrap();
        assert_eq!(rate, 48000);
        assert_eq!(mono.len(), 100);
        assert!((mono[0] - 0.25).abs() < 1e-3);
    }

    #[test]
    fn test_empty_file_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 44100,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        WavWriter::create(&path, spec).unwrap().finalize().unwrap();
        assert!(matches!(
            read_mono(&path),
            Err(SeparationError::EmptyInput)
        ));
    }
}
