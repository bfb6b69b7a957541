//! End-to-end pipeline tests with a stub separation model

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use ndarray::Array2;

use au_separation::{
    wav, JobStatus, PipelineConfig, SeparationModel, SeparationPipeline, SeparationResult,
    STEM_COUNT, STEM_ORDER,
};

const SR: u32 = 8000;

/// Constant soft masks, optionally slowed down per inference call
struct StubModel {
    mask: f32,
    delay: Duration,
}

impl SeparationModel for StubModel {
    fn time_steps(&self) -> usize {
        16
    }
    fn n_mels(&self) -> usize {
        32
    }
    fn infer(&self, features: &Array2<f32>) -> SeparationResult<Vec<Array2<f32>>> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        Ok(vec![
            Array2::from_elem(features.dim(), self.mask);
            STEM_COUNT
        ])
    }
}

struct FailingModel;

impl SeparationModel for FailingModel {
    fn time_steps(&self) -> usize {
        16
    }
    fn n_mels(&self) -> usize {
        32
    }
    fn infer(&self, _features: &Array2<f32>) -> SeparationResult<Vec<Array2<f32>>> {
        Err(au_separation::SeparationError::Model(
            "backend unavailable".into(),
        ))
    }
}

fn write_input(path: &Path, seconds: f64) {
    let samples: Vec<f64> = (0..(seconds * SR as f64) as usize)
        .map(|i| 0.4 * (2.0 * std::f64::consts::PI * 330.0 * i as f64 / SR as f64).sin())
        .collect();
    wav::write_mono(path, &samples, SR).unwrap();
}

fn test_config() -> PipelineConfig {
    PipelineConfig {
        chunk_seconds: 10.0,
        workers: 2,
        fft_size: 1024,
        hop: 256,
    }
}

#[test]
fn test_25_second_file_three_chunks() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("track.wav");
    let out_dir = dir.path().join("stems");
    write_input(&input, 25.0);

    let pipeline = SeparationPipeline::new(
        Arc::new(StubModel {
            mask: 0.5,
            delay: Duration::ZERO,
        }),
        test_config(),
    );
    let handle = pipeline.submit(&input, &out_dir);
    assert_eq!(handle.wait(), JobStatus::Succeeded);
    assert!((handle.progress() - 1.0).abs() < 1e-6);

    let expected_len = (25.0 * SR as f64) as usize;
    for kind in STEM_ORDER {
        let path = out_dir.join(kind.file_name());
        assert!(path.exists(), "missing {path:?}");
        let (stem, rate) = wav::read_mono(&path).unwrap();
        assert_eq!(rate, SR);
        // Stitched length is the sum of the 10 s, 10 s and 5 s chunks.
        assert_eq!(stem.len(), expected_len);
    }
}

#[test]
fn test_progress_is_monotone() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("track.wav");
    write_input(&input, 25.0);

    let pipeline = SeparationPipeline::new(
        Arc::new(StubModel {
            mask: 0.5,
            delay: Duration::from_millis(20),
        }),
        test_config(),
    );
    let handle = pipeline.submit(&input, dir.path().join("stems"));

    let mut last = 0.0f32;
    while !handle.status().is_terminal() {
        let p = handle.progress();
        assert!(p >= last, "progress went backwards: {last} -> {p}");
        assert!((0.0..=1.0).contains(&p));
        last = p;
        std::thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(handle.status(), JobStatus::Succeeded);
    assert!((handle.progress() - 1.0).abs() < 1e-6);
}

#[test]
fn test_cancel_produces_no_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("track.wav");
    let out_dir = dir.path().join("stems");
    write_input(&input, 25.0);

    let pipeline = SeparationPipeline::new(
        Arc::new(StubModel {
            mask: 0.5,
            delay: Duration::from_millis(50),
        }),
        test_config(),
    );
    let handle = pipeline.submit(&input, &out_dir);
    std::thread::sleep(Duration::from_millis(10));
    handle.cancel();

    assert_eq!(handle.wait(), JobStatus::Cancelled);
    for kind in STEM_ORDER {
        assert!(!out_dir.join(kind.file_name()).exists());
    }
}

#[test]
fn test_model_failure_fails_job() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("track.wav");
    let out_dir = dir.path().join("stems");
    write_input(&input, 5.0);

    let pipeline = SeparationPipeline::new(Arc::new(FailingModel), test_config());
    let handle = pipeline.submit(&input, &out_dir);

    assert_eq!(handle.wait(), JobStatus::Failed);
    assert!(handle.message().unwrap().contains("backend unavailable"));
    // Internal worker shutdown after the failure is not a cancellation.
    assert!(!handle.is_cancelled());
    for kind in STEM_ORDER {
        assert!(!out_dir.join(kind.file_name()).exists());
    }
}

#[test]
fn test_missing_input_fails_job() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = SeparationPipeline::new(
        Arc::new(StubModel {
            mask: 0.5,
            delay: Duration::ZERO,
        }),
        test_config(),
    );
    let handle = pipeline.submit(dir.path().join("nope.wav"), dir.path().join("stems"));
    assert_eq!(handle.wait(), JobStatus::Failed);
    assert!(handle.message().is_some());
}
