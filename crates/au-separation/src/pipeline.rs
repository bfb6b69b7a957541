//! Chunked separation pipeline
//!
//! A submitted job runs on its own coordinator thread: decode, chunk,
//! fan chunks out to a bounded worker pool, stitch results strictly in
//! chunk order through a reorder buffer, and emit one WAV per stem.
//! Cancellation is cooperative and checked between chunks. No output
//! files are written unless every chunk succeeds.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;
use ndarray::Array2;

use crate::chunk::{chunk_samples, AudioChunk, SeparatedAudio, STEM_ORDER};
use crate::job::{JobHandle, JobStatus, SeparationJob};
use crate::model::{SeparationModel, STEM_COUNT};
use crate::stft::{MelFilterbank, Stft};
use crate::wav;
use crate::{SeparationError, SeparationResult};

/// Pipeline tuning
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    /// Chunk duration in seconds; the last chunk may be shorter
    pub chunk_seconds: f64,
    /// Worker threads for extraction and inference
    pub workers: usize,
    pub fft_size: usize,
    pub hop: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_seconds: 10.0,
            workers: num_cpus::get().clamp(1, 4),
            fft_size: 4096,
            hop: 1024,
        }
    }
}

/// Offline stem separation, independent of the real-time path
pub struct SeparationPipeline {
    model: Arc<dyn SeparationModel>,
    config: PipelineConfig,
}

impl SeparationPipeline {
    pub fn new(model: Arc<dyn SeparationModel>, config: PipelineConfig) -> Self {
        Self { model, config }
    }

    /// Queue a separation job; returns immediately with its handle
    pub fn submit(&self, input: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> JobHandle {
        let handle = JobHandle::new(SeparationJob {
            input: input.into(),
            output_dir: output_dir.into(),
        });
        let model = Arc::clone(&self.model);
        let config = self.config;
        let job_handle = handle.clone();

        let spawned = thread::Builder::new()
            .name("au-separation".into())
            .spawn(move || match run_job(model, config, &job_handle) {
                Ok(()) => job_handle.set_status(JobStatus::Succeeded),
                Err(SeparationError::Cancelled) => job_handle.set_status(JobStatus::Cancelled),
                Err(e) => job_handle.set_failed(e.to_string()),
            });
        if let Err(e) = spawned {
            handle.set_failed(format!("Failed to spawn job thread: {e}"));
        }
        handle
    }
}

fn run_job(
    model: Arc<dyn SeparationModel>,
    config: PipelineConfig,
    handle: &JobHandle,
) -> SeparationResult<()> {
    handle.set_status(JobStatus::Running);
    let job = handle.job().clone();

    let (samples, sample_rate) = wav::read_mono(&job.input)?;
    let chunk_frames = ((config.chunk_seconds * sample_rate as f64) as usize).max(1);
    let chunks = chunk_samples(&samples, sample_rate, chunk_frames);
    drop(samples);
    let total = chunks.len();
    handle.set_total_chunks(total);
    log::info!(
        "Separating {} ({} chunks of {:.0} s)",
        job.input.display(),
        total,
        config.chunk_seconds
    );

    let workers = config.workers.clamp(1, total);
    let (task_tx, task_rx) = crossbeam_channel::bounded::<AudioChunk>(total);
    let (result_tx, result_rx) =
        crossbeam_channel::bounded::<(usize, SeparationResult<SeparatedAudio>)>(total);
    for chunk in chunks {
        // Capacity equals the chunk count, so this cannot fail.
        let _ = task_tx.send(chunk);
    }
    drop(task_tx);

    let mut threads = Vec::with_capacity(workers);
    for _ in 0..workers {
        let task_rx = task_rx.clone();
        let result_tx = result_tx.clone();
        let model = Arc::clone(&model);
        let worker_handle = handle.clone();
        threads.push(thread::spawn(move || {
            let stft = Stft::new(config.fft_size, config.hop);
            let mel = MelFilterbank::new(model.n_mels(), config.fft_size, sample_rate as f64);
            while let Ok(chunk) = task_rx.recv() {
                if worker_handle.should_stop() {
                    break;
                }
                let index = chunk.index;
                let result = process_chunk(model.as_ref(), &stft, &mel, &chunk);
                if result_tx.send((index, result)).is_err() {
                    break;
                }
            }
        }));
    }
    drop(result_tx);
    drop(task_rx);

    // Reorder buffer: results may arrive out of order, stems are
    // appended strictly by chunk index.
    let mut stitched = SeparatedAudio::with_len(0);
    let mut pending: BTreeMap<usize, SeparatedAudio> = BTreeMap::new();
    let mut next = 0usize;
    let mut failure: Option<SeparationError> = None;

    while next < total {
        if handle.is_cancelled() {
            failure = Some(SeparationError::Cancelled);
            break;
        }
        match result_rx.recv_timeout(Duration::from_millis(100)) {
            Ok((index, Ok(separated))) => {
                pending.insert(index, separated);
                while let Some(separated) = pending.remove(&next) {
                    for kind in STEM_ORDER {
                        stitched.stem_mut(kind).extend_from_slice(separated.stem(kind));
                    }
                    next += 1;
                    handle.chunk_done();
                }
            }
            Ok((index, Err(e))) => {
                log::error!("Chunk {index} failed: {e}");
                failure = Some(e);
                break;
            }
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                failure = Some(if handle.is_cancelled() {
                    SeparationError::Cancelled
                } else {
                    SeparationError::Model("Worker pool terminated early".into())
                });
                break;
            }
        }
    }

    if failure.is_some() {
        // Unblock remaining workers and discard their results. A stop
        // after a failure must not read back as a caller cancellation.
        handle.request_stop();
        while result_rx.try_recv().is_ok() {}
    }
    for t in threads {
        let _ = t.join();
    }
    if let Some(e) = failure {
        return Err(e);
    }

    std::fs::create_dir_all(&job.output_dir)?;
    for kind in STEM_ORDER {
        let path = job.output_dir.join(kind.file_name());
        wav::write_mono(&path, stitched.stem(kind), sample_rate)?;
    }
    log::info!("Separation complete: {}", job.output_dir.display());
    Ok(())
}

/// Extract features, run the model window by window, and reconstruct
/// each stem with the chunk's own phase.
fn process_chunk(
    model: &dyn SeparationModel,
    stft: &Stft,
    mel: &MelFilterbank,
    chunk: &AudioChunk,
) -> SeparationResult<SeparatedAudio> {
    let spec = stft.forward(&chunk.samples)?;
    let mags = Stft::magnitudes(&spec);
    let mel_spec = mel.project(&mags);
    let frames = mel_spec.nrows();
    let t = model.time_steps();
    let m = model.n_mels();

    // Mel-domain masks for every frame of the chunk, built from
    // fixed-size model windows (the last window is zero padded).
    let mut stem_masks = vec![Array2::<f64>::zeros((frames, m)); STEM_COUNT];
    let mut window = Array2::<f32>::zeros((t, m));
    for start in (0..frames).step_by(t) {
        let take = t.min(frames - start);
        window.fill(0.0);
        for i in 0..take {
            for j in 0..m {
                window[(i, j)] = mel_spec[(start + i, j)].ln_1p() as f32;
            }
        }
        let masks = model.infer(&window)?;
        if masks.len() != STEM_COUNT {
            return Err(SeparationError::ShapeMismatch {
                expected: format!("{STEM_COUNT} stem masks"),
                got: format!("{}", masks.len()),
            });
        }
        for (stem, mask) in masks.iter().enumerate() {
            for i in 0..take {
                for j in 0..m {
                    stem_masks[stem][(start + i, j)] = mask[(i, j)] as f64;
                }
            }
        }
    }

    let bins = stft.bins();
    let mut out = SeparatedAudio::with_len(0);
    let mut bin_mask = vec![0.0; bins];
    for (stem, kind) in STEM_ORDER.iter().enumerate() {
        let mut stem_spec = spec.clone();
        for frame in 0..frames {
            let row = stem_masks[stem].row(frame).to_vec();
            mel.unproject_mask(&row, &mut bin_mask);
            for bin in 0..bins {
                stem_spec[(frame, bin)] *= bin_mask[bin];
            }
        }
        *out.stem_mut(*kind) = stft.inverse(&stem_spec, chunk.samples.len())?;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Unity masks: every stem should reproduce the input
    struct PassthroughModel {
        time_steps: usize,
        n_mels: usize,
    }

    impl SeparationModel for PassthroughModel {
        fn time_steps(&self) -> usize {
            self.time_steps
        }
        fn n_mels(&self) -> usize {
            self.n_mels
        }
        fn infer(&self, features: &Array2<f32>) -> SeparationResult<Vec<Array2<f32>>> {
            Ok(vec![Array2::ones(features.dim()); STEM_COUNT])
        }
    }

    #[test]
    fn test_unity_mask_reconstructs_chunk() {
        let sr = 8000u32;
        let samples: Vec<f64> = (0..sr as usize * 2)
            .map(|i| 0.5 * (2.0 * std::f64::consts::PI * 220.0 * i as f64 / sr as f64).sin())
            .collect();
        let chunk = AudioChunk {
            index: 0,
            total: 1,
            sample_rate: sr,
            samples,
        };
        let model = PassthroughModel {
            time_steps: 16,
            n_mels: 32,
        };
        let stft = Stft::new(1024, 256);
        let mel = MelFilterbank::new(32, 1024, sr as f64);

        let out = process_chunk(&model, &stft, &mel, &chunk).unwrap();
        for kind in STEM_ORDER {
            let stem = out.stem(kind);
            assert_eq!(stem.len(), chunk.samples.len());
            // Interior samples round-trip through STFT/iSTFT.
            for i in 1024..stem.len() - 1024 {
                assert!(
                    (stem[i] - chunk.samples[i]).abs() < 1e-6,
                    "{kind:?} sample {i}"
                );
            }
        }
    }

    #[test]
    fn test_stem_lengths_equal() {
        let chunk = AudioChunk {
            index: 0,
            total: 1,
            sample_rate: 8000,
            samples: vec![0.1; 5000],
        };
        let model = PassthroughModel {
            time_steps: 16,
            n_mels: 32,
        };
        let stft = Stft::new(1024, 256);
        let mel = MelFilterbank::new(32, 1024, 8000.0);
        let out = process_chunk(&model, &stft, &mel, &chunk).unwrap();
        for kind in STEM_ORDER {
            assert_eq!(out.stem(kind).len(), 5000);
        }
    }
}
