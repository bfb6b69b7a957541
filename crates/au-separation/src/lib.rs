//! au-separation: offline stem separation for Auricle
//!
//! Splits a track into fixed-duration chunks, extracts mel-spectrogram
//! features, runs a mask-producing separation model and reconstructs
//! vocals, drums, bass and other stems into WAV files. Runs entirely on
//! worker threads, independent of the real-time playback path.
//!
//! ## Modules
//! - `pipeline` - job coordinator, worker pool and ordered stitching
//! - `model` - SeparationModel trait and tract ONNX backend
//! - `stft` - STFT/iSTFT and mel filterbank
//! - `chunk` - audio chunking and per-chunk stem results
//! - `job` - job handle, status and progress
//! - `wav` - WAV input and stem output

pub mod chunk;
pub mod job;
pub mod model;
pub mod pipeline;
pub mod stft;
pub mod wav;

mod error;

pub use chunk::{chunk_samples, AudioChunk, SeparatedAudio, StemKind, STEM_ORDER};
pub use error::{SeparationError, SeparationResult};
pub use job::{JobHandle, JobStatus, SeparationJob};
pub use model::{OnnxSeparationModel, SeparationModel, STEM_COUNT};
pub use pipeline::{PipelineConfig, SeparationPipeline};
