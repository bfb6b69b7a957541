//! Separation pipeline errors
//!
//! Model and I/O failures are job-scoped: they fail the current job
//! without touching the engine or other jobs.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SeparationError {
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Model backend: {0}")]
    Model(String),

    #[error("Model output shape mismatch: expected {expected}, got {got}")]
    ShapeMismatch { expected: String, got: String },

    #[error("Input file contains no audio")]
    EmptyInput,

    #[error("Audio file: {0}")]
    AudioFile(#[from] hound::Error),

    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),

    #[error("Job was cancelled")]
    Cancelled,
}

pub type SeparationResult<T> = Result<T, SeparationError>;
