//! Separation model abstraction and the ONNX backend
//!
//! A model maps a fixed-shape mel-spectrogram window to one soft mask
//! per stem over the same window. The ONNX backend runs on tract; a
//! model file is loaded once and shared read-only across workers.

use std::path::Path;

use ndarray::{Array2, Array4};
use tract_onnx::prelude::*;

use crate::chunk::STEM_ORDER;
use crate::{SeparationError, SeparationResult};

/// Number of separated stems
pub const STEM_COUNT: usize = STEM_ORDER.len();

/// Mask-producing separation model.
///
/// `infer` takes log-mel features of exactly `time_steps` frames by
/// `n_mels` bins and returns `STEM_COUNT` masks of the same shape with
/// values in [0, 1], ordered vocals, drums, bass, other.
pub trait SeparationModel: Send + Sync {
    fn time_steps(&self) -> usize;
    fn n_mels(&self) -> usize;
    fn infer(&self, features: &Array2<f32>) -> SeparationResult<Vec<Array2<f32>>>;
}

type RunnableOnnx = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// tract-backed ONNX model.
///
/// Expects input shape [1, time_steps, n_mels, 1] and a single output
/// of shape [1, time_steps, n_mels, STEM_COUNT].
pub struct OnnxSeparationModel {
    plan: RunnableOnnx,
    time_steps: usize,
    n_mels: usize,
}

impl OnnxSeparationModel {
    pub fn load(path: &Path, time_steps: usize, n_mels: usize) -> SeparationResult<Self> {
        if !path.exists() {
            return Err(SeparationError::ModelNotFound(path.display().to_string()));
        }
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|e| SeparationError::Model(e.to_string()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, time_steps, n_mels, 1)),
            )
            .map_err(|e| SeparationError::Model(e.to_string()))?
            .into_optimized()
            .map_err(|e| SeparationError::Model(e.to_string()))?
            .into_runnable()
            .map_err(|e| SeparationError::Model(e.to_string()))?;

        log::info!(
            "Loaded separation model {} ({} x {} features)",
            path.display(),
            time_steps,
            n_mels
        );
        Ok(Self {
            plan,
            time_steps,
            n_mels,
        })
    }
}

impl SeparationModel for OnnxSeparationModel {
    fn time_steps(&self) -> usize {
        self.time_steps
    }

    fn n_mels(&self) -> usize {
        self.n_mels
    }

    fn infer(&self, features: &Array2<f32>) -> SeparationResult<Vec<Array2<f32>>> {
        let (t, m) = features.dim();
        if t != self.time_steps || m != self.n_mels {
            return Err(SeparationError::ShapeMismatch {
                expected: format!("[{}, {}]", self.time_steps, self.n_mels),
                got: format!("[{t}, {m}]"),
            });
        }

        let mut input = Array4::<f32>::zeros((1, t, m, 1));
        input.slice_mut(ndarray::s![0, .., .., 0]).assign(features);

        let tensor: Tensor = input.into();
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| SeparationError::Model(e.to_string()))?;

        let view = outputs[0]
            .to_array_view::<f32>()
            .map_err(|e| SeparationError::Model(e.to_string()))?;
        let expected = [1, t, m, STEM_COUNT];
        if view.shape() != expected {
            return Err(SeparationError::ShapeMismatch {
                expected: format!("{expected:?}"),
                got: format!("{:?}", view.shape()),
            });
        }

        let mut masks = Vec::with_capacity(STEM_COUNT);
        for stem in 0..STEM_COUNT {
            let mask = Array2::from_shape_fn((t, m), |(i, j)| {
                view[[0, i, j, stem]].clamp(0.0, 1.0)
            });
            masks.push(mask);
        }
        Ok(masks)
    }
}
