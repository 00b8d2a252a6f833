use std::{path::Path, sync::Arc};

use pilah_types::{PilahError, Result};
use pilah_vision::InputTensor;
use tract_onnx::prelude::*;

use crate::{inference_error, InferenceModel, ModelLoader};

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// Loads ONNX models through tract with a fixed NHWC input fact.
pub struct TractLoader;

impl ModelLoader for TractLoader {
    fn load(&self, path: &Path, input_size: u32) -> Result<Arc<dyn InferenceModel>> {
        let size = input_size as usize;
        let load_error =
            |stage: &str, err: TractError| PilahError::ModelLoadFailure(format!("{stage} {}: {err}", path.display()));
        let plan = tract_onnx::onnx()
            .model_for_path(path)
            .map_err(|err| load_error("failed to load ONNX model from", err))?
            .with_input_fact(0, InferenceFact::dt_shape(f32::datum_type(), tvec!(1, size, size, 3)))
            .map_err(|err| load_error("failed to set input fact for", err))?
            .into_optimized()
            .map_err(|err| load_error("failed to optimize", err))?
            .into_runnable()
            .map_err(|err| load_error("failed to build runnable model for", err))?;
        Ok(Arc::new(TractModel { plan }))
    }
}

struct TractModel {
    plan: Plan,
}

impl InferenceModel for TractModel {
    fn predict(&self, input: &InputTensor) -> Result<Vec<f32>> {
        let [n, h, w, c] = input.shape;
        let tensor: Tensor = tract_ndarray::Array4::from_shape_vec((n, h, w, c), input.data.clone())
            .map_err(|err| inference_error(format!("input does not match its shape: {err}")))?
            .into();
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|err| inference_error(format!("ONNX inference failed: {err}")))?;
        let output = outputs
            .first()
            .ok_or_else(|| inference_error("model produced no outputs"))?;
        let scores = output
            .to_array_view::<f32>()
            .map_err(|err| inference_error(format!("model output tensor was not f32: {err}")))?;
        Ok(scores.iter().copied().collect())
    }
}
