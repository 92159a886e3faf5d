//! Inference Engine Implementation

use camera_capture::VideoFrame;
use std::path::Path;
use tract_onnx::prelude::*;
use tract_onnx::tract_hir::internal::DimLike;
use tracing::{debug, info};

use crate::preprocess::{tensor_from_frame, InputScaling};
use crate::InferenceError;

/// Memory layout of an image input tensor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
    /// [batch, height, width, channels] (TFLite-converted models)
    Nhwc,
    /// [batch, channels, height, width] (PyTorch-exported models)
    Nchw,
}

/// Fixed image input expected by a model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputSpec {
    pub layout: TensorLayout,
    pub height: usize,
    pub width: usize,
    pub channels: usize,
}

fn format_dims(dims: &[Option<usize>]) -> String {
    let parts: Vec<String> = dims
        .iter()
        .map(|d| d.map_or_else(|| "?".to_string(), |v| v.to_string()))
        .collect();
    format!("[{}]", parts.join(", "))
}

impl InputSpec {
    /// Derive the input from the model's declared input dims (`None` = symbolic)
    pub fn from_dims(dims: &[Option<usize>]) -> Result<Self, InferenceError> {
        let invalid = || InferenceError::InvalidInputShape {
            expected: "[1, H, W, C] or [1, C, H, W] with C in {1, 3}".to_string(),
            actual: format_dims(dims),
        };

        if dims.len() != 4 || matches!(dims[0], Some(n) if n != 1) {
            return Err(invalid());
        }

        let is_channels = |d: Option<usize>| matches!(d, Some(1) | Some(3));
        let (layout, height, width, channels) = if is_channels(dims[3]) {
            (TensorLayout::Nhwc, dims[1], dims[2], dims[3])
        } else if is_channels(dims[1]) {
            (TensorLayout::Nchw, dims[2], dims[3], dims[1])
        } else {
            return Err(invalid());
        };

        match (height, width, channels) {
            (Some(height), Some(width), Some(channels)) if height > 0 && width > 0 => Ok(Self {
                layout,
                height,
                width,
                channels,
            }),
            _ => Err(invalid()),
        }
    }

    /// Concrete tensor shape with batch size 1
    pub fn shape(&self) -> [usize; 4] {
        match self.layout {
            TensorLayout::Nhwc => [1, self.height, self.width, self.channels],
            TensorLayout::Nchw => [1, self.channels, self.height, self.width],
        }
    }
}

type Plan = SimplePlan<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// A loaded, optimised ONNX model with one image input
pub struct OnnxModel {
    plan: Plan,
    input: InputSpec,
    output_lens: Vec<Option<usize>>,
    path: String,
}

impl OnnxModel {
    /// Load and optimise the model. Any failure here is a startup fault.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InferenceError> {
        let path = path.as_ref();
        info!("Loading ONNX model from {}", path.display());

        let load_err =
            |e: TractError| InferenceError::ModelLoadError(format!("{}: {}", path.display(), e));

        let model = tract_onnx::onnx().model_for_path(path).map_err(load_err)?;

        let dims: Vec<Option<usize>> = model
            .clone()
            .into_typed()
            .map_err(load_err)?
            .input_fact(0)
            .map_err(load_err)?
            .shape
            .iter()
            .map(|d| d.to_usize().ok())
            .collect();
        let input = InputSpec::from_dims(&dims)?;

        let plan = model
            .with_input_fact(0, f32::fact(input.shape()).into())
            .map_err(load_err)?
            .into_optimized()
            .map_err(load_err)?
            .into_runnable()
            .map_err(load_err)?;

        let graph = plan.model();
        let output_lens = (0..graph.outputs.len())
            .map(|i| {
                graph
                    .output_fact(i)
                    .ok()
                    .and_then(|fact| fact.shape.iter().map(|d| d.to_usize().ok()).product())
            })
            .collect::<Vec<Option<usize>>>();

        info!(
            "Model loaded: input {:?} {}x{}x{}, outputs {:?}",
            input.layout, input.width, input.height, input.channels, output_lens
        );

        Ok(Self {
            plan,
            input,
            output_lens,
            path: path.display().to_string(),
        })
    }

    /// Input the model was trained on
    pub fn input(&self) -> &InputSpec {
        &self.input
    }

    /// Flattened element count of each output, when static
    pub fn output_lens(&self) -> &[Option<usize>] {
        &self.output_lens
    }

    /// Get model path
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Run on a prepared tensor, returning every output flattened
    pub fn run(&self, input: Tensor) -> Result<Vec<Vec<f32>>, InferenceError> {
        let start = std::time::Instant::now();

        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| InferenceError::InferenceFailed(e.to_string()))?;

        let flattened = outputs
            .iter()
            .map(|output| {
                output
                    .to_array_view::<f32>()
                    .map(|view| view.iter().copied().collect::<Vec<f32>>())
                    .map_err(|e| InferenceError::InferenceFailed(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Inference completed in {}us", start.elapsed().as_micros());
        Ok(flattened)
    }

    /// Resize `frame` to the model input, scale it and run
    pub fn run_frame(
        &self,
        frame: &VideoFrame,
        scaling: InputScaling,
    ) -> Result<Vec<Vec<f32>>, InferenceError> {
        let tensor = tensor_from_frame(frame, &self.input, scaling)?;
        self.run(tensor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nhwc_input() {
        let input = InputSpec::from_dims(&[None, Some(100), Some(100), Some(3)]).unwrap();
        assert_eq!(input.layout, TensorLayout::Nhwc);
        assert_eq!((input.height, input.width, input.channels), (100, 100, 3));
        assert_eq!(input.shape(), [1, 100, 100, 3]);
    }

    #[test]
    fn test_nchw_input() {
        let input = InputSpec::from_dims(&[Some(1), Some(1), Some(48), Some(64)]).unwrap();
        assert_eq!(input.layout, TensorLayout::Nchw);
        assert_eq!((input.height, input.width, input.channels), (48, 64, 1));
        assert_eq!(input.shape(), [1, 1, 48, 64]);
    }

    #[test]
    fn test_rejects_unusable_shapes() {
        // Symbolic spatial dims
        assert!(InputSpec::from_dims(&[Some(1), None, None, Some(3)]).is_err());
        // Batch > 1
        assert!(InputSpec::from_dims(&[Some(8), Some(224), Some(224), Some(3)]).is_err());
        // Not an image
        assert!(InputSpec::from_dims(&[Some(1), Some(128)]).is_err());
        let err = InputSpec::from_dims(&[Some(1), Some(5), Some(5), Some(5)]).unwrap_err();
        assert!(err.to_string().contains("[1, 5, 5, 5]"));
    }

    #[test]
    fn test_missing_model_is_load_error() {
        let result = OnnxModel::load("/nonexistent/emotion.onnx");
        assert!(matches!(result, Err(InferenceError::ModelLoadError(_))));
    }
}
