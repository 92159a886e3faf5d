//! ONNX Inference Engine
//!
//! Loads pre-trained ONNX artifacts with tract, discovers their fixed input
//! shape from the artifact itself, and turns camera frames into input tensors.

mod engine;
mod preprocess;

pub use engine::{InputSpec, OnnxModel, TensorLayout};
pub use preprocess::{tensor_from_frame, InputScaling};

use thiserror::Error;

/// Errors during inference
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Model load failed: {0}")]
    ModelLoadError(String),
    #[error("Inference failed: {0}")]
    InferenceFailed(String),
    #[error("Invalid input shape: expected {expected}, got {actual}")]
    InvalidInputShape { expected: String, actual: String },
    #[error("Preprocessing failed: {0}")]
    Preprocessing(String),
}
