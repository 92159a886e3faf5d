//! Frame to tensor preprocessing

use camera_capture::VideoFrame;
use serde::{Deserialize, Serialize};
use tract_onnx::prelude::*;

use crate::engine::{InputSpec, TensorLayout};
use crate::InferenceError;

/// Numeric range the model was trained on. Pinned by configuration,
/// never guessed at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputScaling {
    /// 0..=255, no rescaling
    #[default]
    Raw,
    /// 0.0..=1.0
    Unit,
    /// -1.0..=1.0 (MobileNet style)
    Symmetric,
}

impl InputScaling {
    /// Map an 8-bit intensity into the model range
    pub fn apply(self, value: f32) -> f32 {
        match self {
            InputScaling::Raw => value,
            InputScaling::Unit => value / 255.0,
            InputScaling::Symmetric => value / 127.5 - 1.0,
        }
    }
}

// Luminance formula: 0.299*R + 0.587*G + 0.114*B
fn luma(pixel: [u8; 3]) -> f32 {
    pixel[0] as f32 * 0.299 + pixel[1] as f32 * 0.587 + pixel[2] as f32 * 0.114
}

/// Resize `frame` to the model input and lay it out as a batch-of-one tensor
pub fn tensor_from_frame(
    frame: &VideoFrame,
    input: &InputSpec,
    scaling: InputScaling,
) -> Result<Tensor, InferenceError> {
    let resized = frame
        .resize(input.width as u32, input.height as u32)
        .ok_or_else(|| {
            InferenceError::Preprocessing(format!(
                "cannot resize {}x{} frame ({} bytes) to {}x{}",
                frame.width,
                frame.height,
                frame.data.len(),
                input.width,
                input.height
            ))
        })?;

    let sample = |x: usize, y: usize, c: usize| -> f32 {
        let pixel = resized.get_pixel(x as u32, y as u32).0;
        if input.channels == 1 {
            scaling.apply(luma(pixel))
        } else {
            scaling.apply(pixel[c] as f32)
        }
    };

    let tensor: Tensor = match input.layout {
        TensorLayout::Nhwc => tract_ndarray::Array4::from_shape_fn(
            (1, input.height, input.width, input.channels),
            |(_, y, x, c)| sample(x, y, c),
        )
        .into(),
        TensorLayout::Nchw => tract_ndarray::Array4::from_shape_fn(
            (1, input.channels, input.height, input.width),
            |(_, c, y, x)| sample(x, y, c),
        )
        .into(),
    };

    Ok(tensor)
}
