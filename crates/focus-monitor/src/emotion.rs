//! Emotion classification on the face crop

use camera_capture::{Region, VideoFrame};
use inference_engine::{InputScaling, OnnxModel};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{EmotionModelConfig, OutputKind};
use crate::landmarks::LandmarkSet;
use crate::FocusError;

/// Discrete emotion classes, in the classifier's output order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Neutral,
    Sad,
    Surprise,
}

impl Emotion {
    /// All classes in model output order
    pub const ALL: [Emotion; 7] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Neutral,
        Emotion::Sad,
        Emotion::Surprise,
    ];

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Emotion::Angry => "Angry",
            Emotion::Disgust => "Disgust",
            Emotion::Fear => "Fear",
            Emotion::Happy => "Happy",
            Emotion::Neutral => "Neutral",
            Emotion::Sad => "Sad",
            Emotion::Surprise => "Surprise",
        }
    }
}

impl std::fmt::Display for Emotion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One classification result
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionObservation {
    pub emotion: Emotion,
    /// Winning class probability, 0-100
    pub confidence: f32,
}

/// Fixed-shape image classifier over face crops
pub trait EmotionClassifier {
    fn classify(&mut self, face: &VideoFrame) -> Result<EmotionObservation, FocusError>;
}

/// Landmark bounding box grown by `margin` pixels and clamped to the frame.
///
/// Returns `None` for a zero-area box, in which case the classifier must not run.
pub fn face_region(landmarks: &LandmarkSet, width: u32, height: u32, margin: u32) -> Option<Region> {
    let (min_x, min_y, max_x, max_y) = landmarks.bounds()?;
    let (w, h, margin) = (width as i64, height as i64, margin as i64);

    // Truncate toward zero like an integer pixel cast
    let x1 = ((min_x * width as f32) as i64 - margin).clamp(0, w);
    let y1 = ((min_y * height as f32) as i64 - margin).clamp(0, h);
    let x2 = ((max_x * width as f32) as i64 + margin).clamp(0, w);
    let y2 = ((max_y * height as f32) as i64 + margin).clamp(0, h);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }

    Some(Region::new(
        x1 as u32,
        y1 as u32,
        (x2 - x1) as u32,
        (y2 - y1) as u32,
    ))
}

fn softmax(values: &[f32]) -> Vec<f32> {
    let max = values.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = values.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Arg-max over class scores. NaN anywhere is an inference fault.
pub fn pick_emotion(scores: &[f32], kind: OutputKind) -> Result<EmotionObservation, FocusError> {
    if scores.len() != Emotion::ALL.len() {
        return Err(FocusError::Inference(format!(
            "expected {} class scores, got {}",
            Emotion::ALL.len(),
            scores.len()
        )));
    }
    if scores.iter().any(|v| !v.is_finite()) {
        return Err(FocusError::Inference("non-finite class score".into()));
    }

    let probabilities = match kind {
        OutputKind::Probabilities => scores.to_vec(),
        OutputKind::Logits => softmax(scores),
    };

    let (index, best) = probabilities
        .iter()
        .copied()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |acc, (i, p)| if p > acc.1 { (i, p) } else { acc });

    let emotion = Emotion::from_index(index)
        .ok_or_else(|| FocusError::Inference(format!("class index {} out of range", index)))?;

    Ok(EmotionObservation {
        emotion,
        confidence: best * 100.0,
    })
}

/// Emotion classifier backed by an ONNX model
pub struct OnnxEmotionClassifier {
    model: OnnxModel,
    scaling: InputScaling,
    output: OutputKind,
}

/// The first model output must hold one score per emotion class
fn check_class_output(path: &str, lens: &[Option<usize>]) -> Result<(), FocusError> {
    match lens.first() {
        Some(Some(len)) if *len == Emotion::ALL.len() => Ok(()),
        other => Err(FocusError::ModelLoad(format!(
            "{}: first output must hold {} class scores, found {:?}",
            path,
            Emotion::ALL.len(),
            other
        ))),
    }
}

impl OnnxEmotionClassifier {
    pub fn load(config: &EmotionModelConfig) -> Result<Self, FocusError> {
        let model = OnnxModel::load(&config.model_path)?;
        Self::from_model(model, config)
    }

    pub fn from_model(model: OnnxModel, config: &EmotionModelConfig) -> Result<Self, FocusError> {
        check_class_output(model.path(), model.output_lens())?;

        let input = model.input();
        info!(
            "Emotion classifier ready: {}x{}x{} {:?}, scaling {:?}",
            input.width, input.height, input.channels, input.layout, config.input_scaling
        );

        Ok(Self {
            model,
            scaling: config.input_scaling,
            output: config.output,
        })
    }
}

impl EmotionClassifier for OnnxEmotionClassifier {
    fn classify(&mut self, face: &VideoFrame) -> Result<EmotionObservation, FocusError> {
        let outputs = self.model.run_frame(face, self.scaling)?;
        let scores = outputs
            .first()
            .ok_or_else(|| FocusError::Inference("classifier produced no output".into()))?;
        pick_emotion(scores, self.output)
    }
}
