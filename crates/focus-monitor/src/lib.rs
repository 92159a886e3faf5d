//! Focus Monitor
//!
//! Per-frame focus analysis using computer vision:
//! - Face mesh landmarks with single-face tracking
//! - Eye aspect ratio and drowsiness detection
//! - Emotion classification on the face crop
//! - Majority-vote status stabilization

pub mod analysis;
pub mod config;
pub mod ear;
pub mod emotion;
pub mod landmarks;
pub mod stabilizer;
pub mod state;

pub use analysis::{EarReading, FrameAnalysis};
pub use config::{EmotionModelConfig, FaceMeshConfig, FocusConfig, OutputKind};
pub use ear::{EyeIndices, LEFT_EYE, RIGHT_EYE};
pub use emotion::{Emotion, EmotionClassifier, EmotionObservation, OnnxEmotionClassifier};
pub use landmarks::{FaceMesh, Landmark, LandmarkExtractor, LandmarkSet};
pub use stabilizer::{EmotionLabel, FocusStatus, StatusStabilizer};
pub use state::{DrowsinessDetector, DrowsinessUpdate};

use camera_capture::VideoFrame;
use inference_engine::InferenceError;
use thiserror::Error;
use tracing::{debug, warn};

/// Focus monitor error types
#[derive(Error, Debug)]
pub enum FocusError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Image processing failed: {0}")]
    ImageProcessing(String),
}

impl From<InferenceError> for FocusError {
    fn from(err: InferenceError) -> Self {
        match err {
            InferenceError::ModelLoadError(_) | InferenceError::InvalidInputShape { .. } => {
                FocusError::ModelLoad(err.to_string())
            }
            InferenceError::InferenceFailed(_) => FocusError::Inference(err.to_string()),
            InferenceError::Preprocessing(_) => FocusError::ImageProcessing(err.to_string()),
        }
    }
}

/// Face-mesh + emotion-model monitor used on the device
pub type OnnxFocusMonitor = FocusMonitor<FaceMesh, OnnxEmotionClassifier>;

/// Focus monitoring pipeline: one [`FrameAnalysis`] per frame
pub struct FocusMonitor<L, C> {
    config: FocusConfig,
    extractor: L,
    classifier: C,
    drowsiness: DrowsinessDetector,
    stabilizer: StatusStabilizer,
}

impl OnnxFocusMonitor {
    /// Load both models. Failure here is fatal for the agent.
    pub fn load(config: FocusConfig) -> Result<Self, FocusError> {
        let extractor = FaceMesh::load(&config.face_mesh)?;
        let classifier = OnnxEmotionClassifier::load(&config.emotion_model)?;
        Self::new(config, extractor, classifier)
    }
}

impl<L: LandmarkExtractor, C: EmotionClassifier> FocusMonitor<L, C> {
    pub fn new(config: FocusConfig, extractor: L, classifier: C) -> Result<Self, FocusError> {
        config.validate()?;
        Ok(Self {
            drowsiness: DrowsinessDetector::new(&config),
            stabilizer: StatusStabilizer::new(
                config.emotion_buffer_capacity,
                config.focused_emotions.clone(),
            ),
            extractor,
            classifier,
            config,
        })
    }

    /// Analyze a single frame. Model and geometry faults never escape:
    /// they degrade to "no face" or "no observation" for this iteration.
    pub fn analyze(&mut self, frame: &VideoFrame) -> FrameAnalysis {
        let landmarks = match self.extractor.extract(frame) {
            Ok(landmarks) => landmarks,
            Err(e) => {
                warn!(error = %e, "Landmark extraction failed");
                None
            }
        };

        let Some(landmarks) = landmarks else {
            // Drowsiness state is left untouched without a face
            let status = self.stabilizer.push(EmotionLabel::NoFace, false);
            return FrameAnalysis::no_face(self.stabilizer.stable_emotion(), status);
        };

        let (width, height) = frame.dimensions();
        let left = ear::ear(&landmarks, LEFT_EYE, width, height);
        let right = ear::ear(&landmarks, RIGHT_EYE, width, height);
        let average = (left + right) / 2.0;
        let update = self.drowsiness.update(average);

        let (observation, confidence) = match self.classify(frame, &landmarks) {
            Some(obs) => (EmotionLabel::Emotion(obs.emotion), obs.confidence),
            None => (EmotionLabel::NoRoi, 0.0),
        };

        let status = self.stabilizer.push(observation, update.drowsy);

        FrameAnalysis {
            face_detected: true,
            ear: Some(EarReading {
                left,
                right,
                average,
                smoothed: update.smoothed,
            }),
            drowsy: update.drowsy,
            observation,
            confidence,
            stable_emotion: self.stabilizer.stable_emotion(),
            status,
        }
    }

    fn classify(&mut self, frame: &VideoFrame, landmarks: &LandmarkSet) -> Option<EmotionObservation> {
        let (width, height) = frame.dimensions();
        let Some(region) = emotion::face_region(landmarks, width, height, self.config.crop_margin_px)
        else {
            debug!("Degenerate face region, skipping classification");
            return None;
        };

        let face = frame.crop(region)?;
        match self.classifier.classify(&face) {
            Ok(observation) => Some(observation),
            Err(e) => {
                warn!(error = %e, "Emotion classification failed");
                None
            }
        }
    }

    pub fn config(&self) -> &FocusConfig {
        &self.config
    }

    pub fn drowsiness(&self) -> &DrowsinessDetector {
        &self.drowsiness
    }

    pub fn stabilizer(&self) -> &StatusStabilizer {
        &self.stabilizer
    }

    /// Reset temporal state (EMA, counter, vote buffer)
    pub fn reset_state(&mut self) {
        self.drowsiness.reset();
        self.stabilizer.clear();
    }
}
