//! Face landmark extraction (face mesh)

use camera_capture::{Region, VideoFrame};
use inference_engine::{InputScaling, OnnxModel};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::FaceMeshConfig;
use crate::FocusError;

/// Face mesh point count without iris refinement
pub const MESH_POINTS: usize = 468;
/// Face mesh point count with iris refinement
pub const REFINED_MESH_POINTS: usize = 478;

/// Fraction of the face box added on each side of the tracking region
const TRACKING_EXPANSION: f32 = 0.25;

/// Normalized face point (x, y in 0..1 of the frame)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Pixel-space position for a frame of the given size
    pub fn to_pixels(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

/// Landmarks of one detected face
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LandmarkSet {
    points: Vec<Landmark>,
}

impl LandmarkSet {
    pub fn new(points: Vec<Landmark>) -> Self {
        Self { points }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Landmark> {
        self.points.get(index)
    }

    pub fn points(&self) -> &[Landmark] {
        &self.points
    }

    /// Normalized (min_x, min_y, max_x, max_y) over all points
    pub fn bounds(&self) -> Option<(f32, f32, f32, f32)> {
        let first = self.points.first()?;
        Some(self.points.iter().fold(
            (first.x, first.y, first.x, first.y),
            |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
        ))
    }

    /// Pixel region around the face, grown by [`TRACKING_EXPANSION`] per side
    pub fn tracking_region(&self, width: u32, height: u32) -> Option<Region> {
        let (min_x, min_y, max_x, max_y) = self.bounds()?;
        let (w, h) = (width as f32, height as f32);
        let pad_x = (max_x - min_x) * w * TRACKING_EXPANSION;
        let pad_y = (max_y - min_y) * h * TRACKING_EXPANSION;

        let x1 = (min_x * w - pad_x).floor().clamp(0.0, w) as u32;
        let y1 = (min_y * h - pad_y).floor().clamp(0.0, h) as u32;
        let x2 = (max_x * w + pad_x).ceil().clamp(0.0, w) as u32;
        let y2 = (max_y * h + pad_y).ceil().clamp(0.0, h) as u32;

        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Region::new(x1, y1, x2 - x1, y2 - y1))
    }
}

/// Produces at most one face's landmarks per frame
pub trait LandmarkExtractor {
    fn extract(&mut self, frame: &VideoFrame) -> Result<Option<LandmarkSet>, FocusError>;
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Face mesh model output layout, resolved once at load time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MeshOutputs {
    landmarks: usize,
    points: usize,
    score: Option<usize>,
}

impl MeshOutputs {
    fn resolve(lens: &[Option<usize>], refine: bool) -> Option<Self> {
        let find = |points: usize| {
            lens.iter()
                .position(|len| *len == Some(points * 3))
                .map(|index| (index, points))
        };
        let preferred = if refine {
            [REFINED_MESH_POINTS, MESH_POINTS]
        } else {
            [MESH_POINTS, REFINED_MESH_POINTS]
        };
        let (landmarks, points) = find(preferred[0]).or_else(|| find(preferred[1]))?;
        let score = lens.iter().position(|len| *len == Some(1));

        Some(Self {
            landmarks,
            points,
            score,
        })
    }
}

/// Landmark/score output layout of a face-mesh model; a missing landmark
/// output is a load fault
fn mesh_outputs(path: &str, lens: &[Option<usize>], refine: bool) -> Result<MeshOutputs, FocusError> {
    MeshOutputs::resolve(lens, refine).ok_or_else(|| {
        FocusError::ModelLoad(format!(
            "{}: no {}x3 or {}x3 landmark output in {:?}",
            path, REFINED_MESH_POINTS, MESH_POINTS, lens
        ))
    })
}

/// Face-mesh extractor on an ONNX landmark model.
///
/// Tracks one face: after a hit, the next call only looks inside a region
/// around the previous landmarks, falling back to a full-frame pass when
/// the face is lost there.
pub struct FaceMesh {
    model: OnnxModel,
    outputs: MeshOutputs,
    scaling: InputScaling,
    min_detection_confidence: f32,
    min_tracking_confidence: f32,
    previous_region: Option<Region>,
}

impl FaceMesh {
    pub fn load(config: &FaceMeshConfig) -> Result<Self, FocusError> {
        let model = OnnxModel::load(&config.model_path)?;

        let outputs = mesh_outputs(model.path(), model.output_lens(), config.refine_landmarks)?;

        if config.refine_landmarks && outputs.points != REFINED_MESH_POINTS {
            warn!(
                "Refined landmarks requested but {} provides {} points",
                model.path(),
                outputs.points
            );
        }
        if outputs.score.is_none() {
            warn!("{} has no face score output; every pass counts as a face", model.path());
        }
        info!("Face mesh ready: {} points", outputs.points);

        Ok(Self {
            model,
            outputs,
            scaling: config.input_scaling,
            min_detection_confidence: config.min_detection_confidence,
            min_tracking_confidence: config.min_tracking_confidence,
            previous_region: None,
        })
    }

    /// Forget the tracked face; the next call runs a full-frame pass
    pub fn reset_tracking(&mut self) {
        self.previous_region = None;
    }

    fn run_region(
        &self,
        frame: &VideoFrame,
        region: Region,
        min_confidence: f32,
    ) -> Result<Option<LandmarkSet>, FocusError> {
        let crop = if region == Region::new(0, 0, frame.width, frame.height) {
            None
        } else {
            Some(frame.crop(region).ok_or_else(|| {
                FocusError::ImageProcessing(format!("region {:?} outside frame", region))
            })?)
        };
        let outputs = self
            .model
            .run_frame(crop.as_ref().unwrap_or(frame), self.scaling)?;

        if let Some(score) = self.outputs.score.and_then(|i| outputs.get(i)?.first().copied()) {
            let confidence = sigmoid(score);
            if confidence < min_confidence {
                debug!("Face score {:.2} below {:.2}", confidence, min_confidence);
                return Ok(None);
            }
        }

        let raw = outputs
            .get(self.outputs.landmarks)
            .ok_or_else(|| FocusError::Inference("landmark output missing".into()))?;

        let input = self.model.input();
        Ok(Some(map_to_frame(
            raw,
            self.outputs.points,
            (input.width as f32, input.height as f32),
            region,
            frame.dimensions(),
        )))
    }
}

/// Convert model-input pixel coordinates inside `region` into
/// frame-normalized landmarks
fn map_to_frame(
    raw: &[f32],
    points: usize,
    (input_w, input_h): (f32, f32),
    region: Region,
    (frame_w, frame_h): (u32, u32),
) -> LandmarkSet {
    let (frame_w, frame_h) = (frame_w as f32, frame_h as f32);
    LandmarkSet::new(
        raw.chunks_exact(3)
            .take(points)
            .map(|p| {
                let x = region.x as f32 + p[0] / input_w * region.width as f32;
                let y = region.y as f32 + p[1] / input_h * region.height as f32;
                let z = p[2] / input_w * region.width as f32 / frame_w;
                Landmark::new(x / frame_w, y / frame_h, z)
            })
            .collect(),
    )
}

/// Run `pass` inside the tracked region first, then over `full` when the
/// face is lost there or the tracked pass fails. `pass` gets the region and
/// whether it is a tracking pass.
fn track_or_detect(
    previous: Option<Region>,
    full: Region,
    mut pass: impl FnMut(Region, bool) -> Result<Option<LandmarkSet>, FocusError>,
) -> Result<Option<LandmarkSet>, FocusError> {
    if let Some(region) = previous {
        match pass(region, true) {
            Ok(Some(set)) => return Ok(Some(set)),
            Ok(None) => debug!("Face lost inside tracking region, running full-frame pass"),
            Err(e) => warn!(error = %e, "Tracking pass failed, running full-frame pass"),
        }
    }
    pass(full, false)
}

impl LandmarkExtractor for FaceMesh {
    fn extract(&mut self, frame: &VideoFrame) -> Result<Option<LandmarkSet>, FocusError> {
        let (width, height) = frame.dimensions();
        let previous = self.previous_region.take();

        let found = track_or_detect(previous, Region::new(0, 0, width, height), |region, tracking| {
            let min_confidence = if tracking {
                self.min_tracking_confidence
            } else {
                self.min_detection_confidence
            };
            self.run_region(frame, region, min_confidence)
        })?;

        self.previous_region = found.as_ref().and_then(|set| set.tracking_region(width, height));
        Ok(found)
    }
}
