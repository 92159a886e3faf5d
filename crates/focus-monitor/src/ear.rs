//! Eye Aspect Ratio (EAR)
//!
//! `EAR = (|p2 - p6| + |p3 - p5|) / (2 * |p1 - p4|)` over six eye landmarks,
//! measured in pixel space.

use crate::landmarks::LandmarkSet;

/// Six ordered landmark indices describing one eye.
/// Points 0 and 3 are the corners, (1, 5) and (2, 4) the lid pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EyeIndices(pub [usize; 6]);

/// Subject's left eye in the face mesh topology
pub const LEFT_EYE: EyeIndices = EyeIndices([362, 385, 387, 263, 373, 380]);
/// Subject's right eye in the face mesh topology
pub const RIGHT_EYE: EyeIndices = EyeIndices([33, 160, 158, 133, 153, 144]);

/// Horizontal distances below this are degenerate
const MIN_HORIZONTAL_PX: f32 = 1e-6;

fn distance(a: (f32, f32), b: (f32, f32)) -> f32 {
    (a.0 - b.0).hypot(a.1 - b.1)
}

/// EAR, or `None` on missing points, degenerate or non-finite geometry
pub fn try_ear(landmarks: &LandmarkSet, eye: EyeIndices, width: u32, height: u32) -> Option<f32> {
    let mut p = [(0.0f32, 0.0f32); 6];
    for (slot, &index) in p.iter_mut().zip(eye.0.iter()) {
        *slot = landmarks.get(index)?.to_pixels(width, height);
    }

    let horizontal = distance(p[0], p[3]);
    if !horizontal.is_finite() || horizontal < MIN_HORIZONTAL_PX {
        return None;
    }

    let value = (distance(p[1], p[5]) + distance(p[2], p[4])) / (2.0 * horizontal);
    value.is_finite().then_some(value)
}

/// EAR that never fails: any fault yields 0.0
pub fn ear(landmarks: &LandmarkSet, eye: EyeIndices, width: u32, height: u32) -> f32 {
    try_ear(landmarks, eye, width, height).unwrap_or(0.0)
}
