//! Drowsiness state tracking

use serde::{Deserialize, Serialize};

use crate::config::FocusConfig;

/// Result of one drowsiness update
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrowsinessUpdate {
    /// EMA-smoothed EAR after this update
    pub smoothed: f32,
    /// Consecutive iterations below threshold, including this one
    pub closed_frames: u32,
    pub drowsy: bool,
}

/// EMA smoothing plus a consecutive-frame counter over the EAR signal.
///
/// Alarm is slow (N closed iterations in a row), recovery is immediate
/// (one open iteration resets the counter).
#[derive(Debug, Clone)]
pub struct DrowsinessDetector {
    threshold: f32,
    consecutive_frames: u32,
    alpha: f32,
    smoothed: Option<f32>,
    counter: u32,
}

impl DrowsinessDetector {
    pub fn new(config: &FocusConfig) -> Self {
        Self {
            threshold: config.ear_threshold,
            consecutive_frames: config.drowsy_consecutive_frames,
            alpha: config.ema_alpha,
            smoothed: None,
            counter: 0,
        }
    }

    /// Detector whose EMA already holds `smoothed`
    pub fn with_smoothed(config: &FocusConfig, smoothed: f32) -> Self {
        Self {
            smoothed: Some(smoothed),
            ..Self::new(config)
        }
    }

    /// Feed the left/right averaged EAR of one face iteration
    pub fn update(&mut self, average_ear: f32) -> DrowsinessUpdate {
        let smoothed = match self.smoothed {
            Some(prev) => self.alpha * average_ear + (1.0 - self.alpha) * prev,
            // Seeded with the first reading
            None => average_ear,
        };
        self.smoothed = Some(smoothed);

        if smoothed < self.threshold {
            self.counter = self.counter.saturating_add(1);
        } else {
            self.counter = 0;
        }

        DrowsinessUpdate {
            smoothed,
            closed_frames: self.counter,
            drowsy: self.is_drowsy(),
        }
    }

    pub fn is_drowsy(&self) -> bool {
        self.counter >= self.consecutive_frames
    }

    pub fn smoothed(&self) -> Option<f32> {
        self.smoothed
    }

    pub fn closed_frames(&self) -> u32 {
        self.counter
    }

    /// Forget all history
    pub fn reset(&mut self) {
        self.smoothed = None;
        self.counter = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(threshold: f32, frames: u32) -> FocusConfig {
        FocusConfig {
            ear_threshold: threshold,
            drowsy_consecutive_frames: frames,
            ..Default::default()
        }
    }

    #[test]
    fn test_ema_step() {
        let mut detector = DrowsinessDetector::with_smoothed(&FocusConfig::default(), 0.5);
        let update = detector.update(0.1);
        assert!((update.smoothed - 0.38).abs() < 1e-6);
    }

    #[test]
    fn test_ema_seeded_with_first_reading() {
        let mut detector = DrowsinessDetector::new(&FocusConfig::default());
        assert_eq!(detector.smoothed(), None);
        assert_eq!(detector.update(0.31).smoothed, 0.31);
    }

    #[test]
    fn test_drowsy_exactly_at_n() {
        let mut detector = DrowsinessDetector::with_smoothed(&config(0.20, 5), 0.15);
        for i in 1..=4 {
            let update = detector.update(0.15);
            assert!(!update.drowsy, "drowsy too early at {}", i);
            assert_eq!(update.closed_frames, i);
        }
        assert!(detector.update(0.15).drowsy);
        assert!(detector.update(0.15).drowsy);
    }

    #[test]
    fn test_recovery_is_immediate() {
        let mut detector = DrowsinessDetector::with_smoothed(&config(0.20, 3), 0.10);
        for _ in 0..10 {
            detector.update(0.10);
        }
        assert!(detector.is_drowsy());

        // One open reading lifting the EMA over threshold
        let update = detector.update(0.5);
        assert!(update.smoothed >= 0.20);
        assert!(!update.drowsy);
        assert_eq!(update.closed_frames, 0);
    }

    #[test]
    fn test_reset() {
        let mut detector = DrowsinessDetector::new(&config(0.20, 1));
        assert!(detector.update(0.05).drowsy);
        detector.reset();
        assert!(!detector.is_drowsy());
        assert_eq!(detector.smoothed(), None);
    }
}
