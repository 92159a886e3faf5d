//! Status stabilization: majority vote over recent observations

use serde::{Serialize, Serializer};
use std::collections::VecDeque;
use std::fmt;

use crate::emotion::Emotion;

/// Per-iteration emotion observation as carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmotionLabel {
    Emotion(Emotion),
    /// No face in the frame
    NoFace,
    /// Face found but nothing classified (degenerate crop or model fault)
    NoRoi,
}

impl EmotionLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmotionLabel::Emotion(e) => e.as_str(),
            EmotionLabel::NoFace => "No Face",
            EmotionLabel::NoRoi => "No ROI",
        }
    }

    pub fn emotion(&self) -> Option<Emotion> {
        match self {
            EmotionLabel::Emotion(e) => Some(*e),
            _ => None,
        }
    }
}

impl fmt::Display for EmotionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for EmotionLabel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Final per-iteration status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FocusStatus {
    #[serde(rename = "FOCUSED")]
    Focused,
    #[serde(rename = "DISTRACTED")]
    Distracted,
    #[serde(rename = "DROWSY")]
    Drowsy,
    #[serde(rename = "NO FACE")]
    NoFace,
}

impl FocusStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FocusStatus::Focused => "FOCUSED",
            FocusStatus::Distracted => "DISTRACTED",
            FocusStatus::Drowsy => "DROWSY",
            FocusStatus::NoFace => "NO FACE",
        }
    }
}

impl fmt::Display for FocusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status priority: drowsy, then face presence, then the stable emotion.
pub fn derive_status(
    drowsy: bool,
    face_present: bool,
    stable: Option<Emotion>,
    focused: &[Emotion],
) -> FocusStatus {
    if drowsy {
        FocusStatus::Drowsy
    } else if !face_present {
        FocusStatus::NoFace
    } else if stable.is_some_and(|e| focused.contains(&e)) {
        FocusStatus::Focused
    } else {
        FocusStatus::Distracted
    }
}

/// Bounded FIFO of observations with a majority-vote stable emotion.
///
/// `NoFace`/`NoRoi` markers vote like emotions, so a buffer dominated by
/// markers has no stable emotion. Ties go to the label seen earliest.
#[derive(Debug, Clone)]
pub struct StatusStabilizer {
    buffer: VecDeque<EmotionLabel>,
    capacity: usize,
    focused: Vec<Emotion>,
}

impl StatusStabilizer {
    pub fn new(capacity: usize, focused: Vec<Emotion>) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: VecDeque::with_capacity(capacity),
            capacity,
            focused,
        }
    }

    /// Append an observation and derive this iteration's status
    pub fn push(&mut self, observation: EmotionLabel, drowsy: bool) -> FocusStatus {
        self.buffer.push_back(observation);
        while self.buffer.len() > self.capacity {
            self.buffer.pop_front();
        }

        let face_present = observation != EmotionLabel::NoFace;
        derive_status(drowsy, face_present, self.stable_emotion(), &self.focused)
    }

    /// Most frequent label in the buffer, markers included
    pub fn stable_label(&self) -> Option<EmotionLabel> {
        // (label, count) in first-seen order
        let mut tally: Vec<(EmotionLabel, usize)> = Vec::with_capacity(Emotion::ALL.len() + 2);
        for &label in &self.buffer {
            match tally.iter_mut().find(|(l, _)| *l == label) {
                Some((_, count)) => *count += 1,
                None => tally.push((label, 1)),
            }
        }

        tally
            .into_iter()
            .fold(None, |best: Option<(EmotionLabel, usize)>, (label, count)| match best {
                Some((_, best_count)) if best_count >= count => best,
                _ => Some((label, count)),
            })
            .map(|(label, _)| label)
    }

    /// Emotion of the majority label; `None` when a marker wins
    pub fn stable_emotion(&self) -> Option<Emotion> {
        self.stable_label().and_then(|label| label.emotion())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn observations(&self) -> impl Iterator<Item = &EmotionLabel> {
        self.buffer.iter()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}
