//! Detection records shared by every perception backend.

use serde::Serialize;

/// Number of points in a face mesh.
pub const FACE_LANDMARK_COUNT: usize = 468;
/// Number of points tracked per hand.
pub const HAND_LANDMARK_COUNT: usize = 21;

/// Normalized keypoint. `x` and `y` are in [0, 1] relative to the frame, `z`
/// is relative depth in roughly the same scale as `x`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct Landmark {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Landmark {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Euclidean distance in normalized 3D space.
    pub fn distance(&self, other: &Landmark) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        let dz = other.z - self.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum Handedness {
    Left,
    Right,
}

impl Handedness {
    pub fn label(self) -> &'static str {
        match self {
            Handedness::Left => "Left",
            Handedness::Right => "Right",
        }
    }
}

/// Handedness classification together with its confidence in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct HandednessScore {
    pub label: Handedness,
    pub score: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Gesture {
    pub category: String,
    pub score: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum MouthState {
    Open,
    #[default]
    Closed,
}

impl MouthState {
    pub fn label(self) -> &'static str {
        match self {
            MouthState::Open => "Open",
            MouthState::Closed => "Closed",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct FaceDetection {
    pub landmarks: Vec<Landmark>,
    pub mouth: MouthState,
}

/// Raw output of a hand landmarker, before gesture classification.
#[derive(Clone, Debug, PartialEq)]
pub struct HandLandmarks {
    pub landmarks: Vec<Landmark>,
    pub handedness: HandednessScore,
}

/// One detected hand with everything known about it in a single record.
#[derive(Clone, Debug, PartialEq)]
pub struct HandDetection {
    pub landmarks: Vec<Landmark>,
    pub handedness: HandednessScore,
    pub gesture: Option<Gesture>,
}

/// All detections for one frame.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Detections {
    pub faces: Vec<FaceDetection>,
    pub hands: Vec<HandDetection>,
}

impl Detections {
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty() && self.hands.is_empty()
    }
}
