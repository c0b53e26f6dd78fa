//! Values passed from the capture loop to HTTP consumers.

use std::sync::{Arc, Mutex};

use actix_web::web::Bytes;
use perception::{Detections, Handedness, MouthState};
use serde::Serialize;

/// Name of the push event carrying a [`Snapshot`].
pub(crate) const LANDMARKS_EVENT: &str = "landmarks_data";
/// Gesture reported when no hand carries a recognized gesture.
pub(crate) const NO_GESTURE: &str = "None";

#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct FacePoint {
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) z: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct HandPoint {
    #[serde(rename = "type")]
    pub(crate) hand: Handedness,
    pub(crate) x: i32,
    pub(crate) y: i32,
    pub(crate) z: f32,
}

/// Everything detected in one frame, in pixel coordinates of the working
/// frame. Rebuilt from scratch every cycle.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub(crate) struct Snapshot {
    pub(crate) face: Vec<FacePoint>,
    pub(crate) hands: Vec<HandPoint>,
    pub(crate) gesture: String,
    pub(crate) mouth: MouthState,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            face: Vec::new(),
            hands: Vec::new(),
            gesture: NO_GESTURE.to_string(),
            mouth: MouthState::Closed,
        }
    }
}

impl Snapshot {
    /// Flatten detections into the broadcast shape.
    ///
    /// All faces share one point list; the mouth state comes from the last
    /// face. The gesture is the first hand's, if it has one.
    pub(crate) fn from_detections(detections: &Detections, width: u32, height: u32) -> Self {
        let mut snapshot = Snapshot::default();
        let (w, h) = (width as f32, height as f32);

        for face in &detections.faces {
            snapshot.mouth = face.mouth;
            snapshot
                .face
                .extend(face.landmarks.iter().map(|lm| FacePoint {
                    x: to_pixel(lm.x, w),
                    y: to_pixel(lm.y, h),
                    z: lm.z,
                }));
        }

        for hand in &detections.hands {
            snapshot
                .hands
                .extend(hand.landmarks.iter().map(|lm| HandPoint {
                    hand: hand.handedness.label,
                    x: to_pixel(lm.x, w),
                    y: to_pixel(lm.y, h),
                    z: lm.z,
                }));
        }

        if let Some(gesture) = detections.hands.first().and_then(|hand| hand.gesture.as_ref()) {
            snapshot.gesture = gesture.category.clone();
        }

        snapshot
    }
}

pub(crate) fn to_pixel(normalized: f32, extent: f32) -> i32 {
    (normalized * extent).round() as i32
}

#[derive(Clone, Debug)]
pub(crate) struct SnapshotPacket {
    pub(crate) frame_number: u64,
    pub(crate) timestamp_ms: i64,
    pub(crate) snapshot: Arc<Snapshot>,
}

#[derive(Clone, Debug)]
pub(crate) struct FramePacket {
    pub(crate) frame_number: u64,
    pub(crate) jpeg: Bytes,
}

#[derive(Serialize)]
pub(crate) struct SnapshotResponse<'a> {
    pub(crate) frame_number: u64,
    pub(crate) timestamp_ms: i64,
    #[serde(flatten)]
    pub(crate) snapshot: &'a Snapshot,
}

pub(crate) type LatestSnapshot = Arc<Mutex<Option<SnapshotPacket>>>;
