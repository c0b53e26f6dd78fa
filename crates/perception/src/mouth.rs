use crate::landmark::{Landmark, MouthState};

/// Face mesh index of the inner upper lip.
pub const UPPER_LIP: usize = 13;
/// Face mesh index of the inner lower lip.
pub const LOWER_LIP: usize = 14;
pub const DEFAULT_MOUTH_THRESHOLD: f32 = 0.05;

/// Classify the mouth as open when the lip gap exceeds `threshold`.
///
/// Meshes too short to contain both lip points are reported as closed.
pub fn mouth_state(landmarks: &[Landmark], threshold: f32) -> MouthState {
    match (landmarks.get(UPPER_LIP), landmarks.get(LOWER_LIP)) {
        (Some(upper), Some(lower)) if upper.distance(lower) > threshold => MouthState::Open,
        _ => MouthState::Closed,
    }
}
