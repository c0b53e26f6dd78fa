//! Model-independent helpers for turning raw tensors into detections.

use crate::{
    error::PerceptionError,
    landmark::{Gesture, HAND_LANDMARK_COUNT, HandLandmarks, Handedness, HandednessScore, Landmark},
};

/// Label a classifier uses for "no gesture".
pub const NO_GESTURE: &str = "None";

/// Decode a flat `[x0, y0, z0, x1, ...]` buffer expressed in model input
/// pixels into normalized landmarks.
pub fn decode_landmarks(coords: &[f32], input_size: f32) -> Vec<Landmark> {
    let scale = if input_size > 0.0 { input_size } else { 1.0 };
    coords
        .chunks_exact(3)
        .map(|c| Landmark::new(c[0] / scale, c[1] / scale, c[2] / scale))
        .collect()
}

/// Interpret a "probability of right hand" output.
pub fn handedness_from_probability(p_right: f32) -> HandednessScore {
    let p_right = p_right.clamp(0.0, 1.0);
    if p_right > 0.5 {
        HandednessScore {
            label: Handedness::Right,
            score: p_right,
        }
    } else {
        HandednessScore {
            label: Handedness::Left,
            score: 1.0 - p_right,
        }
    }
}

/// Decode a batched hand model output with `N` candidate slots.
///
/// `coords` holds `N * 21 * 3` input-pixel coordinates, `presence` and
/// `right_probability` one value per slot. Slots under `min_presence` are
/// dropped; at most `max_hands` survive, most confident first.
pub fn decode_hands(
    coords: &[f32],
    presence: &[f32],
    right_probability: &[f32],
    input_size: f32,
    min_presence: f32,
    max_hands: usize,
) -> Result<Vec<HandLandmarks>, PerceptionError> {
    let slots = presence.len();
    let per_hand = HAND_LANDMARK_COUNT * 3;
    if coords.len() != slots * per_hand || right_probability.len() != slots {
        return Err(PerceptionError::UnexpectedOutput {
            kind: "hand",
            detail: format!(
                "{slots} presence scores but {} coordinates and {} handedness scores",
                coords.len(),
                right_probability.len()
            ),
        });
    }

    let mut kept: Vec<usize> = (0..slots)
        .filter(|&slot| presence[slot] >= min_presence)
        .collect();
    kept.sort_by(|&a, &b| presence[b].total_cmp(&presence[a]));
    kept.truncate(max_hands);

    Ok(kept
        .into_iter()
        .map(|slot| HandLandmarks {
            landmarks: decode_landmarks(
                &coords[slot * per_hand..(slot + 1) * per_hand],
                input_size,
            ),
            handedness: handedness_from_probability(right_probability[slot]),
        })
        .collect())
}

pub fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit).exp())
}

pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum <= 0.0 || !sum.is_finite() {
        return vec![0.0; logits.len()];
    }
    exps.into_iter().map(|v| v / sum).collect()
}

/// Flatten hand landmarks into classifier features: translated so the wrist
/// (landmark 0) is the origin and scaled so the largest absolute coordinate
/// is 1.
pub fn hand_features(landmarks: &[Landmark]) -> Vec<f32> {
    let origin = landmarks.first().copied().unwrap_or_default();
    let mut features = Vec::with_capacity(landmarks.len() * 3);
    for lm in landmarks {
        features.push(lm.x - origin.x);
        features.push(lm.y - origin.y);
        features.push(lm.z - origin.z);
    }
    let extent = features.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
    if extent > 0.0 {
        for value in &mut features {
            *value /= extent;
        }
    }
    features
}

/// Pick the highest scoring category, discarding the "None" class and
/// anything under `min_score`.
pub fn top_gesture(scores: &[f32], labels: &[String], min_score: f32) -> Option<Gesture> {
    let (index, score) = scores
        .iter()
        .copied()
        .enumerate()
        .max_by(|a, b| a.1.total_cmp(&b.1))?;
    let category = labels.get(index)?;
    if category == NO_GESTURE || score < min_score {
        return None;
    }
    Some(Gesture {
        category: category.clone(),
        score,
    })
}

/// Fail when a classifier scores a different number of classes than it
/// has labels for.
pub fn check_label_count(labels: usize, classes: usize) -> Result<(), PerceptionError> {
    if labels != classes {
        return Err(PerceptionError::LabelMismatch {
            expected: labels,
            actual: classes,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels() -> Vec<String> {
        ["None", "Closed_Fist", "Thumb_Up"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    #[test]
    fn decodes_pixel_space_landmarks() {
        let lms = decode_landmarks(&[96.0, 48.0, 19.2, 0.0, 192.0, -9.6], 192.0);
        assert_eq!(lms.len(), 2);
        assert!((lms[0].x - 0.5).abs() < 1e-6);
        assert!((lms[0].y - 0.25).abs() < 1e-6);
        assert!((lms[0].z - 0.1).abs() < 1e-6);
        assert!((lms[1].y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn handedness_picks_the_likelier_side() {
        let right = handedness_from_probability(0.8);
        assert_eq!(right.label, Handedness::Right);
        assert!((right.score - 0.8).abs() < 1e-6);

        let left = handedness_from_probability(0.1);
        assert_eq!(left.label, Handedness::Left);
        assert!((left.score - 0.9).abs() < 1e-6);
    }

    #[test]
    fn softmax_sums_to_one() {
        let probs = softmax(&[1.0, 2.0, 3.0]);
        let total: f32 = probs.iter().sum();
        assert!((total - 1.0).abs() < 1e-5);
        assert!(probs[2] > probs[1] && probs[1] > probs[0]);
    }

    #[test]
    fn hand_features_are_wrist_relative_and_unit_scaled() {
        let hand = vec![
            Landmark::new(0.5, 0.5, 0.0),
            Landmark::new(0.7, 0.4, 0.0),
            Landmark::new(0.5, 0.9, 0.1),
        ];
        let features = hand_features(&hand);
        assert_eq!(features.len(), 9);
        assert_eq!(&features[0..3], &[0.0, 0.0, 0.0]);
        let max = features.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
        assert!((max - 1.0).abs() < 1e-6);
        assert!((features[7] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn top_gesture_skips_none_class_and_low_scores() {
        let labels = labels();
        assert_eq!(top_gesture(&[0.8, 0.1, 0.1], &labels, 0.5), None);
        assert_eq!(top_gesture(&[0.2, 0.4, 0.4001], &labels, 0.5), None);

        let gesture = top_gesture(&[0.05, 0.05, 0.9], &labels, 0.5).unwrap();
        assert_eq!(gesture.category, "Thumb_Up");
        assert!((gesture.score - 0.9).abs() < 1e-6);
    }

    /// Three slots whose wrists sit at x = 10, 20, 30 input pixels.
    fn three_slot_coords() -> Vec<f32> {
        (0..3)
            .flat_map(|slot| {
                (0..HAND_LANDMARK_COUNT).flat_map(move |_| [10.0 * (slot + 1) as f32, 50.0, 0.0])
            })
            .collect()
    }

    #[test]
    fn decode_hands_keeps_confident_slots_best_first() {
        let hands = decode_hands(
            &three_slot_coords(),
            &[0.7, 0.2, 0.9],
            &[0.1, 0.9, 0.8],
            100.0,
            0.5,
            2,
        )
        .unwrap();

        assert_eq!(hands.len(), 2);
        assert_eq!(hands[0].handedness.label, Handedness::Right);
        assert!((hands[0].landmarks[0].x - 0.3).abs() < 1e-6);
        assert_eq!(hands[1].handedness.label, Handedness::Left);
        assert!((hands[1].landmarks[0].x - 0.1).abs() < 1e-6);
        assert!(hands.iter().all(|h| h.landmarks.len() == HAND_LANDMARK_COUNT));
    }

    #[test]
    fn decode_hands_caps_at_max_hands() {
        let hands = decode_hands(
            &three_slot_coords(),
            &[0.9, 0.8, 0.7],
            &[0.9, 0.9, 0.9],
            100.0,
            0.5,
            1,
        )
        .unwrap();
        assert_eq!(hands.len(), 1);
        assert!((hands[0].landmarks[0].x - 0.1).abs() < 1e-6);
    }

    #[test]
    fn decode_hands_rejects_mismatched_shapes() {
        let err = decode_hands(&three_slot_coords(), &[0.9, 0.8], &[0.9, 0.9], 100.0, 0.5, 2)
            .unwrap_err();
        assert!(matches!(err, PerceptionError::UnexpectedOutput { kind: "hand", .. }));
    }

    #[test]
    fn top_gesture_handles_empty_scores() {
        assert_eq!(top_gesture(&[], &labels(), 0.0), None);
    }

    #[test]
    fn label_count_must_match_the_classifier_width() {
        assert!(check_label_count(8, 8).is_ok());
        let err = check_label_count(8, 5).unwrap_err();
        assert!(matches!(
            err,
            PerceptionError::LabelMismatch {
                expected: 8,
                actual: 5
            }
        ));
        assert!(check_label_count(0, 3).is_err());
    }
}
