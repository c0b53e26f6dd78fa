//! Face mesh, hand landmark, and gesture perception for the landmark stream.
//!
//! Backends sit behind the [`FaceLandmarker`], [`HandLandmarker`], and
//! [`GestureClassifier`] traits. [`Perception`] runs all three on a frame and
//! returns one composite record per hand, so a hand's landmarks, handedness,
//! and gesture can never drift out of alignment.

mod adapter;
mod error;
pub mod features;
mod landmark;
mod mouth;
mod suite;
#[cfg(feature = "with-tch")]
mod torch;

pub use adapter::{Disabled, FaceLandmarker, GestureClassifier, HandLandmarker};
pub use error::PerceptionError;
pub use landmark::{
    Detections, FACE_LANDMARK_COUNT, FaceDetection, Gesture, HAND_LANDMARK_COUNT, HandDetection,
    HandLandmarks, Handedness, HandednessScore, Landmark, MouthState,
};
pub use mouth::{DEFAULT_MOUTH_THRESHOLD, LOWER_LIP, UPPER_LIP, mouth_state};
pub use suite::{
    ComputeDevice, DEFAULT_GESTURE_LABELS, DEFAULT_MAX_HANDS, Perception, PerceptionSettings,
};
#[cfg(feature = "with-tch")]
pub use torch::{TorchFaceLandmarker, TorchGestureClassifier, TorchHandLandmarker};
