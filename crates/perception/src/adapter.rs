//! Adapter seams around pre-trained landmark and gesture models.
//!
//! Every adapter is invoked once per frame on the same working image. Any
//! smoothing a backend does across frames is its own business; callers make no
//! assumptions about it.

use image::RgbImage;

use crate::{
    error::PerceptionError,
    landmark::{Gesture, HandLandmarks, Landmark},
};

/// Face mesh extraction. Returns one landmark list per detected face.
pub trait FaceLandmarker: Send {
    fn name(&self) -> &'static str;

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Vec<Landmark>>, PerceptionError>;
}

/// Hand landmark extraction with handedness classification.
pub trait HandLandmarker: Send {
    fn name(&self) -> &'static str;

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<HandLandmarks>, PerceptionError>;
}

/// Discrete gesture classification for a single detected hand.
///
/// `Ok(None)` means no gesture cleared the backend's confidence bar.
pub trait GestureClassifier: Send {
    fn name(&self) -> &'static str;

    fn classify(
        &mut self,
        image: &RgbImage,
        hand: &HandLandmarks,
    ) -> Result<Option<Gesture>, PerceptionError>;
}

/// Stand-in used when no model is configured: never detects anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct Disabled;

impl FaceLandmarker for Disabled {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Vec<Landmark>>, PerceptionError> {
        Ok(Vec::new())
    }
}

impl HandLandmarker for Disabled {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn detect(&mut self, _image: &RgbImage) -> Result<Vec<HandLandmarks>, PerceptionError> {
        Ok(Vec::new())
    }
}

impl GestureClassifier for Disabled {
    fn name(&self) -> &'static str {
        "disabled"
    }

    fn classify(
        &mut self,
        _image: &RgbImage,
        _hand: &HandLandmarks,
    ) -> Result<Option<Gesture>, PerceptionError> {
        Ok(None)
    }
}
