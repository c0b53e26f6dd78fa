//! Runs every perception adapter over one frame and assembles the results.

use std::path::PathBuf;

use image::RgbImage;
use tracing::{debug, info};

use crate::{
    adapter::{Disabled, FaceLandmarker, GestureClassifier, HandLandmarker},
    error::PerceptionError,
    landmark::{Detections, FaceDetection, HandDetection},
    mouth::{DEFAULT_MOUTH_THRESHOLD, mouth_state},
};

/// Gesture categories of the stock MediaPipe gesture recognizer, in model
/// output order.
pub const DEFAULT_GESTURE_LABELS: [&str; 8] = [
    "None",
    "Closed_Fist",
    "Open_Palm",
    "Pointing_Up",
    "Thumb_Down",
    "Thumb_Up",
    "Victory",
    "ILoveYou",
];

/// Hands tracked per frame unless configured otherwise.
pub const DEFAULT_MAX_HANDS: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ComputeDevice {
    Cpu,
    CudaIfAvailable,
}

/// Everything needed to build a [`Perception`] suite.
#[derive(Clone, Debug)]
pub struct PerceptionSettings {
    pub face_model: Option<PathBuf>,
    pub hand_model: Option<PathBuf>,
    pub gesture_model: Option<PathBuf>,
    pub device: ComputeDevice,
    pub face_input_size: i64,
    pub hand_input_size: i64,
    pub min_face_presence: f32,
    pub min_hand_presence: f32,
    /// Upper bound on hands reported per frame.
    pub max_hands: usize,
    pub min_gesture_score: f32,
    pub gesture_labels: Vec<String>,
    pub mouth_threshold: f32,
}

impl Default for PerceptionSettings {
    fn default() -> Self {
        Self {
            face_model: None,
            hand_model: None,
            gesture_model: None,
            device: ComputeDevice::CudaIfAvailable,
            face_input_size: 192,
            hand_input_size: 224,
            min_face_presence: 0.5,
            min_hand_presence: 0.5,
            max_hands: DEFAULT_MAX_HANDS,
            min_gesture_score: 0.5,
            gesture_labels: DEFAULT_GESTURE_LABELS.iter().map(|s| s.to_string()).collect(),
            mouth_threshold: DEFAULT_MOUTH_THRESHOLD,
        }
    }
}

/// Face, hand, and gesture adapters plus the mouth heuristic.
pub struct Perception {
    face: Box<dyn FaceLandmarker>,
    hands: Box<dyn HandLandmarker>,
    gestures: Box<dyn GestureClassifier>,
    mouth_threshold: f32,
}

impl Perception {
    pub fn new(
        face: Box<dyn FaceLandmarker>,
        hands: Box<dyn HandLandmarker>,
        gestures: Box<dyn GestureClassifier>,
        mouth_threshold: f32,
    ) -> Self {
        Self {
            face,
            hands,
            gestures,
            mouth_threshold,
        }
    }

    /// A suite that never detects anything.
    pub fn disabled() -> Self {
        Self::new(
            Box::new(Disabled),
            Box::new(Disabled),
            Box::new(Disabled),
            DEFAULT_MOUTH_THRESHOLD,
        )
    }

    /// Build TorchScript adapters for every configured model path.
    #[cfg(feature = "with-tch")]
    pub fn from_settings(settings: &PerceptionSettings) -> Result<Self, PerceptionError> {
        use crate::torch::{self, TorchFaceLandmarker, TorchGestureClassifier, TorchHandLandmarker};

        let device = torch::select_device(settings.device);
        info!("perception device: {device:?}");

        let face: Box<dyn FaceLandmarker> = match &settings.face_model {
            Some(path) => Box::new(TorchFaceLandmarker::load(
                path,
                device,
                settings.face_input_size,
                settings.min_face_presence,
            )?),
            None => {
                info!("no face model configured; face mesh disabled");
                Box::new(Disabled)
            }
        };
        let hands: Box<dyn HandLandmarker> = match &settings.hand_model {
            Some(path) => Box::new(TorchHandLandmarker::load(
                path,
                device,
                settings.hand_input_size,
                settings.min_hand_presence,
                settings.max_hands,
            )?),
            None => {
                info!("no hand model configured; hand landmarks disabled");
                Box::new(Disabled)
            }
        };
        let gestures: Box<dyn GestureClassifier> = match &settings.gesture_model {
            Some(path) => Box::new(TorchGestureClassifier::load(
                path,
                device,
                settings.gesture_labels.clone(),
                settings.min_gesture_score,
            )?),
            None => {
                info!("no gesture model configured; gesture recognition disabled");
                Box::new(Disabled)
            }
        };

        Ok(Self::new(face, hands, gestures, settings.mouth_threshold))
    }

    /// Without TorchScript support every adapter is disabled.
    #[cfg(not(feature = "with-tch"))]
    pub fn from_settings(settings: &PerceptionSettings) -> Result<Self, PerceptionError> {
        let configured = [
            ("face", &settings.face_model),
            ("hand", &settings.hand_model),
            ("gesture", &settings.gesture_model),
        ];
        for (kind, path) in configured {
            if let Some(path) = path {
                tracing::warn!(
                    "built without `with-tch`; ignoring {kind} model {}",
                    path.display()
                );
            }
        }
        info!("perception disabled; snapshots will carry no detections");
        let mut suite = Self::disabled();
        suite.mouth_threshold = settings.mouth_threshold;
        Ok(suite)
    }

    pub fn describe(&self) -> String {
        format!(
            "face={} hands={} gestures={}",
            self.face.name(),
            self.hands.name(),
            self.gestures.name()
        )
    }

    pub fn mouth_threshold(&self) -> f32 {
        self.mouth_threshold
    }

    /// Run the face and hand adapters on `image`, classify a gesture for each
    /// hand, and derive the mouth state of each face.
    pub fn analyze(&mut self, image: &RgbImage) -> Result<Detections, PerceptionError> {
        let faces = self
            .face
            .detect(image)?
            .into_iter()
            .map(|landmarks| FaceDetection {
                mouth: mouth_state(&landmarks, self.mouth_threshold),
                landmarks,
            })
            .collect::<Vec<_>>();

        let raw_hands = self.hands.detect(image)?;
        let mut hands = Vec::with_capacity(raw_hands.len());
        for hand in raw_hands {
            let gesture = self.gestures.classify(image, &hand)?;
            hands.push(HandDetection {
                landmarks: hand.landmarks,
                handedness: hand.handedness,
                gesture,
            });
        }

        debug!(faces = faces.len(), hands = hands.len(), "perception pass");
        Ok(Detections { faces, hands })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::landmark::{
        Gesture, HandLandmarks, Handedness, HandednessScore, Landmark, MouthState,
    };

    struct FixedFaces(Vec<Vec<Landmark>>);

    impl FaceLandmarker for FixedFaces {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<Vec<Landmark>>, PerceptionError> {
            Ok(self.0.clone())
        }
    }

    struct FixedHands(Vec<HandLandmarks>);

    impl HandLandmarker for FixedHands {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<HandLandmarks>, PerceptionError> {
            Ok(self.0.clone())
        }
    }

    /// Labels right hands as thumbs up and leaves left hands unclassified.
    struct RightThumbs;

    impl GestureClassifier for RightThumbs {
        fn name(&self) -> &'static str {
            "right-thumbs"
        }

        fn classify(
            &mut self,
            _image: &RgbImage,
            hand: &HandLandmarks,
        ) -> Result<Option<Gesture>, PerceptionError> {
            Ok(match hand.handedness.label {
                Handedness::Right => Some(Gesture {
                    category: "Thumb_Up".into(),
                    score: 0.9,
                }),
                Handedness::Left => None,
            })
        }
    }

    struct Broken;

    impl HandLandmarker for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn detect(&mut self, _image: &RgbImage) -> Result<Vec<HandLandmarks>, PerceptionError> {
            Err(PerceptionError::UnexpectedOutput {
                kind: "hand",
                detail: "boom".into(),
            })
        }
    }

    fn hand(label: Handedness) -> HandLandmarks {
        HandLandmarks {
            landmarks: vec![Landmark::new(0.5, 0.5, 0.0); 21],
            handedness: HandednessScore { label, score: 0.8 },
        }
    }

    fn open_mouth_face() -> Vec<Landmark> {
        let mut mesh = vec![Landmark::default(); 468];
        mesh[14] = Landmark::new(0.0, 0.1, 0.0);
        mesh
    }

    #[test]
    fn pairs_each_hand_with_its_own_gesture() {
        let mut suite = Perception::new(
            Box::new(FixedFaces(vec![open_mouth_face()])),
            Box::new(FixedHands(vec![
                hand(Handedness::Left),
                hand(Handedness::Right),
            ])),
            Box::new(RightThumbs),
            DEFAULT_MOUTH_THRESHOLD,
        );
        let detections = suite.analyze(&RgbImage::new(4, 4)).unwrap();

        assert_eq!(detections.faces.len(), 1);
        assert_eq!(detections.faces[0].mouth, MouthState::Open);
        assert_eq!(detections.hands.len(), 2);
        assert_eq!(detections.hands[0].gesture, None);
        assert_eq!(
            detections.hands[1].gesture.as_ref().map(|g| g.category.as_str()),
            Some("Thumb_Up")
        );
    }

    #[test]
    fn disabled_suite_detects_nothing() {
        let mut suite = Perception::disabled();
        let detections = suite.analyze(&RgbImage::new(8, 8)).unwrap();
        assert!(detections.is_empty());
        assert_eq!(suite.describe(), "face=disabled hands=disabled gestures=disabled");
    }

    #[test]
    fn adapter_errors_propagate() {
        let mut suite = Perception::new(
            Box::new(Disabled),
            Box::new(Broken),
            Box::new(Disabled),
            DEFAULT_MOUTH_THRESHOLD,
        );
        assert!(matches!(
            suite.analyze(&RgbImage::new(2, 2)),
            Err(PerceptionError::UnexpectedOutput { kind: "hand", .. })
        ));
    }

    #[cfg(not(feature = "with-tch"))]
    #[test]
    fn settings_without_torch_keep_the_mouth_threshold() {
        let settings = PerceptionSettings {
            mouth_threshold: 0.2,
            ..PerceptionSettings::default()
        };
        let suite = Perception::from_settings(&settings).unwrap();
        assert_eq!(suite.mouth_threshold(), 0.2);
    }
}
