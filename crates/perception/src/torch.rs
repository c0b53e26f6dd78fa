//! TorchScript landmark and gesture backends.
//!
//! Model contracts (all inputs NCHW float RGB in `[0, 1]`):
//! - face: `[1, 3, S, S]` → `(landmarks [1, 468 * 3] in input pixels, face logit [1, 1])`
//! - hand: `[1, 3, S, S]` → `(landmarks [1, N, 21 * 3] in input pixels,
//!   presence [1, N], probability of a right hand [1, N])` for `N` candidate slots
//! - gesture: wrist-relative hand features `[1, 63]` → logits `[1, K]`
//!
//! The face model reports at most one face per call.

use std::{path::Path, sync::Once};

use image::{RgbImage, imageops::FilterType};
use tch::{CModule, Cuda, Device, IValue, Kind, Tensor};
use tracing::{debug, info, warn};

use crate::{
    adapter::{FaceLandmarker, GestureClassifier, HandLandmarker},
    error::PerceptionError,
    features::{
        check_label_count, decode_hands, decode_landmarks, hand_features, sigmoid, softmax,
        top_gesture,
    },
    landmark::{FACE_LANDMARK_COUNT, Gesture, HAND_LANDMARK_COUNT, HandLandmarks, Landmark},
    suite::ComputeDevice,
};

/// Resolve the configured device, preloading the libtorch CUDA libraries
/// first so `cuda_if_available` can see them.
pub(crate) fn select_device(requested: ComputeDevice) -> Device {
    match requested {
        ComputeDevice::Cpu => Device::Cpu,
        ComputeDevice::CudaIfAvailable => {
            load_torch_cuda_runtime();
            let device = Device::cuda_if_available();
            debug!(
                "CUDA available: {} (devices: {})",
                Cuda::is_available(),
                Cuda::device_count()
            );
            device
        }
    }
}

#[cfg(unix)]
fn load_torch_cuda_runtime() {
    use libloading::os::unix::{Library, RTLD_GLOBAL, RTLD_NOW};

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let mut handles = Vec::new();
        for lib in [
            "libtorch_cuda.so",
            "libtorch_cuda_cu.so",
            "libtorch_cuda_cpp.so",
        ] {
            match unsafe { Library::open(Some(lib), RTLD_NOW | RTLD_GLOBAL) } {
                Ok(handle) => {
                    info!("Loaded {lib}");
                    handles.push(handle);
                }
                Err(err) => debug!("{lib} not loaded: {err}"),
            }
        }
        // The libraries must stay resident for the life of the process.
        Box::leak(Box::new(handles));
    });
}

#[cfg(not(unix))]
fn load_torch_cuda_runtime() {
    static INIT: Once = Once::new();
    INIT.call_once(|| debug!("skipping CUDA runtime preload on this platform"));
}

fn load_module(kind: &'static str, path: &Path, device: Device) -> Result<CModule, PerceptionError> {
    let mut module =
        CModule::load_on_device(path, device).map_err(|err| PerceptionError::ModelLoad {
            kind,
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
    module.set_eval();
    info!("{kind} model loaded from {} on {device:?}", path.display());
    Ok(module)
}

/// Resize to a square model input and lay out as `[1, 3, S, S]` in `[0, 1]`.
fn image_to_tensor(image: &RgbImage, size: i64, device: Device) -> Tensor {
    let side = size as u32;
    let resized;
    let source = if image.width() == side && image.height() == side {
        image
    } else {
        resized = image::imageops::resize(image, side, side, FilterType::Triangle);
        &resized
    };
    Tensor::from_slice(source.as_raw())
        .to_device(device)
        .to_kind(Kind::Float)
        .view([1, size, size, 3])
        .permute([0, 3, 1, 2])
        / 255.0
}

fn forward(module: &CModule, input: Tensor) -> Result<IValue, PerceptionError> {
    Ok(tch::no_grad(|| module.forward_is(&[IValue::Tensor(input)]))?)
}

/// Unpack a model result into at least `expected` tensors.
fn output_tensors(
    kind: &'static str,
    value: IValue,
    expected: usize,
) -> Result<Vec<Tensor>, PerceptionError> {
    let items = match value {
        IValue::Tuple(items) | IValue::GenericList(items) => items,
        IValue::Tensor(tensor) => vec![IValue::Tensor(tensor)],
        other => {
            return Err(PerceptionError::UnexpectedOutput {
                kind,
                detail: format!("expected tensor outputs, got {other:?}"),
            });
        }
    };
    let mut tensors = Vec::with_capacity(items.len());
    for item in items {
        match item {
            IValue::Tensor(tensor) => tensors.push(tensor),
            other => {
                return Err(PerceptionError::UnexpectedOutput {
                    kind,
                    detail: format!("non-tensor output {other:?}"),
                });
            }
        }
    }
    if tensors.len() < expected {
        return Err(PerceptionError::UnexpectedOutput {
            kind,
            detail: format!("expected {expected} outputs, got {}", tensors.len()),
        });
    }
    Ok(tensors)
}

fn tensor_values(tensor: &Tensor) -> Result<Vec<f32>, PerceptionError> {
    let flat = tensor
        .to_device(Device::Cpu)
        .to_kind(Kind::Float)
        .flatten(0, -1);
    Ok(Vec::<f32>::try_from(&flat)?)
}

fn first_value(kind: &'static str, tensor: &Tensor) -> Result<f32, PerceptionError> {
    tensor_values(tensor)?
        .first()
        .copied()
        .ok_or_else(|| PerceptionError::UnexpectedOutput {
            kind,
            detail: "empty score tensor".into(),
        })
}

fn landmarks_from(
    kind: &'static str,
    tensor: &Tensor,
    count: usize,
    input_size: i64,
) -> Result<Vec<Landmark>, PerceptionError> {
    let coords = tensor_values(tensor)?;
    if coords.len() != count * 3 {
        return Err(PerceptionError::UnexpectedOutput {
            kind,
            detail: format!("expected {} coordinates, got {}", count * 3, coords.len()),
        });
    }
    Ok(decode_landmarks(&coords, input_size as f32))
}

/// Face mesh TorchScript module.
pub struct TorchFaceLandmarker {
    module: CModule,
    device: Device,
    input_size: i64,
    min_presence: f32,
}

impl TorchFaceLandmarker {
    pub fn load(
        path: &Path,
        device: Device,
        input_size: i64,
        min_presence: f32,
    ) -> Result<Self, PerceptionError> {
        Ok(Self {
            module: load_module("face", path, device)?,
            device,
            input_size,
            min_presence,
        })
    }
}

impl FaceLandmarker for TorchFaceLandmarker {
    fn name(&self) -> &'static str {
        "torchscript"
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<Vec<Landmark>>, PerceptionError> {
        let input = image_to_tensor(image, self.input_size, self.device);
        let outputs = output_tensors("face", forward(&self.module, input)?, 2)?;
        let presence = sigmoid(first_value("face", &outputs[1])?);
        if presence < self.min_presence {
            return Ok(Vec::new());
        }
        let landmarks = landmarks_from("face", &outputs[0], FACE_LANDMARK_COUNT, self.input_size)?;
        Ok(vec![landmarks])
    }
}

/// Hand landmark TorchScript module.
pub struct TorchHandLandmarker {
    module: CModule,
    device: Device,
    input_size: i64,
    min_presence: f32,
    max_hands: usize,
}

impl TorchHandLandmarker {
    pub fn load(
        path: &Path,
        device: Device,
        input_size: i64,
        min_presence: f32,
        max_hands: usize,
    ) -> Result<Self, PerceptionError> {
        Ok(Self {
            module: load_module("hand", path, device)?,
            device,
            input_size,
            min_presence,
            max_hands,
        })
    }
}

impl HandLandmarker for TorchHandLandmarker {
    fn name(&self) -> &'static str {
        "torchscript"
    }

    fn detect(&mut self, image: &RgbImage) -> Result<Vec<HandLandmarks>, PerceptionError> {
        let input = image_to_tensor(image, self.input_size, self.device);
        let outputs = output_tensors("hand", forward(&self.module, input)?, 3)?;
        decode_hands(
            &tensor_values(&outputs[0])?,
            &tensor_values(&outputs[1])?,
            &tensor_values(&outputs[2])?,
            self.input_size as f32,
            self.min_presence,
            self.max_hands,
        )
    }
}

/// Gesture classifier over hand landmark features.
pub struct TorchGestureClassifier {
    module: CModule,
    device: Device,
    labels: Vec<String>,
    min_score: f32,
}

impl TorchGestureClassifier {
    pub fn load(
        path: &Path,
        device: Device,
        labels: Vec<String>,
        min_score: f32,
    ) -> Result<Self, PerceptionError> {
        if labels.is_empty() {
            warn!("gesture classifier configured without labels; every hand will be unclassified");
        }
        let classifier = Self {
            module: load_module("gesture", path, device)?,
            device,
            labels,
            min_score,
        };
        let classes = classifier.logits(&[0.0; HAND_LANDMARK_COUNT * 3])?.len();
        check_label_count(classifier.labels.len(), classes)?;
        debug!("gesture classifier scores {classes} classes");
        Ok(classifier)
    }

    fn logits(&self, features: &[f32]) -> Result<Vec<f32>, PerceptionError> {
        let input = Tensor::from_slice(features)
            .to_device(self.device)
            .view([1, features.len() as i64]);
        let outputs = output_tensors("gesture", forward(&self.module, input)?, 1)?;
        tensor_values(&outputs[0])
    }
}

impl GestureClassifier for TorchGestureClassifier {
    fn name(&self) -> &'static str {
        "torchscript"
    }

    fn classify(
        &mut self,
        _image: &RgbImage,
        hand: &HandLandmarks,
    ) -> Result<Option<Gesture>, PerceptionError> {
        let logits = self.logits(&hand_features(&hand.landmarks))?;
        check_label_count(self.labels.len(), logits.len())?;
        Ok(top_gesture(&softmax(&logits), &self.labels, self.min_score))
    }
}
