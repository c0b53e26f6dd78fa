//! Frame preparation ahead of inference: color conversion and resize.

use image::{RgbImage, imageops::FilterType};

use crate::types::{CaptureError, Frame, FrameFormat};

/// Convert a captured frame into an RGB image at `working_size`.
///
/// Landmark coordinates downstream are relative to this image, so every frame
/// must come out at exactly `working_size` regardless of the camera's native
/// resolution.
pub fn prepare_frame(frame: &Frame, working_size: (u32, u32)) -> Result<RgbImage, CaptureError> {
    let expected = frame.expected_len();
    if frame.width <= 0 || frame.height <= 0 || frame.data.len() != expected {
        return Err(CaptureError::BadBuffer {
            width: frame.width,
            height: frame.height,
            expected,
            actual: frame.data.len(),
        });
    }

    let rgb = match frame.format {
        FrameFormat::Rgb8 => frame.data.clone(),
        FrameFormat::Bgr8 => bgr_to_rgb(&frame.data),
    };
    let image = RgbImage::from_raw(frame.width as u32, frame.height as u32, rgb).ok_or(
        CaptureError::BadBuffer {
            width: frame.width,
            height: frame.height,
            expected,
            actual: frame.data.len(),
        },
    )?;

    let (target_w, target_h) = working_size;
    if image.width() == target_w && image.height() == target_h {
        return Ok(image);
    }
    Ok(image::imageops::resize(
        &image,
        target_w,
        target_h,
        FilterType::Triangle,
    ))
}

fn bgr_to_rgb(input: &[u8]) -> Vec<u8> {
    let mut output = Vec::with_capacity(input.len());
    for chunk in input.chunks_exact(3) {
        output.push(chunk[2]);
        output.push(chunk[1]);
        output.push(chunk[0]);
    }
    output
}
