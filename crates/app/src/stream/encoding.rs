//! JPEG encoding for the MJPEG preview.

use anyhow::{Context, Result};
use image::{RgbImage, codecs::jpeg::JpegEncoder};

/// Turns an annotated frame into the bytes served on `/video`.
pub(crate) trait FrameEncoder: Send {
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<u8>>;
}

pub(crate) struct JpegFrameEncoder {
    quality: u8,
}

impl JpegFrameEncoder {
    pub(crate) fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
        }
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&mut self, image: &RgbImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::with_capacity(image.as_raw().len() / 8);
        JpegEncoder::new_with_quality(&mut buffer, self.quality)
            .encode_image(image)
            .with_context(|| {
                format!(
                    "Failed to encode {}x{} frame as JPEG",
                    image.width(),
                    image.height()
                )
            })?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn produces_a_jpeg_stream() {
        let image = RgbImage::from_pixel(64, 36, Rgb([200, 40, 10]));
        let bytes = JpegFrameEncoder::new(70).encode(&image).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        assert_eq!(&bytes[bytes.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn lower_quality_yields_smaller_output() {
        let image = RgbImage::from_fn(128, 72, |x, y| Rgb([(x * 2) as u8, (y * 3) as u8, (x ^ y) as u8]));
        let high = JpegFrameEncoder::new(95).encode(&image).unwrap();
        let low = JpegFrameEncoder::new(10).encode(&image).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(JpegFrameEncoder::new(0).quality, 1);
        assert_eq!(JpegFrameEncoder::new(255).quality, 100);
    }
}
