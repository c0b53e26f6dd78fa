//! Camera capture for the landmark stream.
//!
//! Backends run on their own thread and hand frames to the consumer through a
//! small bounded queue; the consumer pulls them one at a time through
//! [`FrameSource`].

#[cfg(feature = "opencv")]
mod camera;
mod ffmpeg;
mod prepare;
mod source;
mod types;

#[cfg(feature = "opencv")]
pub use camera::spawn_opencv_camera;
pub use ffmpeg::spawn_ffmpeg_camera;
pub use prepare::prepare_frame;
pub use source::{ChannelSource, FrameSource};
pub use types::{CaptureError, Frame, FrameFormat};

/// Parse a `/dev/videoX` style URI or bare index and return the device index.
pub(crate) fn parse_device_index(uri: &str) -> Option<i32> {
    if let Ok(index) = uri.parse::<i32>() {
        return Some(index);
    }
    if let Some(stripped) = uri.strip_prefix("/dev/video") {
        if !stripped.is_empty() && stripped.chars().all(|c| c.is_ascii_digit()) {
            return stripped.parse::<i32>().ok();
        }
    }
    None
}
