//! OpenCV-backed camera capture.

use std::thread;

use chrono::Utc;
use crossbeam_channel::{Sender, bounded};
use opencv::{
    core::MatTraitConstManual,
    prelude::*,
    videoio::{self, VideoCapture, VideoCaptureTrait},
};
use tracing::{debug, warn};

use crate::{
    parse_device_index,
    source::ChannelSource,
    types::{CaptureError, Frame, FrameFormat},
};

/// Open `uri` with OpenCV and stream frames at the device's native size from a
/// background thread.
///
/// A failed read ends the stream; OpenCV has no notion of a transient miss
/// that is worth retrying here.
pub fn spawn_opencv_camera(uri: &str) -> Result<ChannelSource, CaptureError> {
    let cap = open_video_capture(uri)?;
    let (tx, rx) = bounded(2);

    thread::Builder::new()
        .name("opencv-capture".into())
        .spawn(move || {
            if let Err(err) = capture_loop(cap, tx.clone()) {
                let _ = tx.send(Err(err));
            }
        })
        .map_err(|err| CaptureError::Other(err.into()))?;

    Ok(ChannelSource::new(format!("opencv:{uri}"), rx))
}

fn capture_loop(
    mut cap: VideoCapture,
    tx: Sender<Result<Frame, CaptureError>>,
) -> Result<(), CaptureError> {
    let mut frame = Mat::default();

    loop {
        let grabbed = cap
            .read(&mut frame)
            .map_err(|e| CaptureError::Other(e.into()))?;
        let size = frame.size().map_err(|e| CaptureError::Other(e.into()))?;
        if !grabbed || size.width <= 0 || size.height <= 0 {
            return Err(CaptureError::Exhausted);
        }

        let data = frame
            .data_bytes()
            .map_err(|e| CaptureError::Other(e.into()))?
            .to_vec();

        if tx
            .send(Ok(Frame {
                data,
                width: size.width,
                height: size.height,
                timestamp_ms: Utc::now().timestamp_millis(),
                format: FrameFormat::Bgr8,
            }))
            .is_err()
        {
            return Ok(());
        }
    }
}

/// Open `uri` as a device index when it looks like one, otherwise as a file or
/// stream URL. V4L2 is tried before letting OpenCV pick a backend.
fn open_video_capture(uri: &str) -> Result<VideoCapture, CaptureError> {
    const BACKENDS: [i32; 2] = [videoio::CAP_V4L, videoio::CAP_ANY];

    let device = parse_device_index(uri);
    for backend in BACKENDS {
        let attempt = match device {
            Some(index) => VideoCapture::new(index, backend),
            None => VideoCapture::from_file(uri, backend),
        };
        match attempt.and_then(|cap| cap.is_opened().map(|opened| (cap, opened))) {
            Ok((cap, true)) => return Ok(cap),
            Ok((_, false)) => debug!("{uri} did not open with backend {backend}"),
            Err(err) => warn!("failed to open {uri} with backend {backend}: {err}"),
        }
    }

    Err(CaptureError::Open {
        uri: uri.to_string(),
    })
}
