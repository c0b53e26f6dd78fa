//! Blocking pull interface over capture backends.

use crossbeam_channel::Receiver;

use crate::types::{CaptureError, Frame};

/// A camera or stream that hands out one frame per call.
///
/// Any error means no frame is available; callers treat it as the end of the
/// source.
pub trait FrameSource: Send {
    /// Human readable identifier used in logs.
    fn describe(&self) -> String;

    /// Block until the next frame is ready.
    fn read_frame(&mut self) -> Result<Frame, CaptureError>;
}

/// Pull adapter over a background reader thread.
pub struct ChannelSource {
    label: String,
    rx: Receiver<Result<Frame, CaptureError>>,
}

impl ChannelSource {
    pub fn new(label: impl Into<String>, rx: Receiver<Result<Frame, CaptureError>>) -> Self {
        Self {
            label: label.into(),
            rx,
        }
    }
}

impl FrameSource for ChannelSource {
    fn describe(&self) -> String {
        self.label.clone()
    }

    fn read_frame(&mut self) -> Result<Frame, CaptureError> {
        match self.rx.recv() {
            Ok(result) => result,
            Err(_) => Err(CaptureError::Exhausted),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FrameFormat;

    fn frame(ts: i64) -> Frame {
        Frame {
            data: vec![0; 12],
            width: 2,
            height: 2,
            timestamp_ms: ts,
            format: FrameFormat::Bgr8,
        }
    }

    #[test]
    fn yields_frames_in_order_then_exhausts() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        tx.send(Ok(frame(1))).unwrap();
        tx.send(Ok(frame(2))).unwrap();
        drop(tx);

        let mut source = ChannelSource::new("test", rx);
        assert_eq!(source.read_frame().unwrap().timestamp_ms, 1);
        assert_eq!(source.read_frame().unwrap().timestamp_ms, 2);
        assert!(matches!(source.read_frame(), Err(CaptureError::Exhausted)));
    }

    #[test]
    fn forwards_reader_errors() {
        let (tx, rx) = crossbeam_channel::bounded(1);
        tx.send(Err(CaptureError::Open { uri: "7".into() })).unwrap();
        let mut source = ChannelSource::new("test", rx);
        assert!(matches!(
            source.read_frame(),
            Err(CaptureError::Open { uri }) if uri == "7"
        ));
    }
}
