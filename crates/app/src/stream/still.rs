//! One-shot capture used by the `snapshot` subcommand.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use perception::Perception;
use tracing::info;
use video_ingest::{FrameSource, prepare_frame};

use crate::stream::{
    annotation::annotate_frame,
    data::Snapshot,
    encoding::{FrameEncoder, JpegFrameEncoder},
};

/// Grab one frame, run perception on it, and return its snapshot. When
/// `output` is set the annotated frame is written there as a JPEG.
pub(crate) fn capture_snapshot(
    source: &mut dyn FrameSource,
    perception: &mut Perception,
    working_size: (u32, u32),
    jpeg_quality: u8,
    output: Option<&Path>,
) -> Result<Snapshot> {
    let frame = source
        .read_frame()
        .with_context(|| format!("No frame available from {}", source.describe()))?;
    let mut image = prepare_frame(&frame, working_size).context("Failed to prepare frame")?;
    let detections = perception
        .analyze(&image)
        .context("Perception failed on the captured frame")?;
    let snapshot = Snapshot::from_detections(&detections, working_size.0, working_size.1);

    if let Some(path) = output {
        annotate_frame(&mut image, &detections);
        let jpeg = JpegFrameEncoder::new(jpeg_quality).encode(&image)?;
        fs::write(path, &jpeg)
            .with_context(|| format!("Failed to write annotated frame to {}", path.display()))?;
        info!("annotated frame written to {}", path.display());
    }

    Ok(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::session::tests::ScriptedSource;

    #[test]
    fn writes_the_annotated_frame_and_returns_the_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.jpg");
        let mut source = ScriptedSource::solid(1, 80, 45);
        let mut perception = Perception::disabled();

        let snapshot =
            capture_snapshot(&mut source, &mut perception, (160, 90), 70, Some(&path)).unwrap();

        assert_eq!(snapshot, Snapshot::default());
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (160, 90));
    }

    #[test]
    fn an_empty_source_is_an_error() {
        let mut source = ScriptedSource::solid(0, 8, 8);
        let mut perception = Perception::disabled();
        let err = capture_snapshot(&mut source, &mut perception, (8, 8), 70, None).unwrap_err();
        assert!(format!("{err:#}").contains("No frame available from scripted"));
    }
}
