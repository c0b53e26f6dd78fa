//! The capture → perception → annotate → publish loop.
//!
//! A `Session` owns the frame source and the model adapters for the lifetime
//! of the process. Each iteration runs every stage in order on one frame;
//! consumers are decoupled through broadcast channels so a slow viewer never
//! stalls capture.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
    time::Instant,
};

use actix_web::web::Bytes;
use anyhow::{Context, Result};
use perception::Perception;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use video_ingest::{CaptureError, FrameSource, prepare_frame};

use crate::stream::{
    annotation::annotate_frame,
    config::{CaptureBackend, StreamConfig},
    data::{FramePacket, LatestSnapshot, Snapshot, SnapshotPacket},
    encoding::{FrameEncoder, JpegFrameEncoder},
};

/// Slots per broadcast channel; receivers further behind than this skip ahead.
pub(crate) const BROADCAST_CAPACITY: usize = 16;

/// Why the loop stopped, with the number of frames it produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PipelineOutcome {
    SourceExhausted { frames: u64 },
    Shutdown { frames: u64 },
}

/// Receivers handed to the HTTP server. They are only templates: each client
/// gets a fresh `resubscribe()` so it sees events from the moment it joins.
pub(crate) struct Subscriptions {
    pub(crate) snapshots: broadcast::Receiver<SnapshotPacket>,
    pub(crate) frames: broadcast::Receiver<FramePacket>,
    pub(crate) latest: LatestSnapshot,
}

pub(crate) struct Session {
    source: Box<dyn FrameSource>,
    perception: Perception,
    working_size: (u32, u32),
    encoder: Box<dyn FrameEncoder>,
    snapshot_tx: broadcast::Sender<SnapshotPacket>,
    frame_tx: broadcast::Sender<FramePacket>,
    latest: LatestSnapshot,
    verbose: bool,
}

impl Session {
    pub(crate) fn new(
        source: Box<dyn FrameSource>,
        perception: Perception,
        working_size: (u32, u32),
        encoder: Box<dyn FrameEncoder>,
    ) -> (Self, Subscriptions) {
        let (snapshot_tx, snapshot_rx) = broadcast::channel(BROADCAST_CAPACITY);
        let (frame_tx, frame_rx) = broadcast::channel(BROADCAST_CAPACITY);
        let latest: LatestSnapshot = Arc::new(Mutex::new(None));

        let session = Self {
            source,
            perception,
            working_size,
            encoder,
            snapshot_tx,
            frame_tx,
            latest: latest.clone(),
            verbose: false,
        };
        let subscriptions = Subscriptions {
            snapshots: snapshot_rx,
            frames: frame_rx,
            latest,
        };
        (session, subscriptions)
    }

    /// Open the configured camera and load the perception models.
    pub(crate) fn from_config(config: &StreamConfig) -> Result<(Self, Subscriptions)> {
        let source = open_source(config)?;
        let perception = Perception::from_settings(&config.perception)
            .context("Failed to initialise perception models")?;
        info!(
            "capture source: {} | perception: {}",
            source.describe(),
            perception.describe()
        );

        let (mut session, subscriptions) = Self::new(
            source,
            perception,
            config.working_size,
            Box::new(JpegFrameEncoder::new(config.jpeg_quality)),
        );
        session.verbose = config.verbose;
        Ok((session, subscriptions))
    }

    /// Borrow the frame source and perception suite for one-off use.
    pub(crate) fn parts_mut(&mut self) -> (&mut dyn FrameSource, &mut Perception) {
        (&mut *self.source, &mut self.perception)
    }

    /// Run until the source is exhausted or `shutdown` is raised.
    ///
    /// Capture failures and perception errors end the loop; encode failures
    /// only drop that frame's JPEG. The snapshot for every captured frame is
    /// published before encoding is attempted.
    pub(crate) fn run(&mut self, shutdown: &AtomicBool) -> Result<PipelineOutcome> {
        let (width, height) = self.working_size;
        let mut frame_number: u64 = 0;
        let mut smoothed_fps = 0.0f32;
        let mut last_instant = Instant::now();

        loop {
            if shutdown.load(Ordering::SeqCst) {
                return Ok(PipelineOutcome::Shutdown {
                    frames: frame_number,
                });
            }

            let capture_start = Instant::now();
            let frame = match tracing::info_span!("capture.read")
                .in_scope(|| self.source.read_frame())
            {
                Ok(frame) => frame,
                Err(CaptureError::Exhausted) => {
                    warn!(
                        "capture source {} produced no frame; stopping after {frame_number} frames",
                        self.source.describe()
                    );
                    return Ok(PipelineOutcome::SourceExhausted {
                        frames: frame_number,
                    });
                }
                Err(err) => {
                    return Err(err).with_context(|| {
                        format!("Capture from {} failed", self.source.describe())
                    });
                }
            };
            metrics::counter!("frames_captured_total").increment(1);
            metrics::histogram!("stage_latency_seconds", "stage" => "capture")
                .record(capture_start.elapsed().as_secs_f64());

            frame_number += 1;
            let frame_span = tracing::info_span!(
                "frame",
                frame = frame_number,
                width = frame.width,
                height = frame.height,
                timestamp = frame.timestamp_ms
            );
            let _frame_guard = frame_span.enter();

            let now = Instant::now();
            let elapsed = now.duration_since(last_instant).as_secs_f32();
            last_instant = now;
            if elapsed > 0.0 {
                let instant = 1.0 / elapsed;
                smoothed_fps = if smoothed_fps == 0.0 {
                    instant
                } else {
                    0.9 * smoothed_fps + 0.1 * instant
                };
            }
            metrics::gauge!("pipeline_fps").set(smoothed_fps as f64);
            if frame_number % 30 == 0 {
                debug!("heartbeat: frame #{frame_number}, {smoothed_fps:.1} fps");
            }

            let stage_start = Instant::now();
            let mut image = prepare_frame(&frame, self.working_size)
                .with_context(|| format!("Frame #{frame_number} could not be prepared"))?;
            metrics::histogram!("stage_latency_seconds", "stage" => "prepare")
                .record(stage_start.elapsed().as_secs_f64());

            let stage_start = Instant::now();
            let detections = tracing::info_span!("perception.analyze")
                .in_scope(|| self.perception.analyze(&image))
                .with_context(|| format!("Perception failed on frame #{frame_number}"))?;
            metrics::histogram!("stage_latency_seconds", "stage" => "perception")
                .record(stage_start.elapsed().as_secs_f64());

            let snapshot = Arc::new(Snapshot::from_detections(&detections, width, height));
            if self.verbose {
                info!(
                    "frame #{frame_number}: {} face points, {} hand points, gesture={}, mouth={}",
                    snapshot.face.len(),
                    snapshot.hands.len(),
                    snapshot.gesture,
                    snapshot.mouth.label()
                );
            }

            let stage_start = Instant::now();
            annotate_frame(&mut image, &detections);
            metrics::histogram!("stage_latency_seconds", "stage" => "annotate")
                .record(stage_start.elapsed().as_secs_f64());

            self.publish_snapshot(SnapshotPacket {
                frame_number,
                timestamp_ms: frame.timestamp_ms,
                snapshot,
            });

            let stage_start = Instant::now();
            let encoded = tracing::info_span!("encode.jpeg").in_scope(|| self.encoder.encode(&image));
            metrics::histogram!("stage_latency_seconds", "stage" => "encode")
                .record(stage_start.elapsed().as_secs_f64());
            match encoded {
                Ok(jpeg) => {
                    // No subscribers is not an error.
                    let _ = self.frame_tx.send(FramePacket {
                        frame_number,
                        jpeg: Bytes::from(jpeg),
                    });
                }
                Err(err) => {
                    metrics::counter!("frames_encode_errors_total").increment(1);
                    warn!("skipping frame #{frame_number}: {err:#}");
                }
            }
        }
    }

    fn publish_snapshot(&self, packet: SnapshotPacket) {
        match self.latest.lock() {
            Ok(mut guard) => *guard = Some(packet.clone()),
            Err(err) => warn!("latest snapshot lock poisoned: {err}"),
        }
        let _ = self.snapshot_tx.send(packet);
        metrics::counter!("snapshots_published_total").increment(1);
    }
}

fn open_source(config: &StreamConfig) -> Result<Box<dyn FrameSource>> {
    let (width, height) = config.working_size;
    match config.capture {
        CaptureBackend::Ffmpeg => {
            let source = video_ingest::spawn_ffmpeg_camera(
                &config.source,
                (width as i32, height as i32),
            )
            .with_context(|| format!("Failed to start ffmpeg capture for {}", config.source))?;
            Ok(Box::new(source))
        }
        #[cfg(feature = "opencv")]
        CaptureBackend::Opencv => {
            let source = video_ingest::spawn_opencv_camera(&config.source)
                .with_context(|| format!("Failed to open {} with OpenCV", config.source))?;
            Ok(Box::new(source))
        }
        #[cfg(not(feature = "opencv"))]
        CaptureBackend::Opencv => {
            anyhow::bail!("--capture opencv requires building with the `opencv` feature")
        }
    }
}
