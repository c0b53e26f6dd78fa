//! Configuration parsing for the landmark stream.
//!
//! CLI arguments are validated once here and turned into a `StreamConfig`
//! which downstream stages use without re-parsing flags.

use std::path::PathBuf;

use anyhow::{Result, bail};
use clap::{Args, ValueEnum};
use perception::{
    ComputeDevice, DEFAULT_GESTURE_LABELS, DEFAULT_MAX_HANDS, DEFAULT_MOUTH_THRESHOLD,
    PerceptionSettings,
};

pub(crate) const DEFAULT_WORKING_WIDTH: u32 = 640;
pub(crate) const DEFAULT_WORKING_HEIGHT: u32 = 360;
pub(crate) const DEFAULT_JPEG_QUALITY: u8 = 70;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
/// Backend used to pull frames from the camera.
pub enum CaptureBackend {
    /// `ffmpeg` subprocess emitting raw BGR frames.
    Ffmpeg,
    /// OpenCV `VideoCapture` (requires the `opencv` feature).
    Opencv,
}

#[derive(Clone, Debug)]
/// Canonical configuration shared by every stage.
pub struct StreamConfig {
    /// Camera index, device path, file, or URI.
    pub source: String,
    pub capture: CaptureBackend,
    /// Resolution every frame is resized to before inference.
    pub working_size: (u32, u32),
    pub jpeg_quality: u8,
    pub perception: PerceptionSettings,
    pub host: String,
    pub port: u16,
    /// Replacement for the built-in index page.
    pub index_page: Option<PathBuf>,
    /// Log per-frame detection details.
    pub verbose: bool,
    pub telemetry: TelemetryOptions,
}

#[derive(Clone, Debug, Default)]
/// Optional telemetry knobs for tracing.
pub struct TelemetryOptions {
    /// Write a Chrome trace JSON file capturing pipeline spans.
    pub chrome_trace_path: Option<PathBuf>,
}

/// CLI arguments shared by the `serve` and `snapshot` subcommands.
#[derive(Debug, Args)]
pub struct StreamCliArgs {
    /// Camera index, `/dev/videoN`, file path, or stream URI.
    #[arg(long = "source", value_name = "URI", default_value = "0")]
    pub source: String,
    /// Capture backend.
    #[arg(long = "capture", value_enum, default_value_t = CaptureBackend::Ffmpeg)]
    pub capture: CaptureBackend,
    /// Working width frames are resized to before inference.
    #[arg(long = "width", value_name = "PX", default_value_t = DEFAULT_WORKING_WIDTH)]
    pub width: u32,
    /// Working height frames are resized to before inference.
    #[arg(long = "height", value_name = "PX", default_value_t = DEFAULT_WORKING_HEIGHT)]
    pub height: u32,
    /// JPEG quality used by the MJPEG encoder (1-100).
    #[arg(long = "jpeg-quality", value_name = "QUALITY", default_value_t = DEFAULT_JPEG_QUALITY)]
    pub jpeg_quality: u8,
    /// Lip gap (normalized units) above which the mouth counts as open.
    #[arg(long = "mouth-threshold", value_name = "DIST", default_value_t = DEFAULT_MOUTH_THRESHOLD)]
    pub mouth_threshold: f32,
    /// TorchScript face mesh model.
    #[arg(long = "face-model", value_name = "PATH")]
    pub face_model: Option<PathBuf>,
    /// TorchScript hand landmark model.
    #[arg(long = "hand-model", value_name = "PATH")]
    pub hand_model: Option<PathBuf>,
    /// TorchScript gesture classifier.
    #[arg(long = "gesture-model", value_name = "PATH")]
    pub gesture_model: Option<PathBuf>,
    /// Gesture labels in classifier output order.
    #[arg(long = "gesture-labels", value_name = "LABELS", value_delimiter = ',')]
    pub gesture_labels: Option<Vec<String>>,
    /// Minimum hand presence score for a hand to be reported.
    #[arg(long = "min-hand-confidence", value_name = "SCORE", default_value_t = 0.5)]
    pub min_hand_confidence: f32,
    /// Maximum number of hands reported per frame.
    #[arg(long = "max-hands", value_name = "N", default_value_t = DEFAULT_MAX_HANDS)]
    pub max_hands: usize,
    /// Minimum face presence score for a face to be reported.
    #[arg(long = "min-face-confidence", value_name = "SCORE", default_value_t = 0.5)]
    pub min_face_confidence: f32,
    /// Minimum gesture score for a gesture to be reported.
    #[arg(long = "min-gesture-score", value_name = "SCORE", default_value_t = 0.5)]
    pub min_gesture_score: f32,
    /// Force CPU inference.
    #[arg(long = "cpu", action = clap::ArgAction::SetTrue)]
    pub use_cpu: bool,
    /// Address the HTTP server binds to.
    #[arg(long = "host", value_name = "ADDR", default_value = "127.0.0.1")]
    pub host: String,
    /// Port the HTTP server binds to.
    #[arg(long = "port", value_name = "PORT", default_value_t = 5000)]
    pub port: u16,
    /// HTML file served at `/` instead of the built-in page.
    #[arg(long = "index", value_name = "PATH")]
    pub index_page: Option<PathBuf>,
    /// Enable verbose logging (per-frame detections).
    #[arg(long = "verbose", action = clap::ArgAction::SetTrue)]
    pub verbose: bool,
    /// Emit Chrome trace JSON for post-mortem analysis.
    #[arg(long = "chrome-trace", value_name = "PATH")]
    pub chrome_trace: Option<PathBuf>,
}

impl TryFrom<StreamCliArgs> for StreamConfig {
    type Error = anyhow::Error;

    fn try_from(args: StreamCliArgs) -> Result<Self> {
        if args.source.trim().is_empty() {
            bail!("--source must not be empty");
        }
        if args.width == 0 || args.height == 0 {
            bail!("Working width and height must be positive integers");
        }
        if !(1..=100).contains(&args.jpeg_quality) {
            bail!("--jpeg-quality must be an integer between 1 and 100");
        }
        if !args.mouth_threshold.is_finite() || args.mouth_threshold <= 0.0 {
            bail!("--mouth-threshold must be a positive number");
        }
        for (flag, value) in [
            ("--min-hand-confidence", args.min_hand_confidence),
            ("--min-face-confidence", args.min_face_confidence),
            ("--min-gesture-score", args.min_gesture_score),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{flag} must be between 0 and 1");
            }
        }
        if args.max_hands == 0 {
            bail!("--max-hands must be at least 1");
        }
        if args.capture == CaptureBackend::Opencv && !cfg!(feature = "opencv") {
            bail!("--capture opencv requires building with the `opencv` feature");
        }

        let gesture_labels = match args.gesture_labels {
            Some(labels) => {
                let labels: Vec<String> = labels
                    .into_iter()
                    .map(|label| label.trim().to_string())
                    .filter(|label| !label.is_empty())
                    .collect();
                if labels.is_empty() {
                    bail!("--gesture-labels must name at least one label");
                }
                labels
            }
            None => DEFAULT_GESTURE_LABELS.iter().map(|s| s.to_string()).collect(),
        };

        let perception = PerceptionSettings {
            face_model: args.face_model,
            hand_model: args.hand_model,
            gesture_model: args.gesture_model,
            device: if args.use_cpu {
                ComputeDevice::Cpu
            } else {
                ComputeDevice::CudaIfAvailable
            },
            min_face_presence: args.min_face_confidence,
            min_hand_presence: args.min_hand_confidence,
            max_hands: args.max_hands,
            min_gesture_score: args.min_gesture_score,
            gesture_labels,
            mouth_threshold: args.mouth_threshold,
            ..PerceptionSettings::default()
        };

        Ok(Self {
            source: args.source,
            capture: args.capture,
            working_size: (args.width, args.height),
            jpeg_quality: args.jpeg_quality,
            perception,
            host: args.host,
            port: args.port,
            index_page: args.index_page,
            verbose: args.verbose,
            telemetry: TelemetryOptions {
                chrome_trace_path: args.chrome_trace,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[derive(Parser)]
    struct Harness {
        #[command(flatten)]
        args: StreamCliArgs,
    }

    fn parse(argv: &[&str]) -> Result<StreamConfig> {
        let mut full = vec!["landmark-stream"];
        full.extend_from_slice(argv);
        let harness = Harness::try_parse_from(full)?;
        StreamConfig::try_from(harness.args)
    }

    #[test]
    fn defaults_match_the_reference_setup() {
        let config = parse(&[]).unwrap();
        assert_eq!(config.source, "0");
        assert_eq!(config.capture, CaptureBackend::Ffmpeg);
        assert_eq!(config.working_size, (640, 360));
        assert_eq!(config.jpeg_quality, 70);
        assert_eq!(config.perception.mouth_threshold, 0.05);
        assert_eq!(config.perception.gesture_labels.len(), 8);
        assert_eq!(config.perception.device, ComputeDevice::CudaIfAvailable);
        assert_eq!((config.host.as_str(), config.port), ("127.0.0.1", 5000));
        assert!(config.index_page.is_none());
        assert_eq!(config.perception.max_hands, 2);
    }

    #[test]
    fn flags_override_defaults() {
        let config = parse(&[
            "--source",
            "/dev/video2",
            "--width",
            "320",
            "--height",
            "180",
            "--jpeg-quality",
            "90",
            "--cpu",
            "--gesture-labels",
            "None, Fist ,Palm",
            "--port",
            "8080",
            "--max-hands",
            "4",
        ])
        .unwrap();
        assert_eq!(config.source, "/dev/video2");
        assert_eq!(config.working_size, (320, 180));
        assert_eq!(config.jpeg_quality, 90);
        assert_eq!(config.perception.device, ComputeDevice::Cpu);
        assert_eq!(config.perception.gesture_labels, vec!["None", "Fist", "Palm"]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.perception.max_hands, 4);
    }

    #[test]
    fn rejects_out_of_range_values() {
        assert!(parse(&["--jpeg-quality", "0"]).is_err());
        assert!(parse(&["--width", "0"]).is_err());
        assert!(parse(&["--mouth-threshold", "-1"]).is_err());
        assert!(parse(&["--min-gesture-score", "1.5"]).is_err());
        assert!(parse(&["--gesture-labels", " , "]).is_err());
        assert!(parse(&["--max-hands", "0"]).is_err());
    }

    #[cfg(not(feature = "opencv"))]
    #[test]
    fn opencv_capture_needs_the_feature() {
        assert!(parse(&["--capture", "opencv"]).is_err());
    }
}
