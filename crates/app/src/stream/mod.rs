//! Live landmark stream: capture, perception, annotation, and HTTP fan-out.
//!
//! - `config`: CLI flags and the validated `StreamConfig`.
//! - `session`: the per-frame loop and its broadcast channels.
//! - `pipeline`: process wiring for the `serve` and `snapshot` commands.
//! - `server`: Actix Web routes for the page, MJPEG, SSE, and metrics.
//! - `data`: snapshot and packet types shared by the loop and the server.
//! - `annotation`: overlay drawing.
//! - `encoding`: JPEG encoding.
//! - `still`: single-frame capture.
//! - `telemetry`: tracing and Prometheus setup.

pub use config::{StreamCliArgs, StreamConfig};
pub use pipeline::{run, run_snapshot};

mod annotation;
mod config;
mod data;
mod encoding;
mod pipeline;
mod server;
mod session;
mod still;
mod telemetry;
