//! Process-level wiring: telemetry, Ctrl+C, the server, and the session.

use std::{
    fs,
    path::PathBuf,
    sync::{
        Arc, Once,
        atomic::{AtomicBool, Ordering},
    },
};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::{
    html::index::INDEX_HTML,
    stream::{
        config::StreamConfig,
        still::capture_snapshot,
        server::{ServerState, spawn_stream_server},
        session::{PipelineOutcome, Session},
        telemetry,
    },
};

/// Serve the landmark stream until the camera runs dry or Ctrl+C is pressed.
pub fn run(config: StreamConfig) -> Result<()> {
    static CTRL_HANDLER: Once = Once::new();

    let _telemetry_guard = telemetry::init_tracing(&config.telemetry);
    let _ = telemetry::init_metrics_recorder();

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_shutdown = shutdown.clone();
    CTRL_HANDLER.call_once(move || {
        if let Err(err) = ctrlc::set_handler(move || {
            handler_shutdown.store(true, Ordering::SeqCst);
        }) {
            warn!("Failed to install Ctrl+C handler: {err}");
        }
    });

    let pipeline_span = tracing::info_span!(
        "landmark.pipeline",
        source = %config.source,
        width = config.working_size.0,
        height = config.working_size.1,
        jpeg_quality = config.jpeg_quality
    );
    let _pipeline_guard = pipeline_span.enter();

    let index_html = load_index_page(config.index_page.as_ref())?;
    let (mut session, subscriptions) = Session::from_config(&config)?;
    let server = spawn_stream_server(
        &config.host,
        config.port,
        ServerState::new(subscriptions, index_html),
    )?;

    let result = session.run(&shutdown);
    // Dropping the session closes the broadcast channels and ends open streams.
    drop(session);
    server.stop();

    match result? {
        PipelineOutcome::SourceExhausted { frames } => {
            warn!("capture ended after {frames} frames");
        }
        PipelineOutcome::Shutdown { frames } => {
            info!("shutdown requested; served {frames} frames");
        }
    }
    Ok(())
}

/// Capture a single frame and print its snapshot as JSON.
pub fn run_snapshot(config: StreamConfig, output: Option<PathBuf>) -> Result<()> {
    let _telemetry_guard = telemetry::init_tracing(&config.telemetry);

    let (mut session, _subscriptions) = Session::from_config(&config)?;
    let (source, perception) = session.parts_mut();
    let snapshot = capture_snapshot(
        source,
        perception,
        config.working_size,
        config.jpeg_quality,
        output.as_deref(),
    )?;

    let json =
        serde_json::to_string_pretty(&snapshot).context("Failed to serialise snapshot")?;
    println!("{json}");
    Ok(())
}

fn load_index_page(path: Option<&PathBuf>) -> Result<String> {
    match path {
        Some(path) => fs::read_to_string(path)
            .with_context(|| format!("Failed to read index page {}", path.display())),
        None => Ok(INDEX_HTML.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn index_page_defaults_to_the_built_in_page() {
        let page = load_index_page(None).unwrap();
        assert!(page.contains("/video"));
        assert!(page.contains("landmarks_data"));
    }

    #[test]
    fn index_page_can_be_overridden() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "<p>custom</p>").unwrap();
        let page = load_index_page(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(page, "<p>custom</p>");
    }

    #[test]
    fn missing_index_page_is_an_error() {
        let err = load_index_page(Some(&PathBuf::from("/nonexistent/index.html"))).unwrap_err();
        assert!(err.to_string().contains("/nonexistent/index.html"));
    }
}
