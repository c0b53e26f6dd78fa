use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

use crate::stream::{self, StreamCliArgs, StreamConfig};

#[derive(Debug, Parser)]
#[command(
    name = "landmark-stream",
    version,
    about = "Stream webcam face and hand landmarks as MJPEG plus live events"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Capture continuously and serve `/video`, `/events`, and `/snapshot`.
    Serve(StreamCliArgs),
    /// Capture one frame and print its landmark snapshot as JSON.
    Snapshot(SnapshotCliArgs),
}

#[derive(Debug, Args)]
pub struct SnapshotCliArgs {
    #[command(flatten)]
    pub stream: StreamCliArgs,
    /// Also write the annotated frame to this JPEG file.
    #[arg(long = "output", value_name = "PATH")]
    pub output: Option<PathBuf>,
}

pub fn handle_command(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve(args) => stream::run(StreamConfig::try_from(args)?),
        Command::Snapshot(args) => {
            stream::run_snapshot(StreamConfig::try_from(args.stream)?, args.output)
        }
    }
}
