//! FFmpeg subprocess capture emitting raw BGR frames over stdout.

use std::{
    io::{ErrorKind, Read},
    process::{Command, Stdio},
    thread,
};

use anyhow::anyhow;
use chrono::Utc;
use crossbeam_channel::{Sender, bounded};
use tracing::debug;

use crate::{
    parse_device_index,
    source::ChannelSource,
    types::{CaptureError, Frame, FrameFormat},
};

/// Spawn `ffmpeg` against a camera device (index or `/dev/videoN`), a file, or
/// any URI ffmpeg understands, scaling output to `target_size`.
pub fn spawn_ffmpeg_camera(
    uri: &str,
    target_size: (i32, i32),
) -> Result<ChannelSource, CaptureError> {
    let (is_v4l, ffmpeg_uri) = if let Some(index) = parse_device_index(uri) {
        (true, format!("/dev/video{index}"))
    } else if uri.starts_with("/dev/video") {
        (true, uri.to_string())
    } else {
        (false, uri.to_string())
    };

    let mut cmd = Command::new("ffmpeg");
    cmd.arg("-hide_banner")
        .arg("-loglevel")
        .arg("error")
        .arg("-fflags")
        .arg("nobuffer")
        .arg("-flags")
        .arg("low_delay");

    if is_v4l {
        cmd.arg("-f").arg("video4linux2");
    } else {
        // Files are read at their native frame rate.
        cmd.arg("-re");
    }

    cmd.arg("-i")
        .arg(&ffmpeg_uri)
        .arg("-an")
        .arg("-vf")
        .arg(format!("scale={}:{}", target_size.0, target_size.1))
        .arg("-pix_fmt")
        .arg("bgr24")
        .arg("-f")
        .arg("rawvideo")
        .arg("-")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::inherit());

    debug!("spawning ffmpeg capture for {ffmpeg_uri}");
    let mut child = cmd.spawn().map_err(|err| {
        CaptureError::Other(anyhow!("failed to spawn ffmpeg for {ffmpeg_uri}: {err}"))
    })?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| CaptureError::Other(anyhow!("failed to capture ffmpeg stdout")))?;

    let (tx, rx) = bounded(2);
    thread::Builder::new()
        .name("ffmpeg-capture".into())
        .spawn(move || {
            if let Err(err) = ffmpeg_loop(stdout, target_size, tx.clone()) {
                let _ = tx.send(Err(err));
            }
            let _ = child.kill();
            let _ = child.wait();
        })
        .map_err(|err| CaptureError::Other(err.into()))?;

    Ok(ChannelSource::new(format!("ffmpeg:{ffmpeg_uri}"), rx))
}

/// Slice a raw `bgr24` byte stream into frames until EOF or the consumer hangs up.
fn ffmpeg_loop(
    mut stdout: impl Read,
    target_size: (i32, i32),
    tx: Sender<Result<Frame, CaptureError>>,
) -> Result<(), CaptureError> {
    let frame_bytes = (target_size.0 as usize) * (target_size.1 as usize) * 3;
    let mut buffer = vec![0u8; frame_bytes];

    loop {
        match stdout.read_exact(&mut buffer) {
            Ok(()) => {
                let timestamp_ms = Utc::now().timestamp_millis();
                if tx
                    .send(Ok(Frame {
                        data: buffer.clone(),
                        width: target_size.0,
                        height: target_size.1,
                        timestamp_ms,
                        format: FrameFormat::Bgr8,
                    }))
                    .is_err()
                {
                    return Ok(());
                }
            }
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => {
                return Err(CaptureError::Exhausted);
            }
            Err(err) => return Err(CaptureError::Other(err.into())),
        }
    }
}
