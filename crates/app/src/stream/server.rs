//! Actix Web server exposing the page, the MJPEG feed, and landmark events.
//!
//! The server runs on a dedicated thread with its own actix `System` so the
//! capture loop never shares a runtime with HTTP handlers. Streams are fed by
//! the session's broadcast channels and end when those channels close.

use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};

use actix_web::{
    App, HttpResponse, HttpServer,
    http::header,
    web::{self, Bytes},
};
use anyhow::{Context, Result, anyhow};
use async_stream::stream;
use serde_json::to_string;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    oneshot,
};
use tracing::{debug, error, info};

use crate::stream::{
    data::{FramePacket, LANDMARKS_EVENT, LatestSnapshot, SnapshotPacket, SnapshotResponse},
    session::Subscriptions,
    telemetry,
};

const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Shared state backing HTTP handlers.
pub(crate) struct ServerState {
    snapshots: Mutex<broadcast::Receiver<SnapshotPacket>>,
    frames: Mutex<broadcast::Receiver<FramePacket>>,
    latest: LatestSnapshot,
    index_html: String,
}

impl ServerState {
    pub(crate) fn new(subscriptions: Subscriptions, index_html: String) -> Self {
        Self {
            snapshots: Mutex::new(subscriptions.snapshots),
            frames: Mutex::new(subscriptions.frames),
            latest: subscriptions.latest,
            index_html,
        }
    }

    fn subscribe_snapshots(&self) -> broadcast::Receiver<SnapshotPacket> {
        self.snapshots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .resubscribe()
    }

    fn subscribe_frames(&self) -> broadcast::Receiver<FramePacket> {
        self.frames
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .resubscribe()
    }
}

/// Handle for the server thread.
pub(crate) struct StreamServer {
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl StreamServer {
    /// Signal the server to stop and block until the thread exits.
    pub(crate) fn stop(self) {
        if let Some(tx) = self.shutdown {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle {
            let _ = handle.join();
        }
    }
}

/// Bind `host:port` and serve on a background thread.
///
/// Returns once the listener is bound so a port conflict surfaces as an error
/// before the capture loop starts.
pub(crate) fn spawn_stream_server(host: &str, port: u16, state: ServerState) -> Result<StreamServer> {
    let state = web::Data::new(state);
    let bind_addr = (host.to_string(), port);
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), String>>(1);

    let handle = std::thread::Builder::new()
        .name("stream-server".into())
        .spawn(move || {
            let result = actix_web::rt::System::new().block_on(async move {
                let server = match HttpServer::new(move || {
                    App::new()
                        .app_data(state.clone())
                        .configure(configure_routes)
                })
                .workers(2)
                .shutdown_timeout(5)
                .bind(bind_addr.clone())
                {
                    Ok(bound) => {
                        let _ = ready_tx.send(Ok(()));
                        bound.run()
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(format!(
                            "failed to bind {}:{}: {err}",
                            bind_addr.0, bind_addr.1
                        )));
                        return Ok(());
                    }
                };

                let srv_handle = server.handle();
                actix_web::rt::spawn(async move {
                    let _ = shutdown_rx.await;
                    // Graceful: open streams end on their own once the
                    // broadcast channels close.
                    srv_handle.stop(true).await;
                });

                server.await
            });
            if let Err(err) = result {
                error!("HTTP server error: {err}");
            }
        })
        .context("Failed to spawn stream server thread")?;

    match ready_rx.recv() {
        Ok(Ok(())) => {
            info!("serving on http://{host}:{port}");
            Ok(StreamServer {
                shutdown: Some(shutdown_tx),
                handle: Some(handle),
            })
        }
        Ok(Err(message)) => {
            let _ = handle.join();
            Err(anyhow!(message))
        }
        Err(_) => {
            let _ = handle.join();
            Err(anyhow!("stream server thread exited before binding"))
        }
    }
}

pub(crate) fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index_route))
        .route("/video", web::get().to(video_handler))
        .route("/events", web::get().to(events_handler))
        .route("/snapshot", web::get().to(snapshot_handler))
        .route("/metrics", web::get().to(metrics_handler));
}

async fn index_route(state: web::Data<ServerState>) -> HttpResponse {
    HttpResponse::Ok()
        .content_type("text/html; charset=utf-8")
        .body(state.index_html.clone())
}

/// One part of the multipart MJPEG response.
pub(crate) fn multipart_chunk(packet: &FramePacket) -> Bytes {
    let mut payload = Vec::with_capacity(packet.jpeg.len() + 80);
    payload.extend_from_slice(b"--frame\r\n");
    payload.extend_from_slice(format!("X-Sequence: {}\r\n", packet.frame_number).as_bytes());
    payload.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
    payload.extend_from_slice(&packet.jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

/// Stream encoded frames as `multipart/x-mixed-replace`.
async fn video_handler(state: web::Data<ServerState>) -> HttpResponse {
    let mut rx = state.subscribe_frames();
    let stream = stream! {
        loop {
            match rx.recv().await {
                Ok(packet) => yield Ok::<Bytes, actix_web::Error>(multipart_chunk(&packet)),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("video client lagged; skipped {skipped} frames");
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .append_header((header::CACHE_CONTROL, "no-cache"))
        .append_header((header::CONTENT_TYPE, "multipart/x-mixed-replace; boundary=frame"))
        .streaming(stream)
}

/// Format a snapshot as one SSE event.
pub(crate) fn sse_event(packet: &SnapshotPacket) -> Result<String, serde_json::Error> {
    let json = to_string(packet.snapshot.as_ref())?;
    let mut chunk = String::with_capacity(json.len() + 48);
    chunk.push_str("event: ");
    chunk.push_str(LANDMARKS_EVENT);
    chunk.push('\n');
    chunk.push_str("id: ");
    chunk.push_str(&packet.frame_number.to_string());
    chunk.push('\n');
    chunk.push_str("data: ");
    chunk.push_str(&json);
    chunk.push_str("\n\n");
    Ok(chunk)
}

/// Push one `landmarks_data` event per captured frame as Server-Sent Events.
async fn events_handler(state: web::Data<ServerState>) -> HttpResponse {
    let mut rx = state.subscribe_snapshots();
    let stream = stream! {
        yield Ok::<Bytes, actix_web::Error>(Bytes::from_static(b"retry: 500\n\n"));
        loop {
            match actix_web::rt::time::timeout(SSE_KEEP_ALIVE, rx.recv()).await {
                Ok(Ok(packet)) => match sse_event(&packet) {
                    Ok(chunk) => yield Ok::<Bytes, actix_web::Error>(Bytes::from(chunk)),
                    Err(err) => {
                        let error_chunk = format!("event: error\ndata: {err}\n\n");
                        yield Ok::<Bytes, actix_web::Error>(Bytes::from(error_chunk));
                    }
                },
                Ok(Err(RecvError::Lagged(skipped))) => {
                    debug!("event client lagged; skipped {skipped} snapshots");
                }
                Ok(Err(RecvError::Closed)) => break,
                Err(_) => {
                    yield Ok::<Bytes, actix_web::Error>(Bytes::from_static(b": keep-alive\n\n"));
                }
            }
        }
    };

    HttpResponse::Ok()
        .insert_header((header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"))
        .append_header((header::CACHE_CONTROL, "no-cache"))
        .append_header((header::CONTENT_TYPE, "text/event-stream"))
        .append_header((header::CONNECTION, "keep-alive"))
        .streaming(stream)
}

/// Return the most recent snapshot as JSON.
async fn snapshot_handler(state: web::Data<ServerState>) -> HttpResponse {
    let guard = match state.latest.lock() {
        Ok(guard) => guard,
        Err(err) => return HttpResponse::InternalServerError().body(err.to_string()),
    };
    match guard.as_ref() {
        Some(packet) => HttpResponse::Ok().json(SnapshotResponse {
            frame_number: packet.frame_number,
            timestamp_ms: packet.timestamp_ms,
            snapshot: &packet.snapshot,
        }),
        None => HttpResponse::NoContent().finish(),
    }
}

async fn metrics_handler() -> HttpResponse {
    match telemetry::prometheus_handle() {
        Some(handle) => HttpResponse::Ok()
            .content_type("text/plain; version=0.0.4")
            .body(handle.render()),
        None => HttpResponse::ServiceUnavailable().body("metrics recorder not installed"),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use actix_web::{body::to_bytes, test as actix_test};
    use perception::{Handedness, MouthState};

    use super::*;
    use crate::stream::data::{HandPoint, Snapshot};

    fn channels() -> (
        broadcast::Sender<SnapshotPacket>,
        broadcast::Sender<FramePacket>,
        Subscriptions,
    ) {
        let (snapshot_tx, snapshots) = broadcast::channel(8);
        let (frame_tx, frames) = broadcast::channel(8);
        let subscriptions = Subscriptions {
            snapshots,
            frames,
            latest: Arc::new(Mutex::new(None)),
        };
        (snapshot_tx, frame_tx, subscriptions)
    }

    fn packet(frame_number: u64, snapshot: Snapshot) -> SnapshotPacket {
        SnapshotPacket {
            frame_number,
            timestamp_ms: 1_000 + frame_number as i64,
            snapshot: Arc::new(snapshot),
        }
    }

    #[test]
    fn sse_event_uses_the_landmarks_event_name() {
        let snapshot = Snapshot {
            hands: vec![HandPoint {
                hand: Handedness::Left,
                x: 10,
                y: 20,
                z: 0.5,
            }],
            mouth: MouthState::Open,
            ..Snapshot::default()
        };
        let chunk = sse_event(&packet(7, snapshot)).unwrap();
        assert_eq!(
            chunk,
            "event: landmarks_data\nid: 7\ndata: \
             {\"face\":[],\"hands\":[{\"type\":\"Left\",\"x\":10,\"y\":20,\"z\":0.5}],\
             \"gesture\":\"None\",\"mouth\":\"Open\"}\n\n"
        );
    }

    fn jpeg_packet(frame_number: u64) -> FramePacket {
        FramePacket {
            frame_number,
            jpeg: Bytes::from_static(&[0xFF, 0xD8, 0xFF, 0xD9]),
        }
    }

    #[test]
    fn multipart_chunk_wraps_the_jpeg() {
        let chunk = multipart_chunk(&jpeg_packet(12));
        let mut expected =
            b"--frame\r\nX-Sequence: 12\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        expected.extend_from_slice(&[0xFF, 0xD8, 0xFF, 0xD9]);
        expected.extend_from_slice(b"\r\n");
        assert_eq!(chunk.as_ref(), expected.as_slice());
    }

    #[actix_web::test]
    async fn index_serves_the_configured_page() {
        let (_snapshot_tx, _frame_tx, subs) = channels();
        let state = web::Data::new(ServerState::new(subs, "<html>hi</html>".into()));
        let app =
            actix_test::init_service(App::new().app_data(state).configure(configure_routes)).await;

        let req = actix_test::TestRequest::get().uri("/").to_request();
        let body = actix_test::call_and_read_body(&app, req).await;
        assert_eq!(body.as_ref(), b"<html>hi</html>");
    }

    #[actix_web::test]
    async fn snapshot_is_no_content_until_the_first_frame() {
        let (_snapshot_tx, _frame_tx, subs) = channels();
        let latest = subs.latest.clone();
        let state = web::Data::new(ServerState::new(subs, String::new()));
        let app =
            actix_test::init_service(App::new().app_data(state).configure(configure_routes)).await;

        let req = actix_test::TestRequest::get().uri("/snapshot").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::NO_CONTENT);

        *latest.lock().unwrap() = Some(packet(4, Snapshot::default()));
        let req = actix_test::TestRequest::get().uri("/snapshot").to_request();
        let json: serde_json::Value = actix_test::call_and_read_body_json(&app, req).await;
        assert_eq!(json["frame_number"], 4);
        assert_eq!(json["timestamp_ms"], 1_004);
        assert_eq!(json["gesture"], "None");
        assert_eq!(json["mouth"], "Closed");
    }

    #[actix_web::test]
    async fn events_stream_one_event_per_snapshot_then_ends() {
        let (snapshot_tx, _frame_tx, subs) = channels();
        let state = web::Data::new(ServerState::new(subs, String::new()));
        let app =
            actix_test::init_service(App::new().app_data(state).configure(configure_routes)).await;

        let req = actix_test::TestRequest::get().uri("/events").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "text/event-stream"
        );

        snapshot_tx.send(packet(1, Snapshot::default())).unwrap();
        snapshot_tx.send(packet(2, Snapshot::default())).unwrap();
        drop(snapshot_tx);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("retry: 500\n\n"));
        assert_eq!(text.matches("event: landmarks_data\n").count(), 2);
        let first = text.find("id: 1\n").unwrap();
        let second = text.find("id: 2\n").unwrap();
        assert!(first < second);
    }

    #[actix_web::test]
    async fn video_stream_emits_multipart_parts_then_ends() {
        let (_snapshot_tx, frame_tx, subs) = channels();
        let state = web::Data::new(ServerState::new(subs, String::new()));
        let app =
            actix_test::init_service(App::new().app_data(state).configure(configure_routes)).await;

        let req = actix_test::TestRequest::get().uri("/video").to_request();
        let resp = actix_test::call_service(&app, req).await;
        assert_eq!(
            resp.headers().get(header::CONTENT_TYPE).unwrap(),
            "multipart/x-mixed-replace; boundary=frame"
        );

        for frame_number in 1..=2 {
            frame_tx.send(jpeg_packet(frame_number)).unwrap();
        }
        drop(frame_tx);

        let body = to_bytes(resp.into_body()).await.unwrap();
        let expected = [multipart_chunk(&jpeg_packet(1)), multipart_chunk(&jpeg_packet(2))].concat();
        assert_eq!(body.as_ref(), expected.as_slice());
    }

    fn free_port() -> u16 {
        std::net::TcpListener::bind(("127.0.0.1", 0))
            .unwrap()
            .local_addr()
            .unwrap()
            .port()
    }

    /// Issue a streaming GET and read until `marker` shows up in the response.
    fn open_stream(port: u16, path: &str, marker: &str) -> (std::net::TcpStream, Vec<u8>) {
        use std::io::{Read, Write};

        let mut stream = std::net::TcpStream::connect(("127.0.0.1", port)).unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(10)))
            .unwrap();
        write!(
            stream,
            "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n"
        )
        .unwrap();

        let mut received = Vec::new();
        let mut buf = [0u8; 4096];
        while !String::from_utf8_lossy(&received).contains(marker) {
            let n = stream.read(&mut buf).unwrap();
            assert!(n > 0, "connection closed before {marker:?}");
            received.extend_from_slice(&buf[..n]);
        }
        (stream, received)
    }

    fn read_rest(mut stream: std::net::TcpStream, mut received: Vec<u8>) -> String {
        use std::io::Read;

        stream.read_to_end(&mut received).unwrap();
        String::from_utf8_lossy(&received).into_owned()
    }

    #[test]
    fn open_streams_finish_cleanly_when_capture_ends() {
        let (snapshot_tx, frame_tx, subs) = channels();
        let port = free_port();
        let server = spawn_stream_server("127.0.0.1", port, ServerState::new(subs, String::new()))
            .unwrap();

        // Both handlers have subscribed once their first bytes arrive.
        let (events, events_head) = open_stream(port, "/events", "retry: 500");
        let (video, video_head) = open_stream(port, "/video", "\r\n\r\n");

        for frame_number in 1..=3 {
            snapshot_tx.send(packet(frame_number, Snapshot::default())).unwrap();
            frame_tx.send(jpeg_packet(frame_number)).unwrap();
        }
        drop(snapshot_tx);
        drop(frame_tx);
        server.stop();

        let events = read_rest(events, events_head);
        assert_eq!(events.matches("event: landmarks_data\n").count(), 3);
        assert!(events.contains("id: 3\n"));
        assert!(events.ends_with("0\r\n\r\n"), "truncated event stream: {events:?}");

        let video = read_rest(video, video_head);
        assert_eq!(video.matches("--frame\r\n").count(), 3);
        assert!(video.ends_with("0\r\n\r\n"), "truncated video stream: {video:?}");
    }
}
