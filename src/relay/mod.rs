//! Phone relay: receives side-view frames from a phone browser over HTTP,
//! analyses each one with the relay profile, and serves status, alerts, a
//! live MJPEG view and a QR code for pairing.
//!
//! The accept loop hands every connection to its own thread, so an idle or
//! slow client never holds up uploads and status polls.

mod http;
pub mod multipart;
mod pages;
mod qr;
mod state;

pub use http::MAX_BODY_BYTES;
pub use pages::{OPERATOR_PAGE, PHONE_PAGE};
pub use qr::qr_png;
pub use state::{RelayState, RelayStatus, STATUS_FEED_STOPPED};

use anyhow::{anyhow, Result};
use serde_json::json;
use std::io::Write;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::config::RelaySettings;
use http::{read_body, read_head, write_json_response, write_response, HttpRequest};

const HTML: &str = "text/html; charset=utf-8";

#[derive(Clone, Debug)]
pub struct RelayConfig {
    pub addr: String,
    pub phone_url: String,
    pub stream_interval: Duration,
}

impl From<&RelaySettings> for RelayConfig {
    fn from(settings: &RelaySettings) -> Self {
        Self {
            addr: settings.addr.clone(),
            phone_url: settings.phone_url.clone(),
            stream_interval: settings.stream_interval,
        }
    }
}

#[derive(Debug)]
pub struct RelayHandle {
    pub addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl RelayHandle {
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("relay server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct RelayServer {
    cfg: RelayConfig,
    state: Arc<Mutex<RelayState>>,
}

impl RelayServer {
    pub fn new(cfg: RelayConfig, state: Arc<Mutex<RelayState>>) -> Self {
        Self { cfg, state }
    }

    pub fn spawn(self) -> Result<RelayHandle> {
        let listener = TcpListener::bind(self.cfg.addr.as_str())?;
        let addr = listener.local_addr()?;
        listener.set_nonblocking(true)?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("proctor-relay".to_string())
            .spawn(move || {
                if let Err(err) = run_relay(listener, self.cfg, self.state, shutdown_thread) {
                    log::error!("relay server stopped: {}", err);
                }
            })?;
        log::info!("relay listening on http://{}", addr);

        Ok(RelayHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }
}

// ---------------------------------------------------------------------------
// Accept loop and routing
// ---------------------------------------------------------------------------

fn run_relay(
    listener: TcpListener,
    cfg: RelayConfig,
    state: Arc<Mutex<RelayState>>,
    shutdown: Arc<AtomicBool>,
) -> Result<()> {
    let qr: Arc<Option<Vec<u8>>> = Arc::new(match qr_png(&cfg.phone_url) {
        Ok(png) => Some(png),
        Err(err) => {
            log::warn!("qr code unavailable for '{}': {:#}", cfg.phone_url, err);
            None
        }
    });
    let cfg = Arc::new(cfg);
    let mut connections: Vec<JoinHandle<()>> = Vec::new();
    loop {
        if shutdown.load(Ordering::SeqCst) {
            break;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                stream.set_nonblocking(false)?;
                let cfg = cfg.clone();
                let state = state.clone();
                let qr = qr.clone();
                let shutdown = shutdown.clone();
                let connection = std::thread::Builder::new()
                    .name("proctor-conn".to_string())
                    .spawn(move || {
                        let png = qr.as_deref();
                        if let Err(err) = handle_connection(stream, &cfg, &state, png, &shutdown) {
                            log::warn!("relay request from {} rejected: {:#}", peer, err);
                        }
                    })?;
                connections.push(connection);
                connections.retain(|connection| !connection.is_finished());
            }
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(50));
                continue;
            }
            Err(err) => return Err(err.into()),
        }
    }
    for connection in connections {
        let _ = connection.join();
    }
    Ok(())
}

/// Serves one connection on its own thread. `/stream` keeps it until the viewer leaves.
fn handle_connection(
    mut stream: TcpStream,
    cfg: &RelayConfig,
    state: &Mutex<RelayState>,
    qr: Option<&[u8]>,
    shutdown: &AtomicBool,
) -> Result<()> {
    let mut request = match read_head(&mut stream) {
        Ok(request) => request,
        Err(err) => {
            let _ = write_json_response(&mut stream, 400, r#"{"error":"bad_request"}"#);
            return Err(err);
        }
    };

    let path = request.path.clone();
    let allowed = match path.as_str() {
        "/" | "/phone" | "/status" | "/get_alerts" | "/stream" | "/qr" => "GET",
        "/upload" => "POST",
        _ => return write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    };
    if request.method != allowed {
        return write_json_response(&mut stream, 405, r#"{"error":"method_not_allowed"}"#);
    }

    match path.as_str() {
        "/" => write_response(&mut stream, 200, HTML, OPERATOR_PAGE.as_bytes()),
        "/phone" => write_response(&mut stream, 200, HTML, PHONE_PAGE.as_bytes()),
        "/upload" => handle_upload(&mut stream, &mut request, state),
        "/status" => {
            let status = lock(state)?.status(Instant::now());
            write_json_response(&mut stream, 200, &serde_json::to_string(&status)?)
        }
        "/get_alerts" => {
            let alert = lock(state)?.pop_alert();
            write_json_response(&mut stream, 200, &json!({ "alert": alert }).to_string())
        }
        "/qr" => match qr {
            Some(png) => write_response(&mut stream, 200, "image/png", png),
            None => write_json_response(&mut stream, 500, r#"{"error":"qr_unavailable"}"#),
        },
        "/stream" => {
            if let Err(err) = stream_frames(stream, state, shutdown, cfg.stream_interval) {
                log::debug!("stream viewer disconnected: {:#}", err);
            }
            Ok(())
        }
        _ => write_json_response(&mut stream, 404, r#"{"error":"not_found"}"#),
    }
}

fn handle_upload(
    stream: &mut TcpStream,
    request: &mut HttpRequest,
    state: &Mutex<RelayState>,
) -> Result<()> {
    let length = match request.content_length() {
        Ok(length) => length,
        Err(err) => {
            write_json_response(stream, 400, r#"{"error":"bad_request"}"#)?;
            return Err(err);
        }
    };
    if length > MAX_BODY_BYTES {
        write_json_response(stream, 413, r#"{"error":"payload_too_large"}"#)?;
        return Err(anyhow!("upload of {} bytes exceeds limit", length));
    }
    read_body(stream, request, length)?;

    let frame = request
        .header("content-type")
        .and_then(multipart::boundary)
        .map(|boundary| multipart::field(&request.body, &boundary, "frame"));
    match frame {
        Some(Ok(Some(part))) => {
            let bytes = part.data.to_vec();
            lock(state)?.upload(bytes, Instant::now());
        }
        Some(Ok(None)) | None => log::debug!("upload without a frame field"),
        Some(Err(err)) => {
            write_json_response(stream, 400, r#"{"error":"bad_multipart"}"#)?;
            return Err(err);
        }
    }
    write_response(stream, 200, "text/plain; charset=utf-8", b"OK")
}

fn stream_frames(
    mut stream: TcpStream,
    state: &Mutex<RelayState>,
    shutdown: &AtomicBool,
    interval: Duration,
) -> Result<()> {
    stream.set_write_timeout(Some(Duration::from_secs(5)))?;
    stream.write_all(
        b"HTTP/1.1 200 OK\r\nContent-Type: multipart/x-mixed-replace; boundary=frame\r\nCache-Control: no-store\r\nConnection: close\r\n\r\n",
    )?;
    while !shutdown.load(Ordering::SeqCst) {
        let latest = lock(state)?.latest_frame();
        if let Some(jpeg) = latest {
            stream.write_all(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n")?;
            stream.write_all(&jpeg)?;
            stream.write_all(b"\r\n")?;
            stream.flush()?;
        }
        std::thread::sleep(interval);
    }
    Ok(())
}

fn lock(state: &Mutex<RelayState>) -> Result<MutexGuard<'_, RelayState>> {
    state
        .lock()
        .map_err(|_| anyhow!("relay state lock poisoned"))
}
