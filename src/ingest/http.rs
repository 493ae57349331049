//! HTTP camera source: MJPEG multipart streams or single-JPEG snapshot URLs.
//!
//! Phone camera apps and IP webcams commonly expose one of the two. The
//! response content type decides which one is in use.

use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::time::{Duration, Instant};
use url::Url;

use super::{frame_interval, health_grace, Capture, FrameSource, SourceConfig, SourceStats};

const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

pub struct HttpSource {
    config: SourceConfig,
    agent: ureq::Agent,
    stream: Option<HttpStream>,
    last_frame_at: Option<Instant>,
    connected_at: Option<Instant>,
    frame_count: u64,
    last_error: Option<String>,
}

enum HttpStream {
    Mjpeg(MjpegStream),
    Snapshot,
}

impl HttpSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let url = Url::parse(&config.uri).context("parse camera url")?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(anyhow!(
                "unsupported camera scheme '{}'; expected http(s)",
                url.scheme()
            ));
        }
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .build();
        Ok(Self {
            config,
            agent,
            stream: None,
            last_frame_at: None,
            connected_at: None,
            frame_count: 0,
            last_error: None,
        })
    }

    fn fetch_snapshot(&self) -> Result<Vec<u8>> {
        let response = self
            .agent
            .get(&self.config.uri)
            .call()
            .with_context(|| format!("fetch snapshot from {}", self.config.uri))?;
        let mut bytes = Vec::new();
        response
            .into_reader()
            .take(MAX_JPEG_BYTES as u64 + 1)
            .read_to_end(&mut bytes)
            .context("read snapshot")?;
        if bytes.is_empty() {
            return Err(anyhow!("empty snapshot"));
        }
        if bytes.len() > MAX_JPEG_BYTES {
            return Err(anyhow!("snapshot exceeds {} bytes", MAX_JPEG_BYTES));
        }
        Ok(bytes)
    }

    fn read_next(&mut self) -> Result<Vec<u8>> {
        match self.stream.as_mut() {
            Some(HttpStream::Mjpeg(stream)) => stream.read_next_jpeg(),
            Some(HttpStream::Snapshot) => self.fetch_snapshot(),
            None => Err(anyhow!("http source not connected; call connect() first")),
        }
    }
}

impl FrameSource for HttpSource {
    fn connect(&mut self) -> Result<()> {
        let response = self
            .agent
            .get(&self.config.uri)
            .call()
            .with_context(|| format!("connect to camera at {}", self.config.uri))?;
        let content_type = response.header("Content-Type").unwrap_or("").to_lowercase();
        if content_type.contains("multipart") {
            log::info!("{}: MJPEG stream", self.config.uri);
            self.stream = Some(HttpStream::Mjpeg(MjpegStream::new(response.into_reader())));
        } else {
            log::info!("{}: snapshot polling", self.config.uri);
            self.stream = Some(HttpStream::Snapshot);
        }
        self.connected_at = Some(Instant::now());
        self.last_error = None;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Capture>> {
        let min_interval = frame_interval(self.config.target_fps);
        loop {
            let bytes = match self.read_next() {
                Ok(bytes) => bytes,
                Err(e) => {
                    self.last_error = Some(e.to_string());
                    return Err(e);
                }
            };
            let now = Instant::now();
            if let Some(last) = self.last_frame_at {
                if now.duration_since(last) < min_interval {
                    continue;
                }
            }
            self.frame_count += 1;
            self.last_frame_at = Some(now);
            return Ok(Some(Capture::Encoded(bytes)));
        }
    }

    fn is_healthy(&self) -> bool {
        if self.last_error.is_some() {
            return false;
        }
        let Some(connected_at) = self.connected_at else {
            return false;
        };
        let Some(last_frame_at) = self.last_frame_at else {
            return connected_at.elapsed() <= Duration::from_secs(5);
        };
        last_frame_at.elapsed() <= health_grace(self.config.target_fps)
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.uri.clone(),
        }
    }
}

struct MjpegStream {
    reader: Box<dyn Read + Send>,
    buffer: Vec<u8>,
}

impl MjpegStream {
    fn new(reader: Box<dyn Read + Send>) -> Self {
        Self {
            reader,
            buffer: Vec::with_capacity(64 * 1024),
        }
    }

    fn read_next_jpeg(&mut self) -> Result<Vec<u8>> {
        let mut chunk = vec![0u8; 8192];
        loop {
            if let Some((start, end)) = find_jpeg_bounds(&self.buffer) {
                let frame = self.buffer[start..end].to_vec();
                self.buffer.drain(..end);
                return Ok(frame);
            }

            let read = self.reader.read(&mut chunk).context("read mjpeg chunk")?;
            if read == 0 {
                return Err(anyhow!("mjpeg stream ended"));
            }
            self.buffer.extend_from_slice(&chunk[..read]);

            if self.buffer.len() > MAX_JPEG_BYTES * 2 {
                let keep = 2.min(self.buffer.len());
                let drain_len = self.buffer.len() - keep;
                self.buffer.drain(..drain_len);
            }
        }
    }
}

/// Byte range of the first complete JPEG (SOI..EOI) in `buffer`.
fn find_jpeg_bounds(buffer: &[u8]) -> Option<(usize, usize)> {
    let start = buffer.windows(2).position(|w| w == [0xFF, 0xD8])?;
    let end = buffer[start + 2..]
        .windows(2)
        .position(|w| w == [0xFF, 0xD9])?;
    Some((start, start + 2 + end + 2))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn jpeg_bounds_skip_multipart_headers() {
        let mut body = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n".to_vec();
        body.extend_from_slice(&[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);
        body.extend_from_slice(b"\r\n--frame\r\n");
        let (start, end) = find_jpeg_bounds(&body).unwrap();
        assert_eq!(&body[start..end], &[0xFF, 0xD8, 1, 2, 3, 0xFF, 0xD9]);
        assert!(find_jpeg_bounds(&[0xFF, 0xD8, 0x00]).is_none());
    }

    #[test]
    fn mjpeg_stream_yields_each_part() {
        let mut body = Vec::new();
        for payload in [[0xAAu8], [0xBB]] {
            body.extend_from_slice(b"--frame\r\n\r\n");
            body.extend_from_slice(&[0xFF, 0xD8, payload[0], 0xFF, 0xD9]);
        }
        let mut stream = MjpegStream::new(Box::new(Cursor::new(body)));
        assert_eq!(stream.read_next_jpeg().unwrap()[2], 0xAA);
        assert_eq!(stream.read_next_jpeg().unwrap()[2], 0xBB);
        assert!(stream.read_next_jpeg().is_err());
    }

    #[test]
    fn rejects_non_http_urls() {
        let config = SourceConfig {
            uri: "ftp://camera/frame.jpg".to_string(),
            target_fps: 5,
        };
        assert!(HttpSource::new(config).is_err());
    }
}
