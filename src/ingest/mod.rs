//! Frame sources for the monitoring loops.
//!
//! - `stub://` synthetic scenes (demo and tests)
//! - a local directory of still images, replayed in file-name order
//! - HTTP MJPEG streams or JPEG snapshot URLs (feature: ingest-http)
//!
//! Sources hand over encoded bytes whenever they have them so that decode
//! failures surface as a frame status instead of ending the loop. Frames are
//! never written back to disk.

mod dir;
#[cfg(feature = "ingest-http")]
pub mod http;
mod stub;

pub use dir::ImageDirSource;
#[cfg(feature = "ingest-http")]
pub use http::HttpSource;
pub use stub::SyntheticSource;

use anyhow::{anyhow, Result};
use std::time::Duration;

use crate::frame::Frame;

/// One captured frame, decoded or still encoded.
pub enum Capture {
    Decoded(Frame),
    Encoded(Vec<u8>),
}

#[derive(Clone, Debug, Default)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// Configuration shared by every source.
#[derive(Clone, Debug)]
pub struct SourceConfig {
    /// `stub://...`, `http(s)://...`, or a local directory path.
    pub uri: String,
    /// Target frame rate. Sources may decimate to this rate.
    pub target_fps: u32,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            uri: "stub://webcam".to_string(),
            target_fps: 10,
        }
    }
}

pub trait FrameSource: Send {
    fn connect(&mut self) -> Result<()>;

    /// Next frame, or None once a finite source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Capture>>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Pick a source implementation for `config.uri`.
pub fn open_source(config: SourceConfig) -> Result<Box<dyn FrameSource>> {
    let uri = config.uri.trim();
    if uri.is_empty() {
        return Err(anyhow!("frame source must not be empty"));
    }
    if uri.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(config)?));
    }
    if uri.starts_with("http://") || uri.starts_with("https://") {
        #[cfg(feature = "ingest-http")]
        {
            return Ok(Box::new(HttpSource::new(config)?));
        }
        #[cfg(not(feature = "ingest-http"))]
        {
            return Err(anyhow!("HTTP sources require the ingest-http feature"));
        }
    }
    if uri.contains("://") {
        return Err(anyhow!("unsupported frame source scheme in '{}'", uri));
    }
    Ok(Box::new(ImageDirSource::new(config)))
}

/// Minimum spacing between frames at `target_fps` (zero means unpaced).
pub fn frame_interval(target_fps: u32) -> Duration {
    if target_fps == 0 {
        Duration::from_millis(0)
    } else {
        Duration::from_millis((1000 / target_fps).max(1) as u64)
    }
}

/// How long a live source may go without a frame and still count as healthy.
pub fn health_grace(target_fps: u32) -> Duration {
    let base_ms = if target_fps == 0 {
        2_000
    } else {
        (1000 / target_fps).saturating_mul(6)
    };
    Duration::from_millis(base_ms.max(2_000) as u64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheme_selects_source() {
        let stub = open_source(SourceConfig {
            uri: "stub://demo".to_string(),
            target_fps: 10,
        })
        .unwrap();
        assert_eq!(stub.stats().source, "stub://demo");

        assert!(open_source(SourceConfig {
            uri: "rtsp://camera/stream".to_string(),
            target_fps: 10,
        })
        .is_err());
        assert!(open_source(SourceConfig {
            uri: "  ".to_string(),
            target_fps: 10,
        })
        .is_err());
    }

    #[test]
    fn pacing_helpers() {
        assert_eq!(frame_interval(10), Duration::from_millis(100));
        assert_eq!(frame_interval(0), Duration::ZERO);
        assert_eq!(health_grace(10), Duration::from_millis(2_000));
        assert_eq!(health_grace(1), Duration::from_millis(6_000));
    }
}
