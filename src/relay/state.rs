use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::event::ActivityLog;
use crate::session::{MonitorSession, STATUS_DECODE_ERROR};

pub const STATUS_FEED_STOPPED: &str = "⚠️ Phone feed stopped";

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct RelayStatus {
    pub connected: bool,
    pub suspicious: String,
    pub activity_log: ActivityLog,
}

/// Session context shared between the relay's request handlers.
pub struct RelayState {
    session: MonitorSession,
    latest: Option<Arc<Vec<u8>>>,
    last_upload: Option<Instant>,
    suspicious: String,
    staleness: Duration,
}

impl RelayState {
    pub fn new(session: MonitorSession, staleness: Duration) -> Self {
        Self {
            session,
            latest: None,
            last_upload: None,
            suspicious: String::new(),
            staleness,
        }
    }

    /// Replace the held frame and analyse it once.
    pub fn upload(&mut self, bytes: Vec<u8>, now: Instant) {
        let assessment = self.session.process_encoded(&bytes, now);
        self.suspicious = if assessment.error {
            STATUS_DECODE_ERROR.to_string()
        } else {
            assessment.joined()
        };
        self.latest = Some(Arc::new(bytes));
        self.last_upload = Some(now);
    }

    pub fn status(&self, now: Instant) -> RelayStatus {
        let (connected, suspicious) = match self.last_upload {
            None => (false, String::new()),
            Some(at) if now.saturating_duration_since(at) > self.staleness => {
                (false, STATUS_FEED_STOPPED.to_string())
            }
            Some(_) => (true, self.suspicious.clone()),
        };
        RelayStatus {
            connected,
            suspicious,
            activity_log: self.session.activity().clone(),
        }
    }

    pub fn pop_alert(&mut self) -> Option<String> {
        self.session.pop_alert()
    }

    pub fn latest_frame(&self) -> Option<Arc<Vec<u8>>> {
        self.latest.clone()
    }

    pub fn frames_received(&self) -> u64 {
        self.session.frames_processed()
    }

    pub fn session(&self) -> &MonitorSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut MonitorSession {
        &mut self.session
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Profile, ProctorConfig};
    use crate::detect::ScriptedFaceDetector;
    use crate::frame::Rect;
    use crate::session::Detectors;
    use image::{ImageFormat, RgbImage};
    use std::io::Cursor;

    fn state(faces: ScriptedFaceDetector) -> RelayState {
        let cfg = ProctorConfig::defaults(Profile::Relay);
        let session = MonitorSession::new(
            &cfg,
            Detectors {
                faces: Some(Box::new(faces)),
                ..Detectors::default()
            },
        );
        RelayState::new(session, Duration::from_secs(5))
    }

    fn jpeg() -> Vec<u8> {
        let img = RgbImage::from_pixel(64, 48, image::Rgb([120, 120, 120]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Jpeg).unwrap();
        out.into_inner()
    }

    #[test]
    fn disconnected_before_first_frame() {
        let state = state(ScriptedFaceDetector::repeating(vec![]));
        let status = state.status(Instant::now());
        assert!(!status.connected);
        assert_eq!(status.suspicious, "");
        assert_eq!(status.activity_log.count("no_face"), 0);
        assert!(state.latest_frame().is_none());
    }

    #[test]
    fn fresh_upload_connects_then_goes_stale() {
        let mut state = state(ScriptedFaceDetector::repeating(vec![Rect::new(
            22, 14, 20, 20,
        )]));
        let t0 = Instant::now();
        state.upload(jpeg(), t0);

        let status = state.status(t0 + Duration::from_secs(1));
        assert!(status.connected);
        assert_eq!(status.suspicious, "✓ Face visible");
        assert!(state.latest_frame().is_some());

        let status = state.status(t0 + Duration::from_secs(6));
        assert!(!status.connected);
        assert_eq!(status.suspicious, STATUS_FEED_STOPPED);
    }

    #[test]
    fn undecodable_upload_reports_processing_error() {
        let mut state = state(ScriptedFaceDetector::repeating(vec![]));
        let t0 = Instant::now();
        state.upload(b"not a jpeg".to_vec(), t0);
        let status = state.status(t0);
        assert!(status.connected);
        assert_eq!(status.suspicious, STATUS_DECODE_ERROR);
        assert_eq!(state.latest_frame().unwrap().as_slice(), b"not a jpeg");
    }
}
