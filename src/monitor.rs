//! Synchronous capture loop shared by the camera monitors.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::frame::Frame;
use crate::ingest::{frame_interval, Capture, FrameSource};
use crate::session::{FrameAssessment, MonitorSession};

/// Why a monitoring loop ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopExit {
    Stopped,
    Exhausted,
    SourceFailed,
}

impl Capture {
    /// Decoded frame, decoding encoded bytes when needed.
    pub fn into_frame(self) -> Result<Frame> {
        match self {
            Capture::Decoded(frame) => Ok(frame),
            Capture::Encoded(bytes) => Frame::decode(&bytes).context("decode captured frame"),
        }
    }
}

pub struct MonitorLoop<'a> {
    source: &'a mut dyn FrameSource,
    session: &'a mut MonitorSession,
    pace: Duration,
}

impl<'a> MonitorLoop<'a> {
    pub fn new(
        source: &'a mut dyn FrameSource,
        session: &'a mut MonitorSession,
        target_fps: u32,
    ) -> Self {
        Self {
            source,
            session,
            pace: frame_interval(target_fps),
        }
    }

    pub fn session_mut(&mut self) -> &mut MonitorSession {
        self.session
    }

    /// Read one capture directly from the source.
    pub fn next_capture(&mut self) -> Result<Option<Capture>> {
        self.source.next_frame()
    }

    /// Run one frame through the session.
    pub fn process(&mut self, capture: Capture, now: Instant) -> FrameAssessment {
        match capture {
            Capture::Decoded(frame) => self.session.process_frame(&frame, now),
            Capture::Encoded(bytes) => self.session.process_encoded(&bytes, now),
        }
    }

    /// Pull frames until `stop` is raised, the source runs dry, or it fails.
    /// `on_frame` sees every assessment, e.g. to forward events.
    pub fn run<F>(&mut self, stop: &AtomicBool, mut on_frame: F) -> LoopExit
    where
        F: FnMut(&FrameAssessment),
    {
        loop {
            if stop.load(Ordering::SeqCst) {
                return LoopExit::Stopped;
            }
            let started = Instant::now();
            let capture = match self.next_capture() {
                Ok(Some(capture)) => capture,
                Ok(None) => {
                    log::info!("{}: no more frames", self.source.stats().source);
                    return LoopExit::Exhausted;
                }
                Err(e) => {
                    log::error!("camera unavailable: {:#}", e);
                    return LoopExit::SourceFailed;
                }
            };
            let assessment = self.process(capture, started);
            on_frame(&assessment);

            let elapsed = started.elapsed();
            if elapsed < self.pace {
                std::thread::sleep(self.pace - elapsed);
            }
        }
    }
}
