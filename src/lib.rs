//! Exam proctoring monitors.
//!
//! Watches a candidate during an exam from up to three vantage points and
//! raises alerts when the session looks suspicious:
//!
//! - **webcam** (`proctor_watch`): face presence, extra people, gaze.
//! - **side camera** (`proctor_side`): prohibited objects on the desk, with an
//!   optional whitelist image for an allowed item, plus writing motion.
//! - **phone relay** (`proctor_relay`): a phone browser uploads side-view
//!   frames to a small HTTP service on the laptop, which analyses them and
//!   pushes alerts back to the phone.
//!
//! # Module Structure
//!
//! - `frame`: decoded frames and geometry (`Frame`, `Rect`, `BoundingBox`)
//! - `detect`: detector traits and backends (`BackendRegistry`)
//! - `classify`: per-frame classifiers producing `Finding`s
//! - `alert`: rate-limit gates, escalation, alert queue, spoken alerts
//! - `session`: `MonitorSession`, the per-profile pipeline tying it together
//! - `ingest`: frame sources (synthetic, image directory, HTTP camera)
//! - `monitor`: the synchronous capture loop used by the camera monitors
//! - `relay`: the phone relay HTTP server
//! - `transport`: proctoring-log reporter for the exam backend
//! - `report`: end-of-session summary
//!
//! Frames stay in memory: pixel buffers are zeroed on drop and nothing in
//! this crate writes them to disk.

pub mod alert;
pub mod classify;
pub mod config;
pub mod detect;
pub mod event;
pub mod frame;
pub mod ingest;
pub mod monitor;
pub mod relay;
pub mod report;
pub mod session;
pub mod transport;

pub use alert::{AlertGate, AlertQueue, AudioDispatcher, EscalationCounter, GatePolicy};
pub use classify::{Finding, Whitelist, WhitelistVerdict};
pub use config::{Profile, ProctorConfig};
pub use detect::BackendRegistry;
pub use event::{ActivityLog, Severity, ViolationEvent, ViolationKind};
pub use frame::{BoundingBox, Frame, Rect};
pub use ingest::{open_source, Capture, FrameSource, SourceConfig};
pub use monitor::{LoopExit, MonitorLoop};
pub use relay::{RelayConfig, RelayHandle, RelayServer, RelayState};
pub use report::SessionSummary;
pub use session::{Detectors, FrameAssessment, MonitorSession};
#[cfg(feature = "report-http")]
pub use transport::{ProctorLogReporter, ReporterConfig};
