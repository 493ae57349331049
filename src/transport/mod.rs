//! Outbound transports.
//!
//! The proctoring-log reporter forwards violation events to the exam backend
//! (feature: report-http). Frames never leave the process through this layer.

#[cfg(feature = "report-http")]
mod proctor_log;

#[cfg(feature = "report-http")]
pub use proctor_log::{ProctorLogReporter, ReporterConfig};
