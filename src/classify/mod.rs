//! Per-frame classifiers.
//!
//! Each classifier turns frames into `Finding`s: violations that hold on the
//! current frame, flagged `fired` when they should produce a new event.

mod debounce;
mod face;
mod flow;
mod motion;
mod objects;
mod whitelist;

pub use debounce::{Debounce, DebounceState};
pub use face::{FaceAttentionClassifier, FaceReport};
pub use flow::{desk_flow, WritingMotionAnalyzer};
pub use motion::{count_changed, edge_density, MotionEdgeClassifier, MotionMeasure, MotionReport};
pub use objects::{FlaggedObject, ObjectClassifier, ObjectScan};
pub use whitelist::{correlation, Whitelist, WhitelistVerdict};

use crate::event::ViolationKind;

#[derive(Clone, Debug, PartialEq)]
pub struct Finding {
    pub kind: ViolationKind,
    pub detail: String,
    /// True when this observation should be recorded as a new event.
    pub fired: bool,
}

impl Finding {
    pub fn new(kind: ViolationKind, detail: impl Into<String>, fired: bool) -> Self {
        Self {
            kind,
            detail: detail.into(),
            fired,
        }
    }
}
