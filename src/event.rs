//! Violation events and the cumulative activity log.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

/// Named violation produced by a classifier.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ViolationKind {
    NoFace,
    MultipleFaces,
    LookingAway,
    ExcessiveMovement,
    ExtraneousMaterials,
    WritingMotion,
    /// Prohibited item, carrying its display name (e.g. "Mobile Phone").
    ProhibitedObject(String),
    Escalation,
}

impl ViolationKind {
    /// Stable key used in the activity log and in alert gates.
    pub fn key(&self) -> String {
        match self {
            ViolationKind::NoFace => "no_face".to_string(),
            ViolationKind::MultipleFaces => "multiple_faces".to_string(),
            ViolationKind::LookingAway => "looking_away".to_string(),
            ViolationKind::ExcessiveMovement => "excessive_movement".to_string(),
            ViolationKind::ExtraneousMaterials => "extraneous_materials".to_string(),
            ViolationKind::WritingMotion => "writing_motion".to_string(),
            ViolationKind::ProhibitedObject(name) => name.clone(),
            ViolationKind::Escalation => "escalation".to_string(),
        }
    }

    /// Event type name as the exam backend's proctoring log expects it.
    pub fn event_type(&self) -> &'static str {
        match self {
            ViolationKind::NoFace => "NO_FACE_DETECTED",
            ViolationKind::MultipleFaces => "MULTIPLE_FACES",
            ViolationKind::LookingAway => "LOOKING_AWAY",
            ViolationKind::ExcessiveMovement => "EXCESSIVE_MOVEMENT",
            ViolationKind::ExtraneousMaterials => "EXTRANEOUS_MATERIALS",
            ViolationKind::WritingMotion => "WRITING_MOTION",
            ViolationKind::ProhibitedObject(_) => "PROHIBITED_OBJECT",
            ViolationKind::Escalation => "ESCALATION",
        }
    }

    pub fn default_severity(&self) -> Severity {
        match self {
            ViolationKind::NoFace
            | ViolationKind::MultipleFaces
            | ViolationKind::ProhibitedObject(_) => Severity::High,
            ViolationKind::LookingAway
            | ViolationKind::ExcessiveMovement
            | ViolationKind::WritingMotion => Severity::Medium,
            ViolationKind::ExtraneousMaterials => Severity::Low,
            ViolationKind::Escalation => Severity::Critical,
        }
    }

    /// Human readable label used in status lines.
    pub fn label(&self) -> String {
        match self {
            ViolationKind::NoFace => "No face detected".to_string(),
            ViolationKind::MultipleFaces => "Multiple faces detected".to_string(),
            ViolationKind::LookingAway => "Looking away from screen".to_string(),
            ViolationKind::ExcessiveMovement => "Excessive movement".to_string(),
            ViolationKind::ExtraneousMaterials => "Possible materials on table".to_string(),
            ViolationKind::WritingMotion => "Writing/typing motion detected".to_string(),
            ViolationKind::ProhibitedObject(name) => format!("{name} detected"),
            ViolationKind::Escalation => "Multiple violations detected".to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
        }
    }
}

/// Immutable record of a confirmed violation.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct ViolationEvent {
    pub kind: ViolationKind,
    pub severity: Severity,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    pub detail: String,
}

impl ViolationEvent {
    pub fn new(kind: ViolationKind, detail: impl Into<String>) -> Self {
        let severity = kind.default_severity();
        Self {
            kind,
            severity,
            timestamp_ms: now_ms(),
            detail: detail.into(),
        }
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// Cumulative per-violation counters for the lifetime of the process.
#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct ActivityLog {
    counts: BTreeMap<String, u64>,
}

impl ActivityLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Log pre-seeded with zero counters so status consumers always see the keys.
    pub fn with_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            counts: keys.into_iter().map(|k| (k.into(), 0)).collect(),
        }
    }

    /// Increments the counter for `key` and returns the new count.
    pub fn record(&mut self, key: &str) -> u64 {
        let count = self.counts.entry(key.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    pub fn count(&self, key: &str) -> u64 {
        self.counts.get(key).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn is_clean(&self) -> bool {
        self.total() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.counts.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Non-zero entries sorted by count descending, ties by key.
    pub fn summary(&self) -> Vec<(String, u64)> {
        let mut entries: Vec<(String, u64)> = self
            .counts
            .iter()
            .filter(|(_, v)| **v > 0)
            .map(|(k, v)| (k.clone(), *v))
            .collect();
        entries.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn activity_log_counts_monotonically() {
        let mut log = ActivityLog::with_keys(["no_face", "looking_away"]);
        assert_eq!(log.count("no_face"), 0);
        assert!(log.is_clean());
        assert_eq!(log.record("no_face"), 1);
        assert_eq!(log.record("no_face"), 2);
        assert_eq!(log.record("Mobile Phone"), 1);
        assert_eq!(log.total(), 3);
        assert_eq!(
            log.summary(),
            vec![("no_face".to_string(), 2), ("Mobile Phone".to_string(), 1)]
        );
    }

    #[test]
    fn activity_log_serializes_as_flat_map() {
        let mut log = ActivityLog::with_keys(["no_face"]);
        log.record("multiple_faces");
        let json = serde_json::to_value(&log).unwrap();
        assert_eq!(json["no_face"], 0);
        assert_eq!(json["multiple_faces"], 1);
    }

    #[test]
    fn prohibited_object_key_is_display_name() {
        let kind = ViolationKind::ProhibitedObject("Book/Notes".to_string());
        assert_eq!(kind.key(), "Book/Notes");
        assert_eq!(kind.default_severity(), Severity::High);
        assert_eq!(kind.event_type(), "PROHIBITED_OBJECT");
    }
}
