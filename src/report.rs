//! End-of-session violation summary printed by the monitors on exit.

use std::fmt;

use crate::event::ActivityLog;

pub const CLEAN_SESSION: &str = "✓ No violations detected - Clean exam session";

pub struct SessionSummary {
    title: String,
    entries: Vec<(String, u64)>,
    frames: u64,
}

impl SessionSummary {
    pub fn new(title: &str, activity: &ActivityLog, frames: u64) -> Self {
        Self {
            title: title.to_string(),
            entries: activity.summary(),
            frames,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(String, u64)] {
        &self.entries
    }
}

impl fmt::Display for SessionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rule = "=".repeat(60);
        writeln!(f, "{}", rule)?;
        writeln!(f, "{}", self.title)?;
        writeln!(f, "{}", rule)?;
        writeln!(f, "Frames analysed: {}", self.frames)?;
        if self.entries.is_empty() {
            writeln!(f, "{}", CLEAN_SESSION)?;
        } else {
            writeln!(f, "Violations:")?;
            for (key, count) in &self.entries {
                writeln!(f, "  • {}: {}", display_key(key), count)?;
            }
        }
        write!(f, "{}", rule)
    }
}

/// "no_face" -> "No Face"; display names pass through unchanged.
fn display_key(key: &str) -> String {
    if !key.contains('_') {
        return key.to_string();
    }
    key.split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_session_message() {
        let log = ActivityLog::with_keys(["no_face"]);
        let summary = SessionSummary::new("EXAM MONITORING REPORT", &log, 12);
        assert!(summary.is_clean());
        let text = summary.to_string();
        assert!(text.contains(CLEAN_SESSION));
        assert!(text.contains("Frames analysed: 12"));
    }

    #[test]
    fn violations_sorted_by_count() {
        let mut log = ActivityLog::new();
        log.record("Mobile Phone");
        log.record("looking_away");
        log.record("looking_away");
        let text = SessionSummary::new("SIDE CAMERA REPORT", &log, 3).to_string();
        let away = text.find("Looking Away: 2").unwrap();
        let phone = text.find("Mobile Phone: 1").unwrap();
        assert!(away < phone);
    }
}
