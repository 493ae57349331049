//! Alert routing: rate-limit gates, escalation, the relay alert queue, and spoken alerts.

mod audio;
mod escalation;
mod gate;
mod queue;

pub use audio::{Announcer, AudioDispatcher, CommandAnnouncer, LogAnnouncer};
pub use escalation::EscalationCounter;
pub use gate::{AlertGate, GatePolicy};
pub use queue::AlertQueue;

use crate::config::{AlertSettings, Profile};
use crate::event::ViolationKind;

pub const ESCALATION_MESSAGE: &str = "Multiple violations detected! Focus on your exam.";

/// Operator-facing alert text for a violation.
pub fn alert_message(kind: &ViolationKind) -> String {
    let text = match kind {
        ViolationKind::NoFace => "Keep your face visible!".to_string(),
        ViolationKind::MultipleFaces => "Multiple people detected!".to_string(),
        ViolationKind::ExcessiveMovement => "Reduce movement - stay focused!".to_string(),
        ViolationKind::LookingAway => "Face your exam screen!".to_string(),
        ViolationKind::Escalation => return format!("🚨 WARNING: {}", ESCALATION_MESSAGE),
        other => format!("{}!", other.label()),
    };
    format!("⚠️ ALERT: {}", text)
}

/// Spoken warning for violations serious enough to announce; None otherwise.
pub fn spoken_message(kinds: &[ViolationKind]) -> Option<&'static str> {
    if kinds.contains(&ViolationKind::MultipleFaces) {
        Some("Warning: Multiple people detected")
    } else if kinds.contains(&ViolationKind::NoFace) {
        Some("Warning: Face not visible")
    } else if kinds
        .iter()
        .any(|k| matches!(k, ViolationKind::ProhibitedObject(_)))
    {
        Some("Warning: Prohibited items detected")
    } else {
        None
    }
}

/// Gate configuration for a monitor profile.
pub fn gate_for(profile: Profile, settings: &AlertSettings) -> AlertGate {
    match profile {
        Profile::Relay => AlertGate::new(GatePolicy::Always)
            .with_policy("no_face", GatePolicy::EveryNth(settings.no_face_every))
            .with_policy(
                "multiple_faces",
                GatePolicy::EveryNth(settings.multiple_faces_every),
            )
            .with_policy(
                "excessive_movement",
                GatePolicy::EveryNth(settings.movement_every),
            )
            .with_policy(
                "looking_away",
                GatePolicy::EveryNth(settings.looking_away_every),
            )
            .with_policy("extraneous_materials", GatePolicy::Never),
        Profile::Side => AlertGate::new(GatePolicy::Cooldown(settings.object_cooldown)),
        Profile::Webcam => AlertGate::new(GatePolicy::Always),
    }
}
