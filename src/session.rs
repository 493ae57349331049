//! Monitoring session: all mutable state of one monitor, driven one frame at a time.

use anyhow::Result;
use std::time::{Duration, Instant};

use crate::alert::{
    alert_message, gate_for, spoken_message, AlertGate, AlertQueue, AudioDispatcher,
    EscalationCounter, GatePolicy,
};
use crate::classify::{
    FaceAttentionClassifier, Finding, FlaggedObject, MotionEdgeClassifier, ObjectClassifier,
    Whitelist, WritingMotionAnalyzer,
};
use crate::config::{GazeMode, ProctorConfig, Profile};
use crate::detect::{BackendRegistry, EyeDetector, FaceDetector, ObjectDetector};
use crate::event::{ActivityLog, ViolationEvent, ViolationKind};
use crate::frame::{Frame, Rect};

pub const STATUS_DECODE_ERROR: &str = "Error processing frame";
pub const STATUS_FACE_VISIBLE: &str = "✓ Face visible";
pub const STATUS_NORMAL: &str = "✓ Normal - Monitoring active";

/// Object backend name that turns the object check off.
const DISABLED_BACKEND: &str = "none";

/// Writing-motion analysis pauses this long after an object scan.
const WRITING_SKIP_AFTER_SCAN: Duration = Duration::from_secs(1);

/// Keys the relay reports from the first status poll on.
const RELAY_ACTIVITY_KEYS: [&str; 4] = [
    "no_face",
    "multiple_faces",
    "excessive_movement",
    "looking_away",
];

/// Detector instances a session runs with. Unused slots may be None.
#[derive(Default)]
pub struct Detectors {
    pub faces: Option<Box<dyn FaceDetector>>,
    pub eyes: Option<Box<dyn EyeDetector>>,
    pub objects: Option<Box<dyn ObjectDetector>>,
}

impl Detectors {
    /// Build the detectors the profile's checks need.
    pub fn from_registry(cfg: &ProctorConfig, registry: &BackendRegistry) -> Result<Self> {
        let mut detectors = Detectors::default();
        if cfg.checks.faces {
            let mut faces = registry.face_detector(cfg)?;
            faces.warm_up()?;
            log::info!("face detector: {}", faces.name());
            detectors.faces = Some(faces);
            if cfg.checks.gaze && cfg.face.gaze_mode == GazeMode::Eyes {
                let eyes = registry.eye_detector(cfg)?;
                log::info!("eye detector: {}", eyes.name());
                detectors.eyes = Some(eyes);
            }
        }
        if cfg.checks.objects && cfg.objects.backend == DISABLED_BACKEND {
            log::info!("object detection disabled (objects.backend = none)");
        } else if cfg.checks.objects {
            let mut objects = registry.object_detector(cfg)?;
            objects.warm_up()?;
            log::info!(
                "object detector: {} (every {:.1}s, {} prohibited labels)",
                objects.name(),
                cfg.objects.interval.as_secs_f32(),
                cfg.objects.prohibited.len()
            );
            detectors.objects = Some(objects);
        }
        Ok(detectors)
    }
}

/// Per-frame result.
#[derive(Debug, Default)]
pub struct FrameAssessment {
    /// Status lines, warnings first in check order.
    pub status: Vec<String>,
    /// Events confirmed on this frame.
    pub events: Vec<ViolationEvent>,
    /// Alert messages admitted by the gates on this frame.
    pub alerts: Vec<String>,
    pub flagged: bool,
    pub faces: Vec<Rect>,
    pub eyes: Vec<Rect>,
    pub objects: Vec<FlaggedObject>,
    /// Frame could not be decoded; no checks ran.
    pub error: bool,
}

impl FrameAssessment {
    fn decode_error() -> Self {
        Self {
            status: vec![STATUS_DECODE_ERROR.to_string()],
            error: true,
            ..Self::default()
        }
    }

    /// Status lines joined the way the relay reports them.
    pub fn joined(&self) -> String {
        self.status.join(" | ")
    }

    /// One line summarising the frame, as shown to the operator.
    pub fn status_line(&self) -> String {
        if self.error {
            return STATUS_DECODE_ERROR.to_string();
        }
        if self.flagged {
            let warnings: Vec<&str> = self
                .status
                .iter()
                .map(String::as_str)
                .filter(|line| !line.starts_with('✓'))
                .collect();
            return format!("🚨 SUSPICIOUS: {}", warnings.join(" | "));
        }
        if self.status.is_empty() {
            STATUS_NORMAL.to_string()
        } else {
            self.status.join(" | ")
        }
    }
}

pub struct MonitorSession {
    profile: Profile,
    face: Option<FaceAttentionClassifier>,
    motion: Option<MotionEdgeClassifier>,
    objects: Option<ObjectClassifier>,
    writing: Option<WritingMotionAnalyzer>,
    activity: ActivityLog,
    gate: AlertGate,
    /// Relay only. Continuous monitors re-report confirmed findings every frame.
    escalation: Option<EscalationCounter>,
    queue: Option<AlertQueue>,
    audio: Option<AudioDispatcher>,
    audio_cooldown: Duration,
    last_spoken: Option<Instant>,
    last_status: Option<String>,
    frames: u64,
}

impl MonitorSession {
    pub fn new(cfg: &ProctorConfig, detectors: Detectors) -> Self {
        let Detectors {
            faces,
            eyes,
            objects,
        } = detectors;

        let face = match (cfg.checks.faces, faces) {
            (true, Some(faces)) => {
                let classifier = FaceAttentionClassifier::new(faces, eyes, cfg.face.clone());
                Some(if cfg.checks.gaze {
                    classifier
                } else {
                    classifier.without_gaze()
                })
            }
            _ => None,
        };
        let motion = (cfg.checks.movement || cfg.checks.edges).then(|| {
            MotionEdgeClassifier::new(cfg.motion.clone(), cfg.checks.movement, cfg.checks.edges)
        });
        let objects = match (cfg.checks.objects, objects) {
            (true, Some(detector)) => Some(ObjectClassifier::new(detector, cfg.objects.clone())),
            _ => None,
        };
        let writing = cfg.checks.writing.then(|| {
            WritingMotionAnalyzer::new(cfg.motion.writing_flow, cfg.motion.writing_confirm)
        });

        let activity = match cfg.profile {
            Profile::Relay => ActivityLog::with_keys(RELAY_ACTIVITY_KEYS),
            _ => ActivityLog::new(),
        };
        let queue = (cfg.profile == Profile::Relay)
            .then(|| AlertQueue::new(cfg.relay.alert_capacity));

        Self {
            profile: cfg.profile,
            face,
            motion,
            objects,
            writing,
            activity,
            gate: gate_for(cfg.profile, &cfg.alerts),
            escalation: (cfg.profile == Profile::Relay)
                .then(|| EscalationCounter::new(cfg.alerts.escalation_count)),
            queue,
            audio: None,
            audio_cooldown: cfg.audio.cooldown,
            last_spoken: None,
            last_status: None,
            frames: 0,
        }
    }

    pub fn from_registry(cfg: &ProctorConfig, registry: &BackendRegistry) -> Result<Self> {
        Ok(Self::new(cfg, Detectors::from_registry(cfg, registry)?))
    }

    pub fn with_audio(mut self, audio: AudioDispatcher) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn profile(&self) -> Profile {
        self.profile
    }

    pub fn activity(&self) -> &ActivityLog {
        &self.activity
    }

    pub fn frames_processed(&self) -> u64 {
        self.frames
    }

    pub fn last_status(&self) -> Option<&str> {
        self.last_status.as_deref()
    }

    /// Install (or clear) the whitelist reference used by the object check.
    pub fn set_whitelist(&mut self, whitelist: Option<Whitelist>) {
        match self.objects.as_mut() {
            Some(objects) => objects.set_whitelist(whitelist),
            None if whitelist.is_some() => {
                log::warn!("whitelist ignored: object check is disabled")
            }
            None => {}
        }
    }

    pub fn has_whitelist(&self) -> bool {
        self.objects
            .as_ref()
            .is_some_and(|objects| objects.whitelist().is_some())
    }

    /// Next pending operator alert (relay profile), oldest first.
    pub fn pop_alert(&mut self) -> Option<String> {
        self.queue.as_mut().and_then(AlertQueue::pop)
    }

    pub fn pending_alerts(&self) -> usize {
        self.queue.as_ref().map_or(0, AlertQueue::len)
    }

    /// Decode and assess an encoded frame.
    pub fn process_encoded(&mut self, bytes: &[u8], now: Instant) -> FrameAssessment {
        match Frame::decode(bytes) {
            Ok(frame) => self.process_frame(&frame, now),
            Err(e) => {
                log::warn!("frame decode failed: {:#}", e);
                let assessment = FrameAssessment::decode_error();
                self.note_status(&assessment);
                assessment
            }
        }
    }

    pub fn process_frame(&mut self, frame: &Frame, now: Instant) -> FrameAssessment {
        self.frames += 1;
        let gray = frame.gray();
        let mut assessment = FrameAssessment::default();
        let mut findings: Vec<Finding> = Vec::new();
        let mut positive: Vec<String> = Vec::new();

        if let Some(face) = self.face.as_mut() {
            let report = face.assess(frame.rgb(), &gray, now);
            if report.attentive {
                positive.push(STATUS_FACE_VISIBLE.to_string());
            }
            assessment.faces = report.faces;
            assessment.eyes = report.eyes;
            findings.extend(report.findings);
        }

        if let Some(motion) = self.motion.as_mut() {
            findings.extend(motion.assess(&gray).findings);
        }

        if let Some(objects) = self.objects.as_mut() {
            if let Some(scan) = objects.assess(frame, now) {
                findings.extend(scan.findings());
                assessment.objects = scan.flagged;
            }
        }

        if let Some(writing) = self.writing.as_mut() {
            let recent_scan = self
                .objects
                .as_ref()
                .and_then(ObjectClassifier::last_scan)
                .is_some_and(|at| now.saturating_duration_since(at) < WRITING_SKIP_AFTER_SCAN);
            if recent_scan {
                writing.observe_only(&gray);
            } else if let Some(finding) = writing.assess(&gray) {
                findings.push(finding);
            }
        }

        assessment.status = findings.iter().map(|f| f.kind.label()).collect();
        assessment.status.extend(positive);
        assessment.flagged = !findings.is_empty();

        for finding in findings.iter().filter(|f| f.fired) {
            self.record(finding.kind.clone(), &finding.detail, now, &mut assessment);
        }

        let escalated = self.escalation.as_mut().and_then(|counter| {
            if counter.observe(assessment.flagged) {
                Some(counter.threshold())
            } else {
                None
            }
        });
        if let Some(threshold) = escalated {
            let event = ViolationEvent::new(
                ViolationKind::Escalation,
                format!("{} consecutive flagged frames", threshold),
            );
            let message = alert_message(&ViolationKind::Escalation);
            self.dispatch_alert(&message);
            assessment.alerts.push(message);
            assessment.events.push(event);
        }

        let kinds: Vec<ViolationKind> = findings.into_iter().map(|f| f.kind).collect();
        if self.note_status(&assessment) {
            self.announce(&kinds, now);
        }
        assessment
    }

    fn record(
        &mut self,
        kind: ViolationKind,
        detail: &str,
        now: Instant,
        assessment: &mut FrameAssessment,
    ) {
        let key = kind.key();
        if self.gate.policy(&key) != GatePolicy::Never {
            self.activity.record(&key);
        }
        if self.gate.admit(&key, now) {
            let message = alert_message(&kind);
            self.dispatch_alert(&message);
            assessment.alerts.push(message);
        }
        assessment.events.push(ViolationEvent::new(kind, detail));
    }

    fn dispatch_alert(&mut self, message: &str) {
        log::warn!("🚨 {}", message);
        if let Some(queue) = self.queue.as_mut() {
            queue.push(message);
        }
    }

    /// Logs the status line when it changed. Returns true on change.
    fn note_status(&mut self, assessment: &FrameAssessment) -> bool {
        let line = assessment.status_line();
        if self.last_status.as_deref() == Some(line.as_str()) {
            return false;
        }
        log::info!("{}", line);
        self.last_status = Some(line);
        true
    }

    fn announce(&mut self, kinds: &[ViolationKind], now: Instant) {
        let Some(audio) = self.audio.as_ref() else {
            return;
        };
        let Some(message) = spoken_message(kinds) else {
            return;
        };
        let cooled = self
            .last_spoken
            .map_or(true, |at| now.saturating_duration_since(at) >= self.audio_cooldown);
        if cooled && audio.speak(message) {
            self.last_spoken = Some(now);
        }
    }

    /// Stop background workers. The activity log stays readable.
    pub fn shutdown(&mut self) {
        if let Some(mut audio) = self.audio.take() {
            audio.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::ScriptedFaceDetector;
    use image::RgbImage;

    fn relay_session(faces: ScriptedFaceDetector) -> MonitorSession {
        let cfg = ProctorConfig::defaults(Profile::Relay);
        let detectors = Detectors {
            faces: Some(Box::new(faces)),
            ..Detectors::default()
        };
        MonitorSession::new(&cfg, detectors)
    }

    #[test]
    fn undecodable_upload_reports_error_status() {
        let mut session = relay_session(ScriptedFaceDetector::repeating(Vec::new()));
        let assessment = session.process_encoded(b"not a jpeg", Instant::now());
        assert!(assessment.error);
        assert_eq!(assessment.status, vec![STATUS_DECODE_ERROR.to_string()]);
        assert_eq!(session.last_status(), Some(STATUS_DECODE_ERROR));
        assert_eq!(session.activity().total(), 0);
    }

    #[test]
    fn centered_face_is_visible_and_clean() {
        let face = Rect::new(270, 190, 100, 100);
        let mut session = relay_session(ScriptedFaceDetector::repeating(vec![face]));
        let frame = Frame::from_rgb(RgbImage::new(640, 480));
        let assessment = session.process_frame(&frame, Instant::now());
        assert!(!assessment.flagged);
        assert_eq!(assessment.status, vec![STATUS_FACE_VISIBLE.to_string()]);
        assert_eq!(assessment.status_line(), STATUS_FACE_VISIBLE);
    }

    #[test]
    fn relay_no_face_counts_every_frame_and_alerts_every_third() {
        let mut session = relay_session(ScriptedFaceDetector::repeating(Vec::new()));
        let frame = Frame::from_rgb(RgbImage::new(640, 480));
        let t0 = Instant::now();
        let mut alerts = 0;
        for i in 0..3u64 {
            let assessment = session.process_frame(&frame, t0 + Duration::from_millis(i * 100));
            assert!(assessment.flagged);
            assert_eq!(assessment.status_line(), "🚨 SUSPICIOUS: No face detected");
            alerts += assessment
                .alerts
                .iter()
                .filter(|a| a.contains("Keep your face visible"))
                .count();
        }
        assert_eq!(session.activity().count("no_face"), 3);
        assert_eq!(alerts, 1);
        assert_eq!(
            session.pop_alert().as_deref(),
            Some("⚠️ ALERT: Keep your face visible!")
        );
        assert_eq!(session.pop_alert(), None);
    }

    #[test]
    fn none_object_backend_disables_object_scans() {
        let registry = BackendRegistry::with_builtin();
        let mut cfg = ProctorConfig::defaults(Profile::Side);
        cfg.objects.backend = "none".to_string();
        let detectors = Detectors::from_registry(&cfg, &registry).unwrap();
        assert!(detectors.objects.is_none());

        let mut session = MonitorSession::new(&cfg, detectors);
        assert!(!session.has_whitelist());
        let assessment =
            session.process_frame(&Frame::from_rgb(RgbImage::new(64, 48)), Instant::now());
        assert!(assessment.objects.is_empty());
        assert!(assessment.events.is_empty());
    }

    #[test]
    fn webcam_long_absence_does_not_escalate() {
        let cfg = ProctorConfig::defaults(Profile::Webcam);
        let mut session = MonitorSession::new(
            &cfg,
            Detectors {
                faces: Some(Box::new(ScriptedFaceDetector::repeating(Vec::new()))),
                ..Detectors::default()
            },
        );
        let frame = Frame::from_rgb(RgbImage::new(640, 480));
        let t0 = Instant::now();
        let mut no_face = 0;
        let mut escalations = 0;
        for i in 0..600u64 {
            let assessment = session.process_frame(&frame, t0 + Duration::from_millis(i * 100));
            for event in &assessment.events {
                match event.kind {
                    ViolationKind::NoFace => no_face += 1,
                    ViolationKind::Escalation => escalations += 1,
                    _ => {}
                }
            }
        }
        assert_eq!(no_face, 1);
        assert_eq!(escalations, 0);
    }

    #[test]
    fn relay_clutter_flags_frame_without_entering_activity_log() {
        let face = Rect::new(270, 190, 100, 100);
        let mut session = relay_session(ScriptedFaceDetector::repeating(vec![face]));
        let board = RgbImage::from_fn(640, 480, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                image::Rgb([0, 0, 0])
            } else {
                image::Rgb([255, 255, 255])
            }
        });
        let assessment = session.process_frame(&Frame::from_rgb(board), Instant::now());
        assert!(assessment.flagged);
        assert!(assessment
            .status
            .iter()
            .any(|line| line == "Possible materials on table"));
        assert!(assessment.alerts.is_empty());
        assert_eq!(session.activity().count("extraneous_materials"), 0);
        assert_eq!(session.activity().total(), 0);
    }
}
