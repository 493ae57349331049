use anyhow::Result;
use image::{imageops, GrayImage, RgbImage};
use std::time::Instant;

use super::debounce::Debounce;
use super::Finding;
use crate::config::{FaceSettings, GazeMode};
use crate::detect::{CascadeParams, EyeDetector, FaceDetector};
use crate::event::ViolationKind;
use crate::frame::Rect;

/// Outcome of the face/attention checks for one frame.
#[derive(Debug, Default)]
pub struct FaceReport {
    pub faces: Vec<Rect>,
    /// Eye boxes in frame coordinates (eye gaze mode only).
    pub eyes: Vec<Rect>,
    /// Confirmed violations that still hold on this frame.
    pub findings: Vec<Finding>,
    /// Exactly one face, facing the screen.
    pub attentive: bool,
    /// Face detection failed; no timers moved.
    pub skipped: bool,
}

/// Face count and gaze classifier with per-violation debounce timers.
pub struct FaceAttentionClassifier {
    faces: Box<dyn FaceDetector>,
    eyes: Option<Box<dyn EyeDetector>>,
    settings: FaceSettings,
    face_params: CascadeParams,
    eye_params: CascadeParams,
    absent: Debounce,
    multiple: Debounce,
    away: Debounce,
    gaze_enabled: bool,
    last_count: Option<usize>,
}

impl FaceAttentionClassifier {
    /// `eyes` is only consulted in [`GazeMode::Eyes`]; without it eye gaze is not checked.
    pub fn new(
        faces: Box<dyn FaceDetector>,
        eyes: Option<Box<dyn EyeDetector>>,
        settings: FaceSettings,
    ) -> Self {
        let absent = Debounce::new(settings.absence, settings.rearm);
        let multiple = Debounce::immediate(settings.rearm);
        let away = Debounce::new(settings.looking_away, settings.rearm);
        Self {
            faces,
            eyes,
            settings,
            face_params: CascadeParams::faces(),
            eye_params: CascadeParams::eyes(),
            absent,
            multiple,
            away,
            gaze_enabled: true,
            last_count: None,
        }
    }

    /// Only count faces; never evaluate gaze.
    pub fn without_gaze(mut self) -> Self {
        self.gaze_enabled = false;
        self
    }

    pub fn detector_name(&self) -> &'static str {
        self.faces.name()
    }

    pub fn warm_up(&mut self) -> Result<()> {
        self.faces.warm_up()
    }

    pub fn assess(&mut self, rgb: &RgbImage, gray: &GrayImage, now: Instant) -> FaceReport {
        let faces = match self.faces.detect_faces(rgb, gray, &self.face_params) {
            Ok(faces) => faces,
            Err(e) => {
                log::warn!("face detector '{}' failed: {}", self.faces.name(), e);
                return FaceReport {
                    skipped: true,
                    ..FaceReport::default()
                };
            }
        };

        let count = faces.len();
        if self.last_count.is_some_and(|last| last != count) {
            log::debug!("face count changed to {}", count);
        }
        self.last_count = Some(count);

        let mut report = FaceReport::default();
        let mut gaze_away = false;
        let mut gaze_known = true;
        if count == 1 {
            match self.gaze(gray, faces[0], &mut report.eyes) {
                Some(away) => gaze_away = away,
                None => gaze_known = false,
            }
        }

        let absent_fired = self.absent.observe(count == 0, now);
        if self.absent.is_confirmed() {
            report.findings.push(Finding::new(
                ViolationKind::NoFace,
                "no face in frame",
                absent_fired,
            ));
        }

        let multiple_fired = self.multiple.observe(count > 1, now);
        if self.multiple.is_confirmed() {
            report.findings.push(Finding::new(
                ViolationKind::MultipleFaces,
                format!("{} faces in frame", count),
                multiple_fired,
            ));
        }

        if gaze_known {
            let away_fired = self.away.observe(count == 1 && gaze_away, now);
            if self.away.is_confirmed() {
                report.findings.push(Finding::new(
                    ViolationKind::LookingAway,
                    self.gaze_detail(),
                    away_fired,
                ));
            }
        }

        report.attentive = count == 1 && !gaze_away && gaze_known;
        report.faces = faces;
        report
    }

    /// Some(true) when the single face looks away; None when gaze is unknown.
    fn gaze(&mut self, gray: &GrayImage, face: Rect, eyes_out: &mut Vec<Rect>) -> Option<bool> {
        if !self.gaze_enabled {
            return Some(false);
        }
        match self.settings.gaze_mode {
            GazeMode::FacePosition => {
                let offset = (face.center_x() as f32 - gray.width() as f32 / 2.0).abs();
                Some(offset > gray.width() as f32 * self.settings.off_center_fraction)
            }
            GazeMode::Eyes => {
                let Some(detector) = self.eyes.as_mut() else {
                    return Some(false);
                };
                let face = face.clamp_to(gray.width(), gray.height())?;
                let roi = imageops::crop_imm(gray, face.x, face.y, face.width, face.height)
                    .to_image();
                let eyes = match detector.detect_eyes(&roi, &self.eye_params) {
                    Ok(eyes) => eyes,
                    Err(e) => {
                        log::warn!("eye detector '{}' failed: {}", detector.name(), e);
                        return None;
                    }
                };
                if eyes.len() < 2 {
                    return Some(true);
                }
                let side = face.width as f32 * self.settings.eye_side_fraction;
                let mut away = false;
                for eye in &eyes {
                    let center = eye.center_x() as f32;
                    if center < side || center > face.width as f32 - side {
                        away = true;
                    }
                    eyes_out.push(Rect::new(
                        face.x + eye.x,
                        face.y + eye.y,
                        eye.width,
                        eye.height,
                    ));
                }
                Some(away)
            }
        }
    }

    fn gaze_detail(&self) -> &'static str {
        match self.settings.gaze_mode {
            GazeMode::Eyes => "eyes not centered on screen",
            GazeMode::FacePosition => "face off center",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProctorConfig, Profile};
    use crate::detect::{ScriptedEyeDetector, ScriptedFaceDetector};
    use std::time::Duration;

    fn blank() -> (RgbImage, GrayImage) {
        (RgbImage::new(640, 480), GrayImage::new(640, 480))
    }

    fn centered_eyes() -> Vec<Rect> {
        vec![Rect::new(50, 60, 30, 20), Rect::new(120, 60, 30, 20)]
    }

    fn webcam(faces: ScriptedFaceDetector, eyes: ScriptedEyeDetector) -> FaceAttentionClassifier {
        let settings = ProctorConfig::defaults(Profile::Webcam).face;
        FaceAttentionClassifier::new(Box::new(faces), Some(Box::new(eyes)), settings)
    }

    #[test]
    fn absence_fires_once_after_threshold() {
        let (rgb, gray) = blank();
        let mut classifier = webcam(
            ScriptedFaceDetector::repeating(Vec::new()),
            ScriptedEyeDetector::repeating(Vec::new()),
        );
        let t0 = Instant::now();
        let mut fired = 0;
        for i in 0..100u64 {
            let report = classifier.assess(&rgb, &gray, t0 + Duration::from_millis(i * 100));
            fired += report.findings.iter().filter(|f| f.fired).count();
            if i < 30 {
                assert!(report.findings.is_empty());
            } else {
                assert_eq!(report.findings[0].kind, ViolationKind::NoFace);
            }
        }
        assert_eq!(fired, 1);
    }

    #[test]
    fn centered_eyes_are_attentive() {
        let (rgb, gray) = blank();
        let mut classifier = webcam(
            ScriptedFaceDetector::repeating(vec![Rect::new(200, 100, 200, 200)]),
            ScriptedEyeDetector::repeating(centered_eyes()),
        );
        let report = classifier.assess(&rgb, &gray, Instant::now());
        assert!(report.attentive);
        assert!(report.findings.is_empty());
        assert_eq!(report.eyes[0], Rect::new(250, 160, 30, 20));
    }

    #[test]
    fn eye_near_face_edge_counts_as_looking_away() {
        let (rgb, gray) = blank();
        let mut classifier = webcam(
            ScriptedFaceDetector::repeating(vec![Rect::new(200, 100, 200, 200)]),
            ScriptedEyeDetector::repeating(vec![
                Rect::new(0, 60, 30, 20),
                Rect::new(120, 60, 30, 20),
            ]),
        );
        let t0 = Instant::now();
        let first = classifier.assess(&rgb, &gray, t0);
        assert!(!first.attentive);
        assert!(first.findings.is_empty());
        let later = classifier.assess(&rgb, &gray, t0 + Duration::from_secs(5));
        assert_eq!(later.findings.len(), 1);
        assert_eq!(later.findings[0].kind, ViolationKind::LookingAway);
        assert!(later.findings[0].fired);
    }

    #[test]
    fn relay_face_position_fires_every_frame() {
        let (rgb, gray) = blank();
        let settings = ProctorConfig::defaults(Profile::Relay).face;
        let faces = ScriptedFaceDetector::repeating(vec![Rect::new(0, 100, 100, 100)]);
        let mut classifier = FaceAttentionClassifier::new(Box::new(faces), None, settings);
        let t0 = Instant::now();
        for i in 0..3u64 {
            let report = classifier.assess(&rgb, &gray, t0 + Duration::from_millis(i));
            assert_eq!(report.findings.len(), 1);
            assert!(report.findings[0].fired);
        }
    }

    #[test]
    fn multiple_faces_fire_immediately() {
        let (rgb, gray) = blank();
        let mut classifier = webcam(
            ScriptedFaceDetector::repeating(vec![
                Rect::new(10, 10, 100, 100),
                Rect::new(300, 10, 100, 100),
            ]),
            ScriptedEyeDetector::repeating(centered_eyes()),
        );
        let report = classifier.assess(&rgb, &gray, Instant::now());
        assert_eq!(report.findings[0].kind, ViolationKind::MultipleFaces);
        assert!(report.findings[0].fired);
    }

    #[test]
    fn detector_failure_leaves_timers_alone() {
        let (rgb, gray) = blank();
        let faces = ScriptedFaceDetector::new(Vec::new()).then_fail("camera hiccup");
        let mut classifier = webcam(faces, ScriptedEyeDetector::repeating(Vec::new()));
        let report = classifier.assess(&rgb, &gray, Instant::now());
        assert!(report.skipped);
        assert!(report.findings.is_empty());
    }
}
