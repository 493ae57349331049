use anyhow::Result;
use std::time::Instant;

use super::whitelist::Whitelist;
use super::Finding;
use crate::config::ObjectSettings;
use crate::detect::{ObjectDetection, ObjectDetector};
use crate::event::ViolationKind;
use crate::frame::{Frame, Rect};

/// Prohibited item found in a scan.
#[derive(Clone, Debug, PartialEq)]
pub struct FlaggedObject {
    pub label: String,
    pub display: String,
    pub confidence: f32,
    pub rect: Option<Rect>,
}

/// Result of one detector run.
#[derive(Debug, Default)]
pub struct ObjectScan {
    pub flagged: Vec<FlaggedObject>,
    /// Prohibited detections dropped because they matched the whitelist.
    pub whitelisted: usize,
    /// Detector failed; the scan counts as empty.
    pub failed: bool,
}

impl ObjectScan {
    pub fn findings(&self) -> Vec<Finding> {
        self.flagged
            .iter()
            .map(|obj| {
                Finding::new(
                    ViolationKind::ProhibitedObject(obj.display.clone()),
                    format!("{} ({:.2})", obj.label, obj.confidence),
                    true,
                )
            })
            .collect()
    }
}

/// Interval-gated prohibited-object check.
pub struct ObjectClassifier {
    detector: Box<dyn ObjectDetector>,
    settings: ObjectSettings,
    whitelist: Option<Whitelist>,
    last_scan: Option<Instant>,
}

impl ObjectClassifier {
    pub fn new(detector: Box<dyn ObjectDetector>, settings: ObjectSettings) -> Self {
        Self {
            detector,
            settings,
            whitelist: None,
            last_scan: None,
        }
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.name()
    }

    pub fn warm_up(&mut self) -> Result<()> {
        self.detector.warm_up()
    }

    pub fn set_whitelist(&mut self, whitelist: Option<Whitelist>) {
        self.whitelist = whitelist;
    }

    pub fn whitelist(&self) -> Option<&Whitelist> {
        self.whitelist.as_ref()
    }

    pub fn last_scan(&self) -> Option<Instant> {
        self.last_scan
    }

    /// True when the scan interval has elapsed (or no scan ran yet).
    pub fn due(&self, now: Instant) -> bool {
        match self.last_scan {
            Some(last) => now.saturating_duration_since(last) >= self.settings.interval,
            None => true,
        }
    }

    /// Runs the detector when due. None when the interval has not elapsed.
    pub fn assess(&mut self, frame: &Frame, now: Instant) -> Option<ObjectScan> {
        if !self.due(now) {
            return None;
        }
        self.last_scan = Some(now);

        let detections = match self
            .detector
            .detect_objects(frame.rgb(), self.settings.confidence)
        {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!("object detector '{}' failed: {}", self.detector.name(), e);
                return Some(ObjectScan {
                    failed: true,
                    ..ObjectScan::default()
                });
            }
        };

        let mut scan = ObjectScan::default();
        for detection in detections {
            self.consider(frame, detection, &mut scan);
        }
        Some(scan)
    }

    fn consider(&self, frame: &Frame, detection: ObjectDetection, scan: &mut ObjectScan) {
        if detection.confidence < self.settings.confidence {
            return;
        }
        let Some(display) = self.settings.prohibited.get(&detection.label) else {
            return;
        };
        let rect = detection.bbox.to_rect(frame.width(), frame.height());
        if let (Some(whitelist), Some(rect)) = (&self.whitelist, rect) {
            let verdict = whitelist.check(frame, rect);
            if verdict.is_match() {
                log::debug!("{} matched whitelist ({:?})", detection.label, verdict);
                scan.whitelisted += 1;
                return;
            }
        }
        scan.flagged.push(FlaggedObject {
            label: detection.label,
            display: display.clone(),
            confidence: detection.confidence,
            rect,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProctorConfig, Profile};
    use crate::detect::ScriptedObjectDetector;
    use crate::frame::BoundingBox;
    use image::{Rgb, RgbImage};
    use std::time::Duration;

    fn side_settings() -> ObjectSettings {
        ProctorConfig::defaults(Profile::Side).objects
    }

    fn phone() -> ObjectDetection {
        ObjectDetection::new("cell phone", 0.8, BoundingBox::new(10.0, 10.0, 110.0, 90.0))
    }

    #[test]
    fn scans_respect_interval() {
        let detector = ScriptedObjectDetector::repeating(vec![phone()]);
        let mut classifier = ObjectClassifier::new(Box::new(detector), side_settings());
        let frame = Frame::from_rgb(RgbImage::new(320, 240));
        let t0 = Instant::now();

        let scan = classifier.assess(&frame, t0).unwrap();
        assert_eq!(scan.flagged[0].display, "Mobile Phone");
        assert!(classifier.assess(&frame, t0 + Duration::from_secs(2)).is_none());
        assert!(classifier.assess(&frame, t0 + Duration::from_secs(3)).is_some());
    }

    #[test]
    fn unlisted_and_weak_detections_are_ignored() {
        let detector = ScriptedObjectDetector::repeating(vec![
            ObjectDetection::new("person", 0.9, BoundingBox::new(0.0, 0.0, 50.0, 50.0)),
            ObjectDetection::new("book", 0.1, BoundingBox::new(0.0, 0.0, 50.0, 50.0)),
        ]);
        let mut classifier = ObjectClassifier::new(Box::new(detector), side_settings());
        let frame = Frame::from_rgb(RgbImage::new(320, 240));
        let scan = classifier.assess(&frame, Instant::now()).unwrap();
        assert!(scan.flagged.is_empty());
    }

    #[test]
    fn detector_failure_is_an_empty_scan() {
        let detector = ScriptedObjectDetector::new(Vec::new()).then_fail("model crashed");
        let mut classifier = ObjectClassifier::new(Box::new(detector), side_settings());
        let frame = Frame::from_rgb(RgbImage::new(320, 240));
        let scan = classifier.assess(&frame, Instant::now()).unwrap();
        assert!(scan.failed);
        assert!(scan.flagged.is_empty());
    }

    #[test]
    fn whitelisted_item_is_suppressed() {
        let frame = Frame::from_rgb(RgbImage::from_fn(320, 240, |x, y| {
            let v = ((x + y) % 256) as u8;
            Rgb([v, v, v])
        }));
        let region = frame.crop(Rect::new(10, 10, 100, 80)).unwrap();
        let whitelist =
            Whitelist::from_image(&region, ProctorConfig::defaults(Profile::Side).whitelist)
                .unwrap();

        let detector = ScriptedObjectDetector::repeating(vec![phone()]);
        let mut classifier = ObjectClassifier::new(Box::new(detector), side_settings());
        classifier.set_whitelist(Some(whitelist));
        let scan = classifier.assess(&frame, Instant::now()).unwrap();
        assert!(scan.flagged.is_empty());
        assert_eq!(scan.whitelisted, 1);
        assert!(scan.findings().is_empty());
    }
}
