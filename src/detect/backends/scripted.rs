use anyhow::{anyhow, Result};
use image::{GrayImage, RgbImage};
use std::collections::VecDeque;

use crate::detect::backend::{CascadeParams, EyeDetector, FaceDetector, ObjectDetector};
use crate::detect::result::ObjectDetection;
use crate::frame::Rect;

/// Queue of canned answers. Once drained, the fallback repeats forever.
struct Script<T: Clone> {
    steps: VecDeque<std::result::Result<T, String>>,
    fallback: T,
}

impl<T: Clone> Script<T> {
    fn new(steps: Vec<T>, fallback: T) -> Self {
        Self {
            steps: steps.into_iter().map(Ok).collect(),
            fallback,
        }
    }

    fn next(&mut self) -> Result<T> {
        match self.steps.pop_front() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(anyhow!(message)),
            None => Ok(self.fallback.clone()),
        }
    }
}

/// Face detector replaying a fixed sequence of results. Used by tests and demos.
pub struct ScriptedFaceDetector {
    script: Script<Vec<Rect>>,
}

impl ScriptedFaceDetector {
    pub fn new(steps: Vec<Vec<Rect>>) -> Self {
        Self {
            script: Script::new(steps, Vec::new()),
        }
    }

    /// Always reports the same faces.
    pub fn repeating(faces: Vec<Rect>) -> Self {
        Self {
            script: Script::new(Vec::new(), faces),
        }
    }

    /// Queue a detector failure as the next answer.
    pub fn then_fail(mut self, message: &str) -> Self {
        self.script.steps.push_back(Err(message.to_string()));
        self
    }
}

impl FaceDetector for ScriptedFaceDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect_faces(
        &mut self,
        _rgb: &RgbImage,
        _gray: &GrayImage,
        _params: &CascadeParams,
    ) -> Result<Vec<Rect>> {
        self.script.next()
    }
}

pub struct ScriptedEyeDetector {
    script: Script<Vec<Rect>>,
}

impl ScriptedEyeDetector {
    pub fn new(steps: Vec<Vec<Rect>>) -> Self {
        Self {
            script: Script::new(steps, Vec::new()),
        }
    }

    pub fn repeating(eyes: Vec<Rect>) -> Self {
        Self {
            script: Script::new(Vec::new(), eyes),
        }
    }
}

impl EyeDetector for ScriptedEyeDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect_eyes(&mut self, _face: &GrayImage, _params: &CascadeParams) -> Result<Vec<Rect>> {
        self.script.next()
    }
}

pub struct ScriptedObjectDetector {
    script: Script<Vec<ObjectDetection>>,
    calls: usize,
}

impl ScriptedObjectDetector {
    pub fn new(steps: Vec<Vec<ObjectDetection>>) -> Self {
        Self {
            script: Script::new(steps, Vec::new()),
            calls: 0,
        }
    }

    /// Detector that never reports anything.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn repeating(detections: Vec<ObjectDetection>) -> Self {
        Self {
            script: Script::new(Vec::new(), detections),
            calls: 0,
        }
    }

    pub fn then_fail(mut self, message: &str) -> Self {
        self.script.steps.push_back(Err(message.to_string()));
        self
    }

    /// Number of times `detect_objects` ran.
    pub fn calls(&self) -> usize {
        self.calls
    }
}

impl ObjectDetector for ScriptedObjectDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect_objects(
        &mut self,
        _rgb: &RgbImage,
        min_confidence: f32,
    ) -> Result<Vec<ObjectDetection>> {
        self.calls += 1;
        let detections = self.script.next()?;
        Ok(detections
            .into_iter()
            .filter(|d| d.confidence >= min_confidence)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::BoundingBox;

    #[test]
    fn scripted_faces_replay_then_fall_back() {
        let rgb = RgbImage::new(4, 4);
        let gray = GrayImage::new(4, 4);
        let params = CascadeParams::faces();
        let mut detector =
            ScriptedFaceDetector::new(vec![vec![Rect::new(0, 0, 2, 2)]]).then_fail("boom");

        assert_eq!(detector.detect_faces(&rgb, &gray, &params).unwrap().len(), 1);
        assert!(detector.detect_faces(&rgb, &gray, &params).is_err());
        assert!(detector.detect_faces(&rgb, &gray, &params).unwrap().is_empty());
    }

    #[test]
    fn scripted_objects_respect_confidence() {
        let rgb = RgbImage::new(4, 4);
        let mut detector = ScriptedObjectDetector::repeating(vec![
            ObjectDetection::new("book", 0.9, BoundingBox::new(0.0, 0.0, 2.0, 2.0)),
            ObjectDetection::new("cell phone", 0.1, BoundingBox::new(0.0, 0.0, 2.0, 2.0)),
        ]);
        let found = detector.detect_objects(&rgb, 0.25).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].label, "book");
        assert_eq!(detector.calls(), 1);
    }
}
