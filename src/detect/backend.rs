use anyhow::Result;
use image::{GrayImage, RgbImage};

use crate::detect::result::ObjectDetection;
use crate::frame::Rect;

/// Detection capabilities a backend can provide.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DetectionCapability {
    Faces,
    Eyes,
    Objects,
}

/// Sliding-window parameters shared by face and eye locators.
///
/// Backends that do not scan at multiple scales honor `min_size` and ignore the rest.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CascadeParams {
    pub scale_factor: f32,
    pub min_neighbors: u32,
    pub min_size: (u32, u32),
}

impl CascadeParams {
    pub fn faces() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 5,
            min_size: (60, 60),
        }
    }

    pub fn eyes() -> Self {
        Self {
            scale_factor: 1.1,
            min_neighbors: 10,
            min_size: (20, 20),
        }
    }

    pub fn admits(&self, rect: &Rect) -> bool {
        rect.width >= self.min_size.0 && rect.height >= self.min_size.1
    }
}

/// Face locator.
///
/// Receives the color frame and its grayscale conversion; returns face boxes in
/// frame coordinates.
pub trait FaceDetector: Send {
    fn name(&self) -> &'static str;

    fn detect_faces(
        &mut self,
        rgb: &RgbImage,
        gray: &GrayImage,
        params: &CascadeParams,
    ) -> Result<Vec<Rect>>;

    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Eye locator. Receives the grayscale face region; returns boxes relative to it.
pub trait EyeDetector: Send {
    fn name(&self) -> &'static str;

    fn detect_eyes(&mut self, face: &GrayImage, params: &CascadeParams) -> Result<Vec<Rect>>;
}

/// Object detector producing labelled boxes in frame coordinates.
pub trait ObjectDetector: Send {
    fn name(&self) -> &'static str;

    fn detect_objects(&mut self, rgb: &RgbImage, min_confidence: f32)
        -> Result<Vec<ObjectDetection>>;

    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
