use anyhow::Result;
use image::{GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::HashMap;

use crate::detect::backend::{CascadeParams, FaceDetector};
use crate::frame::Rect;

/// Chroma bounds of the skin cluster in YCbCr.
const CB_RANGE: (f32, f32) = (77.0, 127.0);
const CR_RANGE: (f32, f32) = (133.0, 173.0);

/// Accepted width/height ratio for a face blob.
const ASPECT_RANGE: (f32, f32) = (0.5, 1.6);

/// Minimum share of the bounding box covered by skin pixels.
const MIN_FILL: f32 = 0.4;

/// Face locator based on skin-chroma segmentation.
///
/// Segments skin pixels in YCbCr space, labels connected regions and keeps
/// roughly face-shaped blobs. Coarse compared to a trained cascade, but it needs
/// no model file and is enough to tell absent, present and crowded scenes apart.
#[derive(Default)]
pub struct SkinToneFaceDetector;

impl SkinToneFaceDetector {
    pub fn new() -> Self {
        Self
    }
}

impl FaceDetector for SkinToneFaceDetector {
    fn name(&self) -> &'static str {
        "skin"
    }

    fn detect_faces(
        &mut self,
        rgb: &RgbImage,
        _gray: &GrayImage,
        params: &CascadeParams,
    ) -> Result<Vec<Rect>> {
        let mask = skin_mask(rgb);
        let labels = connected_components(&mask, Connectivity::Eight, Luma([0u8]));

        let mut blobs: HashMap<u32, Blob> = HashMap::new();
        for (x, y, label) in labels.enumerate_pixels() {
            let label = label[0];
            if label == 0 {
                continue;
            }
            blobs
                .entry(label)
                .and_modify(|b| b.extend(x, y))
                .or_insert_with(|| Blob::new(x, y));
        }

        let mut faces: Vec<Rect> = blobs
            .values()
            .map(|blob| (blob.rect(), blob.pixels))
            .filter(|(rect, pixels)| {
                let aspect = rect.width as f32 / rect.height as f32;
                let fill = *pixels as f32 / rect.area() as f32;
                params.admits(rect)
                    && (ASPECT_RANGE.0..=ASPECT_RANGE.1).contains(&aspect)
                    && fill >= MIN_FILL
            })
            .map(|(rect, _)| rect)
            .collect();
        faces.sort_by_key(|r| (r.x, r.y));
        Ok(faces)
    }
}

fn skin_mask(rgb: &RgbImage) -> GrayImage {
    GrayImage::from_fn(rgb.width(), rgb.height(), |x, y| {
        let [r, g, b] = rgb.get_pixel(x, y).0;
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
        let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
        let skin = (CB_RANGE.0..=CB_RANGE.1).contains(&cb) && (CR_RANGE.0..=CR_RANGE.1).contains(&cr);
        Luma([if skin { 255 } else { 0 }])
    })
}

struct Blob {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    pixels: u64,
}

impl Blob {
    fn new(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
            pixels: 1,
        }
    }

    fn extend(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.pixels += 1;
    }

    fn rect(&self) -> Rect {
        Rect::new(
            self.min_x,
            self.min_y,
            self.max_x - self.min_x + 1,
            self.max_y - self.min_y + 1,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    const SKIN: Rgb<u8> = Rgb([224, 172, 138]);
    const WALL: Rgb<u8> = Rgb([40, 60, 120]);

    fn scene(faces: &[(u32, u32)]) -> RgbImage {
        let mut img = RgbImage::from_pixel(320, 240, WALL);
        for &(fx, fy) in faces {
            for y in fy..fy + 80 {
                for x in fx..fx + 64 {
                    img.put_pixel(x, y, SKIN);
                }
            }
        }
        img
    }

    #[test]
    fn counts_separate_face_blobs() {
        let mut detector = SkinToneFaceDetector::new();
        let gray = GrayImage::new(320, 240);
        let params = CascadeParams::faces();

        let none = detector.detect_faces(&scene(&[]), &gray, &params).unwrap();
        assert!(none.is_empty());

        let one = detector
            .detect_faces(&scene(&[(100, 60)]), &gray, &params)
            .unwrap();
        assert_eq!(one, vec![Rect::new(100, 60, 64, 80)]);

        let two = detector
            .detect_faces(&scene(&[(20, 40), (200, 100)]), &gray, &params)
            .unwrap();
        assert_eq!(two.len(), 2);
    }

    #[test]
    fn small_blobs_are_ignored() {
        let mut img = RgbImage::from_pixel(100, 100, WALL);
        for y in 10..30 {
            for x in 10..30 {
                img.put_pixel(x, y, SKIN);
            }
        }
        let mut detector = SkinToneFaceDetector::new();
        let faces = detector
            .detect_faces(&img, &GrayImage::new(100, 100), &CascadeParams::faces())
            .unwrap();
        assert!(faces.is_empty());
    }
}
