use anyhow::Result;
use image::GrayImage;

use crate::detect::backend::{CascadeParams, EyeDetector};
use crate::frame::Rect;

/// Fraction of the face height where the eye band starts and ends.
const BAND_TOP: f32 = 0.20;
const BAND_BOTTOM: f32 = 0.55;

/// Minimum darkness (gray levels) an eye window must have below the band mean.
const MIN_CONTRAST: f64 = 12.0;

/// Classical eye locator.
///
/// Searches the upper band of the face for the darkest window in each half of
/// the face. A half without a window sufficiently darker than the band yields
/// no eye, so a turned head or closed eyes typically report fewer than two.
#[derive(Default)]
pub struct ProjectionEyeDetector;

impl ProjectionEyeDetector {
    pub fn new() -> Self {
        Self
    }
}

impl EyeDetector for ProjectionEyeDetector {
    fn name(&self) -> &'static str {
        "projection"
    }

    fn detect_eyes(&mut self, face: &GrayImage, params: &CascadeParams) -> Result<Vec<Rect>> {
        let (w, h) = face.dimensions();
        let (min_w, min_h) = params.min_size;
        if w < min_w * 2 || h < min_h * 2 {
            return Ok(Vec::new());
        }

        let band_top = (h as f32 * BAND_TOP) as u32;
        let band_bottom = ((h as f32 * BAND_BOTTOM) as u32).min(h);
        let eye_w = (w / 5).max(min_w);
        let eye_h = (h / 8).max(min_h);
        if band_bottom <= band_top + eye_h {
            return Ok(Vec::new());
        }

        let table = SummedArea::new(face);
        let band_mean = table.mean(0, band_top, w, band_bottom);
        let step = ((eye_w / 4).max(1) as f32 * params.scale_factor.max(1.0)) as u32;

        let mut eyes = Vec::new();
        for (left, right) in [(0, w / 2), (w / 2, w)] {
            if right < left + eye_w {
                continue;
            }
            let mut best: Option<(f64, Rect)> = None;
            let mut y = band_top;
            while y + eye_h <= band_bottom {
                let mut x = left;
                while x + eye_w <= right {
                    let mean = table.mean(x, y, x + eye_w, y + eye_h);
                    if best.map_or(true, |(m, _)| mean < m) {
                        best = Some((mean, Rect::new(x, y, eye_w, eye_h)));
                    }
                    x += step;
                }
                y += step;
            }
            if let Some((mean, rect)) = best {
                if band_mean - mean >= MIN_CONTRAST {
                    eyes.push(rect);
                }
            }
        }
        Ok(eyes)
    }
}

/// Summed-area table over a grayscale image.
struct SummedArea {
    width: usize,
    sums: Vec<u64>,
}

impl SummedArea {
    fn new(image: &GrayImage) -> Self {
        let (w, h) = (image.width() as usize, image.height() as usize);
        let stride = w + 1;
        let mut sums = vec![0u64; stride * (h + 1)];
        for y in 0..h {
            let mut row = 0u64;
            for x in 0..w {
                row += image.get_pixel(x as u32, y as u32)[0] as u64;
                sums[(y + 1) * stride + x + 1] = sums[y * stride + x + 1] + row;
            }
        }
        Self { width: w, sums }
    }

    /// Mean over the half-open window [x1, x2) x [y1, y2).
    fn mean(&self, x1: u32, y1: u32, x2: u32, y2: u32) -> f64 {
        let stride = self.width + 1;
        let (x1, y1, x2, y2) = (x1 as usize, y1 as usize, x2 as usize, y2 as usize);
        let area = ((x2 - x1) * (y2 - y1)) as f64;
        if area == 0.0 {
            return 0.0;
        }
        let total = self.sums[y2 * stride + x2] + self.sums[y1 * stride + x1]
            - self.sums[y1 * stride + x2]
            - self.sums[y2 * stride + x1];
        total as f64 / area
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn face_with_eyes(left_eye: bool, right_eye: bool) -> GrayImage {
        let mut face = GrayImage::from_pixel(120, 120, Luma([180]));
        let mut paint = |x0: u32| {
            for y in 35..50 {
                for x in x0..x0 + 24 {
                    face.put_pixel(x, y, Luma([30]));
                }
            }
        };
        if left_eye {
            paint(20);
        }
        if right_eye {
            paint(76);
        }
        face
    }

    #[test]
    fn finds_two_dark_eyes() {
        let mut detector = ProjectionEyeDetector::new();
        let eyes = detector
            .detect_eyes(&face_with_eyes(true, true), &CascadeParams::eyes())
            .unwrap();
        assert_eq!(eyes.len(), 2);
        assert!(eyes[0].center_x() < 60);
        assert!(eyes[1].center_x() >= 60);
    }

    #[test]
    fn uniform_face_has_no_eyes() {
        let mut detector = ProjectionEyeDetector::new();
        let eyes = detector
            .detect_eyes(&face_with_eyes(false, false), &CascadeParams::eyes())
            .unwrap();
        assert!(eyes.is_empty());
    }

    #[test]
    fn tiny_face_is_skipped() {
        let mut detector = ProjectionEyeDetector::new();
        let face = GrayImage::new(30, 30);
        assert!(detector
            .detect_eyes(&face, &CascadeParams::eyes())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn summed_area_mean_matches_direct_average() {
        let mut img = GrayImage::new(4, 3);
        for (i, p) in img.pixels_mut().enumerate() {
            *p = Luma([i as u8 * 10]);
        }
        let table = SummedArea::new(&img);
        // pixels (1,1),(2,1) = 50, 60
        assert_eq!(table.mean(1, 1, 3, 2), 55.0);
    }
}
