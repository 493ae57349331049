use anyhow::{anyhow, Context, Result};
use image::{imageops, RgbImage};
use std::path::Path;

use crate::config::WhitelistSettings;
use crate::frame::{Frame, Rect};

/// Reference appearance of an item the candidate is allowed to keep in view.
///
/// A detection is suppressed when its region is large enough, has a size
/// comparable to the reference, and its grayscale histogram correlates with
/// the reference histogram.
#[derive(Clone, Debug)]
pub struct Whitelist {
    width: u32,
    height: u32,
    histogram: [f64; 256],
    settings: WhitelistSettings,
}

/// Why a region was or was not matched against the whitelist.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WhitelistVerdict {
    TooSmall,
    SizeMismatch { ratio: f32 },
    Dissimilar { correlation: f64 },
    Match { correlation: f64 },
}

impl WhitelistVerdict {
    pub fn is_match(&self) -> bool {
        matches!(self, WhitelistVerdict::Match { .. })
    }
}

impl Whitelist {
    pub fn from_image(reference: &RgbImage, settings: WhitelistSettings) -> Result<Self> {
        if reference.width() == 0 || reference.height() == 0 {
            return Err(anyhow!("whitelist reference image is empty"));
        }
        Ok(Self {
            width: reference.width(),
            height: reference.height(),
            histogram: gray_histogram(reference),
            settings,
        })
    }

    pub fn from_path(path: &Path, settings: WhitelistSettings) -> Result<Self> {
        let image = image::open(path)
            .with_context(|| format!("open whitelist image {}", path.display()))?
            .into_rgb8();
        Self::from_image(&image, settings)
    }

    /// Capture the reference from the central guide box of a frame.
    pub fn from_guide_box(frame: &Frame, settings: WhitelistSettings) -> Result<Self> {
        let region = frame
            .crop(frame.guide_box())
            .ok_or_else(|| anyhow!("frame too small for a whitelist capture"))?;
        Self::from_image(&region, settings)
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Compare the region `rect` of `frame` against the reference.
    pub fn check(&self, frame: &Frame, rect: Rect) -> WhitelistVerdict {
        if rect.width < self.settings.min_region || rect.height < self.settings.min_region {
            return WhitelistVerdict::TooSmall;
        }
        let Some(region) = frame.crop(rect) else {
            return WhitelistVerdict::TooSmall;
        };
        self.check_region(&region)
    }

    pub fn check_region(&self, region: &RgbImage) -> WhitelistVerdict {
        let (w, h) = region.dimensions();
        if w < self.settings.min_region || h < self.settings.min_region {
            return WhitelistVerdict::TooSmall;
        }
        let ratio = (h as f32 / self.height as f32).min(w as f32 / self.width as f32);
        if ratio < self.settings.size_ratio_min || ratio > self.settings.size_ratio_max {
            return WhitelistVerdict::SizeMismatch { ratio };
        }
        let correlation = correlation(&self.histogram, &gray_histogram(region));
        if correlation > self.settings.correlation as f64 {
            WhitelistVerdict::Match { correlation }
        } else {
            WhitelistVerdict::Dissimilar { correlation }
        }
    }
}

fn gray_histogram(image: &RgbImage) -> [f64; 256] {
    let gray = imageops::grayscale(image);
    let mut bins = [0f64; 256];
    for px in gray.as_raw() {
        bins[*px as usize] += 1.0;
    }
    bins
}

/// Pearson correlation of two histograms; 1.0 when either is perfectly flat.
pub fn correlation(a: &[f64; 256], b: &[f64; 256]) -> f64 {
    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let da = x - mean_a;
        let db = y - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }
    let denom = var_a * var_b;
    if denom <= f64::EPSILON {
        return 1.0;
    }
    cov / denom.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ProctorConfig, Profile};
    use image::Rgb;

    fn settings() -> WhitelistSettings {
        ProctorConfig::defaults(Profile::Side).whitelist
    }

    fn gradient(w: u32, h: u32) -> RgbImage {
        RgbImage::from_fn(w, h, |x, _| {
            let v = (x * 255 / w.max(1)) as u8;
            Rgb([v, v, v])
        })
    }

    #[test]
    fn identical_region_matches() {
        let reference = gradient(100, 80);
        let whitelist = Whitelist::from_image(&reference, settings()).unwrap();
        let verdict = whitelist.check_region(&reference);
        match verdict {
            WhitelistVerdict::Match { correlation } => {
                assert!((correlation - 1.0).abs() < 1e-9, "{}", correlation)
            }
            other => panic!("expected a match, got {:?}", other),
        }
        let h = gray_histogram(&reference);
        assert!((correlation(&h, &h) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn tiny_regions_are_never_matched() {
        let whitelist = Whitelist::from_image(&gradient(100, 80), settings()).unwrap();
        assert_eq!(
            whitelist.check_region(&gradient(19, 80)),
            WhitelistVerdict::TooSmall
        );
    }

    #[test]
    fn size_outside_band_is_rejected() {
        let whitelist = Whitelist::from_image(&gradient(100, 100), settings()).unwrap();
        match whitelist.check_region(&gradient(25, 400)) {
            WhitelistVerdict::SizeMismatch { ratio } => assert!(ratio < 0.3),
            other => panic!("unexpected verdict {:?}", other),
        }
    }

    #[test]
    fn different_appearance_is_dissimilar() {
        let whitelist = Whitelist::from_image(&gradient(100, 100), settings()).unwrap();
        let dark = RgbImage::from_pixel(100, 100, Rgb([10, 10, 10]));
        assert!(matches!(
            whitelist.check_region(&dark),
            WhitelistVerdict::Dissimilar { .. }
        ));
    }

    #[test]
    fn guide_box_reference_matches_its_own_frame() {
        let frame = Frame::from_rgb(gradient(200, 160));
        let whitelist = Whitelist::from_guide_box(&frame, settings()).unwrap();
        assert_eq!(whitelist.dimensions(), (100, 80));
        assert!(whitelist.check(&frame, frame.guide_box()).is_match());
    }
}
