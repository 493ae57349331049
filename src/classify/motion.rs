use image::GrayImage;
use imageproc::edges::canny;

use super::Finding;
use crate::config::MotionSettings;
use crate::event::ViolationKind;

/// Raw measurements for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MotionMeasure {
    /// Pixels whose intensity moved by more than the configured delta. None on the first frame.
    pub changed_pixels: Option<u64>,
    /// Fraction of pixels on a Canny edge.
    pub edge_density: f32,
}

#[derive(Debug, Default)]
pub struct MotionReport {
    pub measure: MotionMeasure,
    pub findings: Vec<Finding>,
}

/// Frame-difference movement check and edge-density clutter check.
///
/// Both conditions are evaluated per frame without a hold; every frame over a
/// threshold is a fresh observation. Alert gating happens downstream.
pub struct MotionEdgeClassifier {
    settings: MotionSettings,
    movement: bool,
    edges: bool,
    previous: Option<GrayImage>,
}

impl MotionEdgeClassifier {
    pub fn new(settings: MotionSettings, movement: bool, edges: bool) -> Self {
        Self {
            settings,
            movement,
            edges,
            previous: None,
        }
    }

    pub fn assess(&mut self, gray: &GrayImage) -> MotionReport {
        let mut report = MotionReport::default();

        if self.movement {
            let changed = match &self.previous {
                Some(prev) if prev.dimensions() == gray.dimensions() => {
                    Some(count_changed(prev, gray, self.settings.pixel_delta))
                }
                Some(_) => {
                    log::debug!("frame size changed; motion baseline reset");
                    None
                }
                None => None,
            };
            report.measure.changed_pixels = changed;
            if let Some(changed) = changed {
                if changed > self.settings.pixel_threshold {
                    report.findings.push(Finding::new(
                        ViolationKind::ExcessiveMovement,
                        format!("{} pixels changed", changed),
                        true,
                    ));
                }
            }
            self.previous = Some(gray.clone());
        }

        if self.edges {
            let density = edge_density(gray, self.settings.canny_low, self.settings.canny_high);
            report.measure.edge_density = density;
            if density > self.settings.edge_density {
                report.findings.push(Finding::new(
                    ViolationKind::ExtraneousMaterials,
                    format!("edge density {:.3}", density),
                    true,
                ));
            }
        }

        report
    }
}

/// Number of pixels whose absolute difference exceeds `delta`.
pub fn count_changed(prev: &GrayImage, next: &GrayImage, delta: u8) -> u64 {
    prev.as_raw()
        .iter()
        .zip(next.as_raw().iter())
        .filter(|(a, b)| a.abs_diff(**b) > delta)
        .count() as u64
}

pub fn edge_density(gray: &GrayImage, low: f32, high: f32) -> f32 {
    let total = gray.width() as u64 * gray.height() as u64;
    if total == 0 {
        return 0.0;
    }
    let edges = canny(gray, low, high);
    let on = edges.as_raw().iter().filter(|v| **v > 0).count() as u64;
    on as f32 / total as f32
}
