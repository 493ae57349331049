//! Writing/typing motion on the desk area.
//!
//! Motion magnitude is estimated with normal flow (`|It| / |grad I|`) over the
//! lower part of the frame, which is where hands and paper sit for a side
//! camera. Sustained activity over several consecutive cycles confirms it.

use image::GrayImage;

use super::Finding;
use crate::event::ViolationKind;

/// Rows below this fraction of the frame height are analysed.
const DESK_REGION_START: f32 = 0.6;
/// Gradients weaker than this carry no usable motion signal.
const MIN_GRADIENT: f32 = 4.0;
/// Per-pixel flow cap; near-flat texture otherwise dominates the mean.
const MAX_PIXEL_FLOW: f32 = 20.0;

pub struct WritingMotionAnalyzer {
    threshold: f32,
    confirm: u32,
    streak: u32,
    previous: Option<GrayImage>,
}

impl WritingMotionAnalyzer {
    pub fn new(threshold: f32, confirm: u32) -> Self {
        Self {
            threshold,
            confirm,
            streak: 0,
            previous: None,
        }
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    /// Advance the baseline without evaluating (used around object scans).
    pub fn observe_only(&mut self, gray: &GrayImage) {
        self.previous = Some(gray.clone());
    }

    /// Evaluate one frame. Emits a finding once the streak exceeds the confirm count.
    pub fn assess(&mut self, gray: &GrayImage) -> Option<Finding> {
        let magnitude = match &self.previous {
            Some(prev) if prev.dimensions() == gray.dimensions() => {
                Some(desk_flow(prev, gray))
            }
            _ => None,
        };
        self.previous = Some(gray.clone());

        let magnitude = magnitude?;
        if magnitude > self.threshold {
            self.streak += 1;
        } else {
            self.streak = self.streak.saturating_sub(1);
        }
        if self.streak > self.confirm {
            self.streak = 0;
            return Some(Finding::new(
                ViolationKind::WritingMotion,
                format!("mean flow {:.2} px", magnitude),
                true,
            ));
        }
        None
    }
}

/// Mean normal-flow magnitude over the desk region of two equally sized frames.
pub fn desk_flow(prev: &GrayImage, next: &GrayImage) -> f32 {
    let (w, h) = next.dimensions();
    if w < 3 || h < 3 {
        return 0.0;
    }
    let start = ((h as f32 * DESK_REGION_START) as u32).max(1);
    let mut sum = 0.0f32;
    let mut samples = 0u32;
    for y in start..h - 1 {
        for x in 1..w - 1 {
            let at = |img: &GrayImage, dx: i32, dy: i32| -> f32 {
                img.get_pixel((x as i32 + dx) as u32, (y as i32 + dy) as u32)[0] as f32
            };
            let ix = ((at(prev, 1, 0) - at(prev, -1, 0)) + (at(next, 1, 0) - at(next, -1, 0))) / 4.0;
            let iy = ((at(prev, 0, 1) - at(prev, 0, -1)) + (at(next, 0, 1) - at(next, 0, -1))) / 4.0;
            let it = at(next, 0, 0) - at(prev, 0, 0);
            let grad = (ix * ix + iy * iy).sqrt();
            samples += 1;
            if grad >= MIN_GRADIENT {
                sum += (it.abs() / grad).min(MAX_PIXEL_FLOW);
            }
        }
    }
    if samples == 0 {
        0.0
    } else {
        sum / samples as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    /// Triangle wave along x: period 64, slope 8 intensity levels per pixel.
    fn ramps(shift: u32) -> GrayImage {
        GrayImage::from_fn(160, 120, |x, _| {
            let phase = (x + shift) % 64;
            let value = if phase < 32 { phase * 8 } else { (64 - phase) * 8 };
            Luma([value.min(255) as u8])
        })
    }

    #[test]
    fn static_desk_has_no_flow() {
        assert_eq!(desk_flow(&ramps(0), &ramps(0)), 0.0);
    }

    #[test]
    fn shifted_texture_measures_displacement() {
        let flow = desk_flow(&ramps(0), &ramps(4));
        assert!(flow > 2.5, "flow {}", flow);
    }

    #[test]
    fn confirmation_needs_a_sustained_streak() {
        let mut analyzer = WritingMotionAnalyzer::new(2.5, 3);
        assert!(analyzer.assess(&ramps(0)).is_none());
        let mut fired = Vec::new();
        for i in 1..=5u32 {
            fired.push(analyzer.assess(&ramps(i * 4)).is_some());
        }
        // Streak must exceed 3: the fourth moving frame confirms.
        assert_eq!(fired, vec![false, false, false, true, false]);
        assert_eq!(analyzer.streak(), 1);
    }

    #[test]
    fn quiet_frames_decay_the_streak() {
        let mut analyzer = WritingMotionAnalyzer::new(2.5, 3);
        analyzer.assess(&ramps(0));
        analyzer.assess(&ramps(4));
        analyzer.assess(&ramps(8));
        assert_eq!(analyzer.streak(), 2);
        analyzer.assess(&ramps(8));
        assert_eq!(analyzer.streak(), 1);
    }
}
