//! Frame containers.
//!
//! - `Frame`: decoded RGB image owned by the capture loop. Pixels are zeroized on drop.
//! - `Rect`: integer pixel rectangle used for face/eye boxes and crops.
//! - `BoundingBox`: floating point corner box produced by object detectors.
//!
//! Frames are ephemeral: each loop iteration supersedes the previous one. Webcam
//! pixels of exam candidates never leave the process except through the relay
//! stream, which serves the uploaded bytes as received.

use anyhow::{anyhow, Context, Result};
use image::{imageops, GrayImage, RgbImage};
use zeroize::Zeroize;

// ----------------------------------------------------------------------------
// Frame: decoded color image
// ----------------------------------------------------------------------------

pub struct Frame {
    pixels: RgbImage,
}

impl Frame {
    pub fn from_rgb(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    /// Build a frame from packed RGB bytes.
    pub fn from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        let pixels = RgbImage::from_raw(width, height, data)
            .ok_or_else(|| anyhow!("pixel buffer does not match {}x{}", width, height))?;
        Ok(Self { pixels })
    }

    /// Decode an encoded image (JPEG/PNG) in memory.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.is_empty() {
            return Err(anyhow!("empty image payload"));
        }
        let image = image::load_from_memory(bytes).context("decode frame")?;
        Ok(Self {
            pixels: image.into_rgb8(),
        })
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn rgb(&self) -> &RgbImage {
        &self.pixels
    }

    pub fn gray(&self) -> GrayImage {
        imageops::grayscale(&self.pixels)
    }

    /// Copy of the region inside `rect`, clamped to the frame. None when empty.
    pub fn crop(&self, rect: Rect) -> Option<RgbImage> {
        let rect = rect.clamp_to(self.width(), self.height())?;
        Some(
            imageops::crop_imm(&self.pixels, rect.x, rect.y, rect.width, rect.height)
                .to_image(),
        )
    }

    /// Central guide box covering the middle half of the frame in each dimension.
    pub fn guide_box(&self) -> Rect {
        let (w, h) = (self.width(), self.height());
        Rect::new(w / 4, h / 4, 3 * w / 4 - w / 4, 3 * h / 4 - h / 4)
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        let raw: &mut [u8] = &mut self.pixels;
        raw.zeroize();
    }
}

// ----------------------------------------------------------------------------
// Geometry
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center_x(&self) -> u32 {
        self.x + self.width / 2
    }

    pub fn center_y(&self) -> u32 {
        self.y + self.height / 2
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Intersect with a `frame_w`x`frame_h` frame. None when nothing remains.
    pub fn clamp_to(&self, frame_w: u32, frame_h: u32) -> Option<Rect> {
        let x1 = self.x.min(frame_w);
        let y1 = self.y.min(frame_h);
        let x2 = self.x.saturating_add(self.width).min(frame_w);
        let y2 = self.y.saturating_add(self.height).min(frame_h);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Rect::new(x1, y1, x2 - x1, y2 - y1))
    }
}

/// Corner box in pixel coordinates. May extend past the frame edges.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Integer rectangle clamped to the frame.
    pub fn to_rect(&self, frame_w: u32, frame_h: u32) -> Option<Rect> {
        let x1 = self.x1.max(0.0).floor() as u32;
        let y1 = self.y1.max(0.0).floor() as u32;
        let x2 = self.x2.max(0.0).floor() as u32;
        let y2 = self.y2.max(0.0).floor() as u32;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Rect::new(x1, y1, x2 - x1, y2 - y1).clamp_to(frame_w, frame_h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_raw_rejects_short_buffers() {
        assert!(Frame::from_raw(4, 4, vec![0u8; 10]).is_err());
        let frame = Frame::from_raw(4, 2, vec![7u8; 24]).unwrap();
        assert_eq!((frame.width(), frame.height()), (4, 2));
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(Frame::decode(b"").is_err());
        assert!(Frame::decode(b"not an image").is_err());
    }

    #[test]
    fn crop_clamps_to_frame() {
        let frame = Frame::from_raw(10, 10, vec![1u8; 300]).unwrap();
        let crop = frame.crop(Rect::new(8, 8, 5, 5)).unwrap();
        assert_eq!(crop.dimensions(), (2, 2));
        assert!(frame.crop(Rect::new(12, 0, 3, 3)).is_none());
    }

    #[test]
    fn bounding_box_clamps_negative_coordinates() {
        let rect = BoundingBox::new(-5.0, -2.0, 30.0, 12.5)
            .to_rect(20, 10)
            .unwrap();
        assert_eq!(rect, Rect::new(0, 0, 20, 10));
        assert!(BoundingBox::new(5.0, 5.0, 5.0, 9.0).to_rect(20, 10).is_none());
    }

    #[test]
    fn guide_box_is_middle_half() {
        let frame = Frame::from_raw(800, 600, vec![0u8; 800 * 600 * 3]).unwrap();
        assert_eq!(frame.guide_box(), Rect::new(200, 150, 400, 300));
    }
}
