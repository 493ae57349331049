use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Capture, FrameSource, SourceConfig, SourceStats};
use crate::frame::Frame;

const WIDTH: u32 = 640;
const HEIGHT: u32 = 480;
/// Frames per scripted scene.
const SCENE_LENGTH: u64 = 50;
const SKIN: Rgb<u8> = Rgb([224, 172, 140]);
const BACKDROP: [u8; 3] = [90, 100, 110];

/// Synthetic candidate in front of a plain backdrop.
///
/// Scenes rotate every 50 frames: centered face, face turned aside, empty
/// seat, centered face again. Options: `stub://name?frames=N&face=off&seed=S`.
pub struct SyntheticSource {
    config: SourceConfig,
    limit: Option<u64>,
    face: bool,
    rng: StdRng,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(config: SourceConfig) -> Result<Self> {
        let mut limit = None;
        let mut face = true;
        let mut seed = 7u64;
        if let Some((_, query)) = config.uri.split_once('?') {
            for pair in query.split('&').filter(|p| !p.is_empty()) {
                let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
                match key {
                    "frames" => {
                        limit = Some(value.parse().map_err(|_| {
                            anyhow!("stub frames must be a positive integer, got '{}'", value)
                        })?)
                    }
                    "face" => face = value != "off",
                    "seed" => {
                        seed = value
                            .parse()
                            .map_err(|_| anyhow!("stub seed must be an integer"))?
                    }
                    other => return Err(anyhow!("unknown stub option '{}'", other)),
                }
            }
        }
        Ok(Self {
            config,
            limit,
            face,
            rng: StdRng::seed_from_u64(seed),
            frame_count: 0,
            connected: false,
        })
    }

    fn render(&mut self) -> RgbImage {
        let scene = (self.frame_count / SCENE_LENGTH) % 4;
        let mut image = RgbImage::from_fn(WIDTH, HEIGHT, |_, _| Rgb(BACKDROP));
        for px in image.pixels_mut() {
            let jitter: i16 = self.rng.gen_range(-6..=6);
            for channel in px.0.iter_mut() {
                *channel = (*channel as i16 + jitter).clamp(0, 255) as u8;
            }
        }
        if !self.face || scene == 2 {
            return image;
        }
        let center_x = if scene == 1 { 90 } else { WIDTH / 2 };
        draw_face(&mut image, center_x, HEIGHT / 2 - 20, 70, 90);
        image
    }
}

fn draw_face(image: &mut RgbImage, cx: u32, cy: u32, rx: u32, ry: u32) {
    let (rx2, ry2) = ((rx * rx) as f32, (ry * ry) as f32);
    for y in cy.saturating_sub(ry)..(cy + ry).min(image.height()) {
        for x in cx.saturating_sub(rx)..(cx + rx).min(image.width()) {
            let dx = x as f32 - cx as f32;
            let dy = y as f32 - cy as f32;
            if dx * dx / rx2 + dy * dy / ry2 <= 1.0 {
                image.put_pixel(x, y, SKIN);
            }
        }
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        log::info!("{}: connected (synthetic)", self.config.uri);
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Capture>> {
        if !self.connected {
            return Err(anyhow!("synthetic source not connected; call connect() first"));
        }
        if self.limit.is_some_and(|limit| self.frame_count >= limit) {
            return Ok(None);
        }
        let image = self.render();
        self.frame_count += 1;
        Ok(Some(Capture::Decoded(Frame::from_rgb(image))))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.uri.clone(),
        }
    }
}
