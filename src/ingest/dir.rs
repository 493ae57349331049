use anyhow::{anyhow, Context, Result};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use super::{Capture, FrameSource, SourceConfig, SourceStats};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Replays the still images of a local directory in file-name order.
pub struct ImageDirSource {
    config: SourceConfig,
    pending: VecDeque<PathBuf>,
    frame_count: u64,
    connected: bool,
    last_error: Option<String>,
}

impl ImageDirSource {
    pub fn new(config: SourceConfig) -> Self {
        Self {
            config,
            pending: VecDeque::new(),
            frame_count: 0,
            connected: false,
            last_error: None,
        }
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        std::fs::read_dir(dir).with_context(|| format!("open image directory {}", dir.display()))?;
    let mut images = Vec::new();
    for entry in entries {
        let path = entry.context("read directory entry")?.path();
        let is_image = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                IMAGE_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });
        if is_image && path.is_file() {
            images.push(path);
        }
    }
    images.sort();
    Ok(images)
}

impl FrameSource for ImageDirSource {
    fn connect(&mut self) -> Result<()> {
        let dir = Path::new(&self.config.uri);
        let images = list_images(dir)?;
        if images.is_empty() {
            return Err(anyhow!("no JPEG/PNG images in {}", dir.display()));
        }
        log::info!("{}: {} images queued", dir.display(), images.len());
        self.pending = images.into();
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Capture>> {
        if !self.connected {
            return Err(anyhow!("image directory not opened; call connect() first"));
        }
        let Some(path) = self.pending.pop_front() else {
            return Ok(None);
        };
        let bytes = std::fs::read(&path).map_err(|e| {
            self.last_error = Some(e.to_string());
            anyhow!("read {}: {}", path.display(), e)
        })?;
        self.frame_count += 1;
        Ok(Some(Capture::Encoded(bytes)))
    }

    fn is_healthy(&self) -> bool {
        self.connected && self.last_error.is_none()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.config.uri.clone(),
        }
    }
}
