//! Still-image frame source: one image file, or every image in a directory
//! in file-name order.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use log::info;

use super::{is_image_path, FrameSource, SourceStats};
use crate::frame::Frame;

pub struct ImageSource {
    root: PathBuf,
    paths: Vec<PathBuf>,
    cursor: usize,
    frame_count: u64,
    last_error: Option<String>,
}

impl ImageSource {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            paths: Vec::new(),
            cursor: 0,
            frame_count: 0,
            last_error: None,
        }
    }

    fn collect_paths(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Ok(vec![self.root.clone()]);
        }
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(&self.root)
            .with_context(|| format!("read image directory {}", self.root.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_image_path(&path) {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }
}

impl FrameSource for ImageSource {
    fn connect(&mut self) -> Result<()> {
        let paths = self.collect_paths()?;
        if paths.is_empty() {
            bail!("no images found in {}", self.root.display());
        }
        info!(
            "ImageSource: connected to {} ({} images)",
            self.root.display(),
            paths.len()
        );
        self.paths = paths;
        self.cursor = 0;
        self.last_error = None;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };
        self.cursor += 1;

        let decoded = image::open(path)
            .with_context(|| format!("decode image {}", path.display()))
            .inspect_err(|err| self.last_error = Some(err.to_string()))?;
        let frame = Frame::from(decoded.to_rgb8()).with_index(self.frame_count);
        self.frame_count += 1;
        self.last_error = None;
        Ok(Some(frame))
    }

    fn is_healthy(&self) -> bool {
        self.last_error.is_none()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: self.root.display().to_string(),
        }
    }
}
