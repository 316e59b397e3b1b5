//! Synthetic frames for tests and demos.
//!
//! Each frame is a fixed diagonal gradient with a bright square that slides
//! one step per frame, so consecutive frames always differ and the square's
//! position is a known function of the frame index.

use anyhow::Result;
use log::info;

use super::{FrameSource, SourceStats};
use crate::frame::{Frame, RGB_CHANNELS};

const SQUARE_COLOR: [u8; 3] = [255, 255, 255];

pub struct SyntheticSource {
    name: String,
    width: u32,
    height: u32,
    frame_count: u64,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(name: &str, width: u32, height: u32) -> Self {
        Self {
            name: name.to_string(),
            width,
            height,
            frame_count: 0,
            connected: false,
        }
    }

    fn square_side(&self) -> u32 {
        (self.width.min(self.height) / 8).max(1)
    }

    /// Top-left corner of the square in frame `index`.
    pub fn square_origin(&self, index: u64) -> (u32, u32) {
        let side = self.square_side();
        let span_x = u64::from(self.width.saturating_sub(side).max(1));
        let span_y = u64::from(self.height.saturating_sub(side).max(1));
        let step = index * u64::from(side / 2).max(1);
        ((step % span_x) as u32, ((step / span_x) * u64::from(side) % span_y) as u32)
    }

    /// Center of the square in frame `index`, normalized to [0, 1].
    pub fn square_center(&self, index: u64) -> (f32, f32) {
        let (x, y) = self.square_origin(index);
        let half = self.square_side() as f32 / 2.0;
        (
            (x as f32 + half) / self.width.max(1) as f32,
            (y as f32 + half) / self.height.max(1) as f32,
        )
    }

    fn render(&self, index: u64) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut pixels = vec![0u8; w * h * RGB_CHANNELS];
        for (i, px) in pixels.chunks_exact_mut(RGB_CHANNELS).enumerate() {
            let (x, y) = (i % w, i / w);
            let shade = ((x + y) * 255 / (w + h).max(1)) as u8 / 2;
            px.copy_from_slice(&[shade, shade / 2, 64]);
        }

        let side = self.square_side() as usize;
        let (ox, oy) = self.square_origin(index);
        for y in (oy as usize)..(oy as usize + side).min(h) {
            for x in (ox as usize)..(ox as usize + side).min(w) {
                let offset = (y * w + x) * RGB_CHANNELS;
                pixels[offset..offset + RGB_CHANNELS].copy_from_slice(&SQUARE_COLOR);
            }
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    /// Synthetic sources are always "connected".
    fn connect(&mut self) -> Result<()> {
        self.connected = true;
        info!(
            "SyntheticSource: connected to stub://{} ({}x{})",
            self.name, self.width, self.height
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let index = self.frame_count;
        let frame = Frame::from_rgb(self.render(index), self.width, self.height)?.with_index(index);
        self.frame_count += 1;
        Ok(Some(frame))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            source: format!("stub://{}", self.name),
        }
    }
}
