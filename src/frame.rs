//! Frame container.
//!
//! A `Frame` is one RGB8 image sample handed from a frame source to the
//! pipeline. Frames are ephemeral: the pipeline reads them and never keeps
//! them past `process_frame`.

use std::time::{SystemTime, UNIX_EPOCH};

use image::RgbImage;

use crate::error::{Error, Result};

pub const RGB_CHANNELS: usize = 3;

/// One RGB8 image sample, row-major, 3 bytes per pixel.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    /// Monotonic capture index assigned by the source.
    pub index: u64,
    /// Capture time, milliseconds since the Unix epoch.
    pub captured_at_ms: u64,
}

impl Frame {
    /// Wrap RGB8 pixels. The pixel length must be exactly `width * height * 3`.
    ///
    /// A 0x0 frame with no pixels is accepted; the preprocessor rejects it.
    pub fn from_rgb(data: Vec<u8>, width: u32, height: u32) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(RGB_CHANNELS))
            .ok_or_else(|| Error::InvalidFrame("frame dimensions overflow".to_string()))?;
        if data.len() != expected {
            return Err(Error::InvalidFrame(format!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            )));
        }
        Ok(Self {
            data,
            width,
            height,
            index: 0,
            captured_at_ms: now_millis(),
        })
    }

    /// A frame filled with one color.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * RGB_CHANNELS)
            .collect();
        Self {
            data,
            width,
            height,
            index: 0,
            captured_at_ms: now_millis(),
        }
    }

    pub fn with_index(mut self, index: u64) -> Self {
        self.index = index;
        self
    }

    pub fn with_timestamp(mut self, captured_at_ms: u64) -> Self {
        self.captured_at_ms = captured_at_ms;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0 || self.data.is_empty()
    }

    /// Copy the pixels into an owned `image` buffer.
    pub fn to_rgb_image(&self) -> Option<RgbImage> {
        RgbImage::from_raw(self.width, self.height, self.data.clone())
    }
}

impl From<RgbImage> for Frame {
    fn from(image: RgbImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            data: image.into_raw(),
            width,
            height,
            index: 0,
            captured_at_ms: now_millis(),
        }
    }
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
