//! Frame sources.
//!
//! Every source yields RGB8 `Frame`s with a capture index and timestamp:
//! - `stub://<name>`: synthetic frames (tests, demos)
//! - a still image or a directory of images
//! - USB/V4L2 devices (feature: ingest-v4l2)
//! - local video files (feature: ingest-file-ffmpeg)
//!
//! Sources hand frames over and keep no copy. Pacing to `target_fps` is the
//! caller's job; sources return frames as fast as they can produce them.

mod normalize;
pub mod stills;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;
#[cfg(feature = "ingest-file-ffmpeg")]
pub mod video_ffmpeg;

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Result};
use log::warn;
use serde::Serialize;

pub use crate::config::SourceSettings;
pub use stills::ImageSource;
pub use synthetic::SyntheticSource;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Source;
#[cfg(feature = "ingest-file-ffmpeg")]
pub use video_ffmpeg::VideoFileSource;

use crate::frame::Frame;

/// A producer of frames.
pub trait FrameSource {
    /// Open the underlying device or file.
    fn connect(&mut self) -> Result<()>;

    /// The next frame, or `None` once the source is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}

/// The next frame that decodes, skipping over failed ones.
///
/// Each failure is logged. After `max_consecutive_failures` failures in a
/// row the last error is returned and the source is considered unusable.
pub fn next_good_frame(
    source: &mut dyn FrameSource,
    max_consecutive_failures: u32,
) -> Result<Option<Frame>> {
    let mut failures = 0u32;
    loop {
        match source.next_frame() {
            Ok(frame) => return Ok(frame),
            Err(err) => {
                failures += 1;
                if failures >= max_consecutive_failures.max(1) {
                    return Err(err.context(format!(
                        "{} consecutive frames failed on {}",
                        failures,
                        source.stats().source
                    )));
                }
                warn!("frame source {}: skipping frame: {:#}", source.stats().source, err);
            }
        }
    }
}

/// Longest gap between frames before a live source reports unhealthy.
#[cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]
pub(crate) fn health_grace(target_fps: u32) -> Duration {
    let base_ms = if target_fps == 0 {
        2_000
    } else {
        (1000 / target_fps).saturating_mul(6)
    };
    Duration::from_millis(base_ms.max(2_000) as u64)
}

fn is_image_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
        .unwrap_or(false)
}

/// Pick a source for `uri`. Dimensions and frame rate come from `settings`
/// where the source can honor them.
pub fn open_source(uri: &str, settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    if let Some(name) = uri.strip_prefix("stub://") {
        return Ok(Box::new(SyntheticSource::new(name, settings.width, settings.height)));
    }

    if let Some(device) = uri.strip_prefix("v4l2://") {
        return open_v4l2(device, settings);
    }
    if uri.starts_with("/dev/video") {
        return open_v4l2(uri, settings);
    }

    if uri.contains("://") && !uri.starts_with("file://") {
        bail!("unsupported frame source '{}'", uri);
    }
    let path = Path::new(uri.strip_prefix("file://").unwrap_or(uri));
    if path.is_dir() || is_image_path(path) {
        return Ok(Box::new(ImageSource::new(path)));
    }
    open_video(path, settings)
}

#[cfg(feature = "ingest-v4l2")]
fn open_v4l2(device: &str, settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Source::new(device, settings)))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_v4l2(device: &str, _settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    bail!(
        "V4L2 device '{}' requires the ingest-v4l2 feature",
        device
    )
}

#[cfg(feature = "ingest-file-ffmpeg")]
fn open_video(path: &Path, settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(VideoFileSource::new(path, settings.target_fps)?))
}

#[cfg(not(feature = "ingest-file-ffmpeg"))]
fn open_video(path: &Path, _settings: &SourceSettings) -> Result<Box<dyn FrameSource>> {
    bail!(
        "video file '{}' requires the ingest-file-ffmpeg feature",
        path.display()
    )
}
