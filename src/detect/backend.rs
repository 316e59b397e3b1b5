use anyhow::Result;

use crate::detect::result::DetectionRecord;
use crate::frame::Frame;

/// A general-purpose pretrained detector, the alternative to the
/// coordinate-regression model.
///
/// Detectors read the frame during `detect` only and keep no pixels.
pub trait ObjectDetector: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame. Zero records is a valid result.
    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionRecord>>;

    /// Optional warm-up hook, run once when the detector is initialized.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
