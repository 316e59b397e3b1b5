use anyhow::Result;
use sha2::{Digest, Sha256};

use crate::detect::backend::ObjectDetector;
use crate::detect::result::{BoundingBox, DetectionRecord, DetectionType};
use crate::frame::Frame;

const MOTION_SCORE: f32 = 0.85;

/// Frame-difference detector. Hashes pixels and reports one full-frame
/// motion record whenever the hash changes from the previous frame.
#[derive(Default)]
pub struct MotionDetector {
    last_hash: Option<[u8; 32]>,
}

impl MotionDetector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ObjectDetector for MotionDetector {
    fn name(&self) -> &'static str {
        "motion"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionRecord>> {
        let mut hasher = Sha256::new();
        hasher.update(frame.width().to_le_bytes());
        hasher.update(frame.height().to_le_bytes());
        hasher.update(frame.pixels());
        let current: [u8; 32] = hasher.finalize().into();

        let moved = self.last_hash.is_some_and(|prev| prev != current);
        self.last_hash = Some(current);

        if !moved {
            return Ok(Vec::new());
        }
        Ok(vec![DetectionRecord {
            bbox: BoundingBox::FULL,
            score: MOTION_SCORE,
            label: "motion".to_string(),
            kind: DetectionType::Motion,
            captured_at_ms: frame.captured_at_ms,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_motion_only_on_change() {
        let mut detector = MotionDetector::new();
        let a = Frame::filled(4, 4, [0, 0, 0]).with_timestamp(1);
        let b = Frame::filled(4, 4, [9, 9, 9]).with_timestamp(2);

        assert!(detector.detect(&a).unwrap().is_empty());
        let records = detector.detect(&b).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].kind, DetectionType::Motion);
        assert_eq!(records[0].score, 0.85);
        assert_eq!(records[0].captured_at_ms, 2);
        assert!(detector.detect(&b).unwrap().is_empty());
    }
}
