use serde::Serialize;

/// Axis-aligned box in normalized (0..1) frame coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    /// The whole frame.
    pub const FULL: BoundingBox = BoundingBox {
        x_min: 0.0,
        y_min: 0.0,
        x_max: 1.0,
        y_max: 1.0,
    };

    /// Build a box from two corners, clamped to the frame and reordered so
    /// that min <= max on both axes.
    pub fn from_corners(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        let c = |v: f32| v.clamp(0.0, 1.0);
        Self {
            x_min: c(x0.min(x1)),
            y_min: c(y0.min(y1)),
            x_max: c(x0.max(x1)),
            y_max: c(y0.max(y1)),
        }
    }

    pub fn center(&self) -> (f32, f32) {
        (
            (self.x_min + self.x_max) / 2.0,
            (self.y_min + self.y_max) / 2.0,
        )
    }

    pub fn area(&self) -> f32 {
        (self.x_max - self.x_min) * (self.y_max - self.y_min)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionType {
    Object,
    Motion,
}

/// One detection produced by a pretrained detector for one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DetectionRecord {
    pub bbox: BoundingBox,
    pub score: f32,
    pub label: String,
    pub kind: DetectionType,
    /// Capture time of the source frame, milliseconds since the Unix epoch.
    pub captured_at_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_are_clamped_and_ordered() {
        let b = BoundingBox::from_corners(0.9, 1.4, -0.2, 0.5);
        assert_eq!(b, BoundingBox::from_corners(0.0, 0.5, 0.9, 1.0));
        assert!((b.area() - 0.45).abs() < 1e-6);
        assert_eq!(BoundingBox::FULL.center(), (0.5, 0.5));
    }

    #[test]
    fn record_serializes_with_lowercase_kind() {
        let record = DetectionRecord {
            bbox: BoundingBox::FULL,
            score: 0.85,
            label: "motion".to_string(),
            kind: DetectionType::Motion,
            captured_at_ms: 42,
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "motion");
        assert_eq!(json["bbox"]["x_max"], 1.0);
        assert_eq!(json["captured_at_ms"], 42);
    }
}
