mod backend;
mod backends;
mod catalog;
mod result;

pub use backend::ObjectDetector;
pub use backends::MotionDetector;
#[cfg(feature = "backend-tract")]
pub use backends::TractDetector;
pub use catalog::{ArtifactLocation, DetectorFactory, ModelCatalog, ModelSource};
pub use result::{BoundingBox, DetectionRecord, DetectionType};
