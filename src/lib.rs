//! Loob Vision
//!
//! Frame-by-frame point detection: a small convolutional network regresses
//! one normalized (x, y) coordinate per video frame, with pretrained object
//! detectors available as an alternative model.
//!
//! # Architecture
//!
//! Components, leaves first:
//!
//! 1. **Frame sources** (`ingest`): synthetic frames, still images, V4L2
//!    webcams and video files, all yielding RGB8 `Frame`s.
//! 2. **Preprocessor** (`preprocess`): frame -> `[1, 128, 128, 3]` tensor in
//!    [0, 1], one interpolation setting per deployment.
//! 3. **Model store** (`store`): the single loaded regression network, with
//!    all-or-nothing `load`, `get` and idempotent `dispose`.
//! 4. **Predictor** (`predict`): tensor -> `Prediction { x, y }`.
//! 5. **Pipeline** (`pipeline`): active model selection, per-frame routing to
//!    the predictor or a detector backend (`detect`), and fan-out to
//!    registered frame processors.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use loob_vision::{DetectionPipeline, Frame, MotionDetector, ModelCatalog, ModelStore};
//!
//! let mut catalog = ModelCatalog::new();
//! catalog.register_detector("motion", || Ok(Box::new(MotionDetector::new()) as _));
//! let mut pipeline = DetectionPipeline::new(catalog, Arc::new(ModelStore::new()));
//! pipeline.set_model("motion")?;
//! let outcome = pipeline.process_frame(&Frame::filled(64, 48, [0, 0, 0]))?;
//! assert!(outcome.report().is_some());
//! # Ok::<(), loob_vision::Error>(())
//! ```

pub mod config;
pub mod detect;
pub mod error;
pub mod frame;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod predict;
pub mod preprocess;
pub mod store;

pub use config::{ModelEntry, ModelKind, PipelineConfig, SourceSettings};
pub use detect::{
    ArtifactLocation, BoundingBox, DetectionRecord, DetectionType, ModelCatalog, ModelSource,
    MotionDetector, ObjectDetector,
};
#[cfg(feature = "backend-tract")]
pub use detect::TractDetector;
pub use error::{Error, ModelLoadError, Result, ShapeRole};
pub use frame::Frame;
pub use ingest::{
    next_good_frame, open_source, FrameSource, ImageSource, SourceStats, SyntheticSource,
};
pub use model::{ModelArtifacts, ModelInfo, RegressionModel, WeightBlob, TOPOLOGY_FILE};
pub use pipeline::{
    channel, ChannelProcessor, DetectionPipeline, FrameOutcome, FrameProcessor, FrameReport,
    FrameResult, PipelineState, PipelineStats,
};
pub use predict::{Prediction, Predictor};
pub use preprocess::{InputTensor, Interpolation, Preprocessor};
pub use store::ModelStore;
