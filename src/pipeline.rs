//! Detection pipeline orchestrator.
//!
//! The pipeline owns the active model selection, routes each frame to either
//! the coordinate-regression predictor or a pretrained detector, and fans
//! the result out to registered frame processors in registration order.
//!
//! ```text
//!   Idle --set_model ok--> Ready --set_model--> Ready
//!     \                      |
//!      +------dispose--------+--> Disposed (terminal)
//! ```

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::mpsc;
use std::sync::Arc;

use log::{info, warn};
use serde::Serialize;

use crate::config::PipelineConfig;
use crate::detect::{DetectionRecord, ModelCatalog, ModelSource, ObjectDetector};
use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::predict::{Prediction, Predictor};
use crate::preprocess::Preprocessor;
use crate::store::ModelStore;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineState {
    Idle,
    Ready,
    Disposed,
}

/// What the active model produced for one frame.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameResult {
    Prediction(Prediction),
    Detections(Vec<DetectionRecord>),
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame_index: u64,
    pub captured_at_ms: u64,
    pub model_id: String,
    pub result: FrameResult,
}

/// Result of `process_frame` when the pipeline itself is usable.
#[derive(Debug)]
pub enum FrameOutcome {
    Processed(FrameReport),
    /// A per-frame failure; the pipeline stays ready for the next frame.
    Skipped(Error),
}

impl FrameOutcome {
    pub fn report(&self) -> Option<&FrameReport> {
        match self {
            FrameOutcome::Processed(report) => Some(report),
            FrameOutcome::Skipped(_) => None,
        }
    }
}

/// Consumer of frame reports.
///
/// A failing or panicking processor is logged and skipped; the other
/// processors and the caller of `process_frame` are unaffected.
pub trait FrameProcessor: Send {
    fn process(&mut self, report: &FrameReport) -> anyhow::Result<()>;
}

impl<F> FrameProcessor for F
where
    F: FnMut(&FrameReport) -> anyhow::Result<()> + Send,
{
    fn process(&mut self, report: &FrameReport) -> anyhow::Result<()> {
        self(report)
    }
}

/// Forwards each report over an mpsc channel, for consumers that run on
/// their own thread. Never blocks the pipeline.
pub struct ChannelProcessor {
    sender: mpsc::Sender<FrameReport>,
}

impl FrameProcessor for ChannelProcessor {
    fn process(&mut self, report: &FrameReport) -> anyhow::Result<()> {
        self.sender
            .send(report.clone())
            .map_err(|_| anyhow::anyhow!("report receiver disconnected"))
    }
}

/// A channel processor and the receiving end of its reports.
pub fn channel() -> (ChannelProcessor, mpsc::Receiver<FrameReport>) {
    let (sender, receiver) = mpsc::channel();
    (ChannelProcessor { sender }, receiver)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub frames_processed: u64,
    pub frames_skipped: u64,
    pub processor_failures: u64,
}

pub struct DetectionPipeline {
    catalog: ModelCatalog,
    store: Arc<ModelStore>,
    predictor: Predictor,
    preprocessor: Preprocessor,
    detectors: HashMap<String, Box<dyn ObjectDetector>>,
    processors: Vec<Box<dyn FrameProcessor>>,
    active: Option<String>,
    state: PipelineState,
    stats: PipelineStats,
}

impl DetectionPipeline {
    /// A pipeline in `Idle`. Nothing is loaded until `set_model`.
    pub fn new(catalog: ModelCatalog, store: Arc<ModelStore>) -> Self {
        Self {
            catalog,
            predictor: Predictor::new(Arc::clone(&store)),
            store,
            preprocessor: Preprocessor::default(),
            detectors: HashMap::new(),
            processors: Vec::new(),
            active: None,
            state: PipelineState::Idle,
            stats: PipelineStats::default(),
        }
    }

    /// Catalog, store and preprocessor as described by `config`. Still `Idle`.
    pub fn from_config(config: &PipelineConfig) -> anyhow::Result<Self> {
        let catalog = ModelCatalog::from_config(config)?;
        Ok(Self::new(catalog, Arc::new(ModelStore::new()))
            .with_preprocessor(Preprocessor::new(config.interpolation)))
    }

    pub fn with_preprocessor(mut self, preprocessor: Preprocessor) -> Self {
        self.preprocessor = preprocessor;
        self
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn active_model(&self) -> Option<&str> {
        self.active.as_deref()
    }

    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    pub fn processor_count(&self) -> usize {
        self.processors.len()
    }

    fn is_initialized(&self, id: &str) -> bool {
        match self.catalog.get(id) {
            Some(ModelSource::Regression(_)) => self.store.loaded_id().as_deref() == Some(id),
            Some(ModelSource::Detector(_)) => self.detectors.contains_key(id),
            None => false,
        }
    }

    /// Make `model_id` the active model, initializing it when needed.
    ///
    /// On failure the previously active model stays active and usable.
    pub fn set_model(&mut self, model_id: &str) -> Result<()> {
        if self.state == PipelineState::Disposed {
            return Err(Error::PipelineNotReady(self.state));
        }
        let source = self
            .catalog
            .get(model_id)
            .ok_or_else(|| Error::UnknownModel(model_id.to_string()))?;

        if self.active.as_deref() == Some(model_id) && self.is_initialized(model_id) {
            return Ok(());
        }

        match source {
            ModelSource::Regression(location) => {
                if self.store.loaded_id().as_deref() != Some(model_id) {
                    let artifacts = location.artifacts()?;
                    if let Err(err) = self.store.load(model_id, &artifacts) {
                        warn!("pipeline: loading '{}' failed: {}", model_id, err);
                        return Err(err);
                    }
                }
            }
            ModelSource::Detector(factory) => {
                if !self.detectors.contains_key(model_id) {
                    let mut detector = factory().map_err(|e| Error::detector(model_id, e))?;
                    detector
                        .warm_up()
                        .map_err(|e| Error::detector(model_id, e))?;
                    info!(
                        "pipeline: initialized detector '{}' ({})",
                        model_id,
                        detector.name()
                    );
                    self.detectors.insert(model_id.to_string(), detector);
                }
            }
        }

        if let Some(previous) = self.active.replace(model_id.to_string()) {
            info!("pipeline: switched model '{}' -> '{}'", previous, model_id);
        } else {
            info!("pipeline: active model '{}'", model_id);
        }
        self.state = PipelineState::Ready;
        Ok(())
    }

    /// Run the active model on `frame` and publish the report.
    ///
    /// Per-frame failures come back as `FrameOutcome::Skipped`; errors that
    /// need corrective action (no model, not ready) are returned as `Err`.
    /// That includes a shared store that no longer holds the active model;
    /// `set_model` with the active id reloads it.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<FrameOutcome> {
        if self.state != PipelineState::Ready {
            return Err(Error::PipelineNotReady(self.state));
        }
        let Some(model_id) = self.active.clone() else {
            return Err(Error::PipelineNotReady(self.state));
        };

        let result = match self.catalog.get(&model_id) {
            Some(ModelSource::Regression(_)) => self
                .preprocessor
                .preprocess(frame)
                .and_then(|tensor| self.predictor.predict_as(&model_id, tensor))
                .map(FrameResult::Prediction),
            Some(ModelSource::Detector(_)) => match self.detectors.get_mut(&model_id) {
                Some(detector) => detector
                    .detect(frame)
                    .map(FrameResult::Detections)
                    .map_err(|e| Error::detector(&model_id, e)),
                None => Err(Error::NoModelLoaded),
            },
            None => Err(Error::UnknownModel(model_id.clone())),
        };

        match result {
            Ok(result) => {
                let report = FrameReport {
                    frame_index: frame.index,
                    captured_at_ms: frame.captured_at_ms,
                    model_id,
                    result,
                };
                self.publish(&report);
                self.stats.frames_processed += 1;
                Ok(FrameOutcome::Processed(report))
            }
            Err(err) if err.is_frame_local() => {
                warn!("pipeline: skipped frame {}: {}", frame.index, err);
                self.stats.frames_skipped += 1;
                Ok(FrameOutcome::Skipped(err))
            }
            Err(err) => Err(err),
        }
    }

    fn publish(&mut self, report: &FrameReport) {
        for (slot, processor) in self.processors.iter_mut().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| processor.process(report))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    self.stats.processor_failures += 1;
                    warn!("pipeline: frame processor #{} failed: {:#}", slot, err);
                }
                Err(_) => {
                    self.stats.processor_failures += 1;
                    warn!("pipeline: frame processor #{} panicked", slot);
                }
            }
        }
    }

    /// Append a consumer. No limit and no de-duplication.
    pub fn register_frame_processor<P>(&mut self, processor: P) -> Result<()>
    where
        P: FrameProcessor + 'static,
    {
        if self.state == PipelineState::Disposed {
            return Err(Error::PipelineNotReady(self.state));
        }
        self.processors.push(Box::new(processor));
        Ok(())
    }

    /// Release every model and processor. Terminal and idempotent.
    pub fn dispose(&mut self) {
        if self.state == PipelineState::Disposed {
            return;
        }
        self.state = PipelineState::Disposed;
        self.active = None;
        self.processors.clear();
        self.detectors.clear();
        self.store.dispose();
        info!(
            "pipeline: disposed after {} frames ({} skipped)",
            self.stats.frames_processed, self.stats.frames_skipped
        );
    }
}

impl Drop for DetectionPipeline {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::MotionDetector;
    use std::sync::Mutex;

    fn motion_pipeline() -> DetectionPipeline {
        let mut catalog = ModelCatalog::new();
        catalog.register_detector("motion", || {
            Ok(Box::new(MotionDetector::new()) as Box<dyn ObjectDetector>)
        });
        DetectionPipeline::new(catalog, Arc::new(ModelStore::new()))
    }

    #[test]
    fn idle_pipeline_rejects_frames() {
        let mut pipeline = motion_pipeline();
        let err = pipeline
            .process_frame(&Frame::filled(8, 8, [0, 0, 0]))
            .unwrap_err();
        assert!(matches!(err, Error::PipelineNotReady(PipelineState::Idle)));
    }

    #[test]
    fn unknown_model_keeps_pipeline_idle() {
        let mut pipeline = motion_pipeline();
        assert!(matches!(
            pipeline.set_model("nope"),
            Err(Error::UnknownModel(_))
        ));
        assert_eq!(pipeline.state(), PipelineState::Idle);
    }

    #[test]
    fn detector_reports_reach_processors() {
        let mut pipeline = motion_pipeline();
        pipeline.set_model("motion").unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        pipeline
            .register_frame_processor(move |report: &FrameReport| -> anyhow::Result<()> {
                sink.lock().unwrap().push(report.clone());
                Ok(())
            })
            .unwrap();

        pipeline
            .process_frame(&Frame::filled(8, 8, [0, 0, 0]).with_index(1))
            .unwrap();
        pipeline
            .process_frame(&Frame::filled(8, 8, [200, 0, 0]).with_index(2))
            .unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0].result, FrameResult::Detections(Vec::new()));
        match &seen[1].result {
            FrameResult::Detections(records) => assert_eq!(records.len(), 1),
            other => panic!("unexpected result {other:?}"),
        }
        assert_eq!(seen[1].frame_index, 2);
    }

    #[test]
    fn failing_detector_frame_is_skipped() {
        struct Broken;
        impl ObjectDetector for Broken {
            fn name(&self) -> &'static str {
                "broken"
            }
            fn detect(&mut self, _frame: &Frame) -> anyhow::Result<Vec<DetectionRecord>> {
                Err(anyhow::anyhow!("sensor glitch"))
            }
        }

        let mut catalog = ModelCatalog::new();
        catalog.register_detector("broken", || Ok(Box::new(Broken) as Box<dyn ObjectDetector>));
        let mut pipeline = DetectionPipeline::new(catalog, Arc::new(ModelStore::new()));
        pipeline.set_model("broken").unwrap();

        let outcome = pipeline
            .process_frame(&Frame::filled(2, 2, [0, 0, 0]))
            .unwrap();
        assert!(matches!(outcome, FrameOutcome::Skipped(Error::Detector { .. })));
        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert_eq!(pipeline.stats().frames_skipped, 1);
    }

    #[test]
    fn dispose_is_terminal() {
        let mut pipeline = motion_pipeline();
        pipeline.set_model("motion").unwrap();
        pipeline.dispose();
        pipeline.dispose();
        assert_eq!(pipeline.state(), PipelineState::Disposed);
        assert!(matches!(
            pipeline.set_model("motion"),
            Err(Error::PipelineNotReady(PipelineState::Disposed))
        ));
        assert!(pipeline
            .register_frame_processor(|_: &FrameReport| -> anyhow::Result<()> { Ok(()) })
            .is_err());
        assert!(matches!(
            pipeline.process_frame(&Frame::filled(2, 2, [0, 0, 0])),
            Err(Error::PipelineNotReady(PipelineState::Disposed))
        ));
    }

    #[test]
    fn channel_processor_forwards_reports() {
        let mut pipeline = motion_pipeline();
        pipeline.set_model("motion").unwrap();
        let (processor, reports) = channel();
        pipeline.register_frame_processor(processor).unwrap();
        pipeline
            .process_frame(&Frame::filled(2, 2, [0, 0, 0]).with_index(9))
            .unwrap();
        assert_eq!(reports.try_recv().unwrap().frame_index, 9);
    }
}
