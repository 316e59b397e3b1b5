use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Result};
use log::warn;

use super::backend::ObjectDetector;
use super::backends::MotionDetector;
use crate::config::{ModelEntry, ModelKind, PipelineConfig};
use crate::error::ModelLoadError;
use crate::model::ModelArtifacts;

/// Builds a fresh detector instance on first use.
pub type DetectorFactory = Box<dyn Fn() -> Result<Box<dyn ObjectDetector>> + Send + Sync>;

/// Where a regression model's artifacts come from.
#[derive(Clone, Debug)]
pub enum ArtifactLocation {
    Directory(PathBuf),
    InMemory(ModelArtifacts),
}

impl ArtifactLocation {
    pub fn artifacts(&self) -> Result<ModelArtifacts, ModelLoadError> {
        match self {
            ArtifactLocation::Directory(dir) => ModelArtifacts::from_dir(dir),
            ArtifactLocation::InMemory(artifacts) => Ok(artifacts.clone()),
        }
    }
}

pub enum ModelSource {
    Regression(ArtifactLocation),
    Detector(DetectorFactory),
}

impl ModelSource {
    pub fn kind(&self) -> &'static str {
        match self {
            ModelSource::Regression(_) => "regression",
            ModelSource::Detector(_) => "detector",
        }
    }
}

impl fmt::Debug for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelSource::Regression(location) => {
                f.debug_tuple("Regression").field(location).finish()
            }
            ModelSource::Detector(_) => f.write_str("Detector(..)"),
        }
    }
}

/// Model ids known to a pipeline and how to initialize each one.
///
/// Nothing is loaded at registration time; the pipeline initializes a model
/// the first time it is selected.
#[derive(Debug, Default)]
pub struct ModelCatalog {
    sources: HashMap<String, ModelSource>,
    order: Vec<String>,
    default_id: Option<String>,
}

impl ModelCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, id: String, source: ModelSource) {
        if self.sources.insert(id.clone(), source).is_some() {
            warn!("model catalog: '{}' registered twice, keeping the latest", id);
        } else {
            self.order.push(id.clone());
        }
        if self.default_id.is_none() {
            self.default_id = Some(id);
        }
    }

    /// Register a coordinate-regression model. The first registered model
    /// becomes the default.
    pub fn register_regression(&mut self, id: impl Into<String>, location: ArtifactLocation) {
        self.insert(id.into(), ModelSource::Regression(location));
    }

    pub fn register_detector<F>(&mut self, id: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn ObjectDetector>> + Send + Sync + 'static,
    {
        self.insert(id.into(), ModelSource::Detector(Box::new(factory)));
    }

    pub fn set_default(&mut self, id: &str) -> Result<()> {
        if !self.sources.contains_key(id) {
            return Err(anyhow!("model '{}' not registered", id));
        }
        self.default_id = Some(id.to_string());
        Ok(())
    }

    pub fn default_id(&self) -> Option<&str> {
        self.default_id.as_deref()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ModelSource> {
        self.sources.get(id)
    }

    /// Registered ids, in registration order.
    pub fn list(&self) -> Vec<String> {
        self.order.clone()
    }

    /// Build a catalog from the `models` section of the configuration.
    pub fn from_config(config: &PipelineConfig) -> Result<Self> {
        let mut catalog = Self::new();
        for entry in &config.models {
            catalog.register_entry(entry)?;
        }
        catalog.set_default(&config.default_model)?;
        Ok(catalog)
    }

    fn register_entry(&mut self, entry: &ModelEntry) -> Result<()> {
        match entry.kind {
            ModelKind::Regression => {
                let Some(path) = &entry.path else {
                    bail!("regression model '{}' needs a path", entry.id);
                };
                self.register_regression(entry.id.clone(), ArtifactLocation::Directory(path.clone()));
            }
            ModelKind::Motion => {
                self.register_detector(entry.id.clone(), || {
                    Ok(Box::new(MotionDetector::new()) as Box<dyn ObjectDetector>)
                });
            }
            ModelKind::Onnx => self.register_onnx(entry)?,
        }
        Ok(())
    }

    #[cfg(feature = "backend-tract")]
    fn register_onnx(&mut self, entry: &ModelEntry) -> Result<()> {
        use super::backends::TractDetector;

        let Some(path) = entry.path.clone() else {
            bail!("onnx model '{}' needs a path", entry.id);
        };
        let labels = entry.labels.clone();
        let threshold = entry.score_threshold;
        let input_size = entry.input_size;
        self.register_detector(entry.id.clone(), move || {
            let detector = TractDetector::new(&path, input_size)?
                .with_labels(labels.clone())
                .with_threshold(threshold);
            Ok(Box::new(detector) as Box<dyn ObjectDetector>)
        });
        Ok(())
    }

    #[cfg(not(feature = "backend-tract"))]
    fn register_onnx(&mut self, entry: &ModelEntry) -> Result<()> {
        bail!(
            "model '{}' is an ONNX detector but this build lacks the backend-tract feature",
            entry.id
        )
    }
}
