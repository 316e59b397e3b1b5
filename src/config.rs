use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::preprocess::Interpolation;

const DEFAULT_MODEL_ID: &str = "motion";
const DEFAULT_SOURCE_URI: &str = "stub://camera";
const DEFAULT_SOURCE_FPS: u32 = 10;
const DEFAULT_SOURCE_WIDTH: u32 = 640;
const DEFAULT_SOURCE_HEIGHT: u32 = 480;
const DEFAULT_SCORE_THRESHOLD: f32 = 0.5;
const DEFAULT_DETECTOR_INPUT: u32 = 300;

#[derive(Debug, Deserialize, Default)]
struct PipelineConfigFile {
    default_model: Option<String>,
    interpolation: Option<Interpolation>,
    max_frames: Option<u64>,
    models: Option<Vec<ModelEntryFile>>,
    source: Option<SourceConfigFile>,
}

#[derive(Debug, Deserialize)]
struct ModelEntryFile {
    id: String,
    kind: ModelKind,
    path: Option<PathBuf>,
    labels: Option<Vec<String>>,
    score_threshold: Option<f32>,
    input_size: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    uri: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    /// Coordinate-regression network loaded from a model directory.
    Regression,
    /// Built-in frame-difference detector.
    Motion,
    /// ONNX object detector (needs the `backend-tract` feature).
    Onnx,
}

#[derive(Debug, Clone)]
pub struct ModelEntry {
    pub id: String,
    pub kind: ModelKind,
    pub path: Option<PathBuf>,
    pub labels: Vec<String>,
    pub score_threshold: f32,
    pub input_size: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSettings {
    pub uri: String,
    pub target_fps: u32,
    pub width: u32,
    pub height: u32,
}

impl Default for SourceSettings {
    fn default() -> Self {
        Self {
            uri: DEFAULT_SOURCE_URI.to_string(),
            target_fps: DEFAULT_SOURCE_FPS,
            width: DEFAULT_SOURCE_WIDTH,
            height: DEFAULT_SOURCE_HEIGHT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub default_model: String,
    pub interpolation: Interpolation,
    pub max_frames: Option<u64>,
    pub models: Vec<ModelEntry>,
    pub source: SourceSettings,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL_ID.to_string(),
            interpolation: Interpolation::default(),
            max_frames: None,
            models: vec![ModelEntry {
                id: DEFAULT_MODEL_ID.to_string(),
                kind: ModelKind::Motion,
                path: None,
                labels: Vec::new(),
                score_threshold: DEFAULT_SCORE_THRESHOLD,
                input_size: DEFAULT_DETECTOR_INPUT,
            }],
            source: SourceSettings::default(),
        }
    }
}

impl PipelineConfig {
    /// Load from `LOOB_CONFIG` (if set), apply `LOOB_*` overrides, validate.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("LOOB_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) if !path.trim().is_empty() => Some(read_config_file(Path::new(path))?),
            _ => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default());
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: PipelineConfigFile) -> Self {
        let defaults = Self::default();
        let models = match file.models {
            Some(models) if !models.is_empty() => models
                .into_iter()
                .map(|entry| ModelEntry {
                    id: entry.id,
                    kind: entry.kind,
                    path: entry.path,
                    labels: entry.labels.unwrap_or_default(),
                    score_threshold: entry.score_threshold.unwrap_or(DEFAULT_SCORE_THRESHOLD),
                    input_size: entry.input_size.unwrap_or(DEFAULT_DETECTOR_INPUT),
                })
                .collect(),
            _ => defaults.models,
        };
        let default_model = file
            .default_model
            .or_else(|| models.first().map(|m| m.id.clone()))
            .unwrap_or(defaults.default_model);
        let source = file.source.unwrap_or_default();
        Self {
            default_model,
            interpolation: file.interpolation.unwrap_or(defaults.interpolation),
            max_frames: file.max_frames,
            models,
            source: SourceSettings {
                uri: source.uri.unwrap_or(defaults.source.uri),
                target_fps: source.target_fps.unwrap_or(defaults.source.target_fps),
                width: source.width.unwrap_or(defaults.source.width),
                height: source.height.unwrap_or(defaults.source.height),
            },
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(model) = std::env::var("LOOB_MODEL") {
            if !model.trim().is_empty() {
                self.default_model = model.trim().to_string();
            }
        }
        if let Ok(uri) = std::env::var("LOOB_SOURCE") {
            if !uri.trim().is_empty() {
                self.source.uri = uri;
            }
        }
        if let Ok(interpolation) = std::env::var("LOOB_INTERPOLATION") {
            self.interpolation = interpolation
                .parse()
                .map_err(|e: String| anyhow!("LOOB_INTERPOLATION: {}", e))?;
        }
        if let Ok(fps) = std::env::var("LOOB_TARGET_FPS") {
            self.source.target_fps = fps
                .trim()
                .parse()
                .map_err(|_| anyhow!("LOOB_TARGET_FPS must be a positive integer"))?;
        }
        if let Ok(frames) = std::env::var("LOOB_MAX_FRAMES") {
            let frames: u64 = frames
                .trim()
                .parse()
                .map_err(|_| anyhow!("LOOB_MAX_FRAMES must be an integer"))?;
            self.max_frames = Some(frames);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.models.is_empty() {
            return Err(anyhow!("at least one model must be configured"));
        }
        let mut seen = HashSet::new();
        for entry in &self.models {
            if entry.id.trim().is_empty() {
                return Err(anyhow!("model ids must not be empty"));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(anyhow!("model id '{}' is configured twice", entry.id));
            }
            if !(0.0..=1.0).contains(&entry.score_threshold) {
                return Err(anyhow!(
                    "model '{}': score_threshold must be within [0, 1]",
                    entry.id
                ));
            }
            if matches!(entry.kind, ModelKind::Regression | ModelKind::Onnx) && entry.path.is_none()
            {
                return Err(anyhow!("model '{}' needs a path", entry.id));
            }
        }
        if !seen.contains(self.default_model.as_str()) {
            return Err(anyhow!(
                "default model '{}' is not in the model list",
                self.default_model
            ));
        }
        if self.source.width == 0 || self.source.height == 0 {
            return Err(anyhow!("source width and height must be greater than zero"));
        }
        if self.source.target_fps == 0 {
            return Err(anyhow!("source target_fps must be greater than zero"));
        }
        Ok(())
    }

    pub fn model(&self, id: &str) -> Option<&ModelEntry> {
        self.models.iter().find(|m| m.id == id)
    }
}

fn read_config_file(path: &Path) -> Result<PipelineConfigFile> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let is_toml = path.extension().is_some_and(|ext| ext == "toml");
    let cfg = if is_toml {
        toml::from_str(&raw).with_context(|| format!("invalid config file {}", path.display()))?
    } else {
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config file {}", path.display()))?
    };
    Ok(cfg)
}
