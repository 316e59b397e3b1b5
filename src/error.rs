//! Error taxonomy for the detection core.
//!
//! Load-time failures are `ModelLoadError` and never leave the model store
//! half-initialized. Everything that can happen while frames flow is an
//! `Error`; `Error::is_frame_local` separates transient per-frame misses from
//! states that need a corrective action (load or select a model).

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::PipelineState;

/// Which shape check failed during model load.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeRole {
    Input,
    Output,
}

impl fmt::Display for ShapeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShapeRole::Input => write!(f, "input"),
            ShapeRole::Output => write!(f, "output"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("missing topology")]
    MissingTopology,
    #[error("missing weights: {0}")]
    MissingWeights(String),
    #[error("corrupt topology: {0}")]
    CorruptTopology(String),
    #[error("corrupt weights: {0}")]
    CorruptWeights(String),
    #[error("shape mismatch on {role}: expected {expected}, got {actual}")]
    ShapeMismatch {
        role: ShapeRole,
        expected: String,
        actual: String,
    },
    #[error("failed to read model artifact {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("model load failed: {0}")]
    ModelLoad(#[from] ModelLoadError),
    #[error("no model loaded")]
    NoModelLoaded,
    #[error("invalid frame: {0}")]
    InvalidFrame(String),
    #[error("invalid output shape: expected 2 values, got {0}")]
    InvalidOutputShape(usize),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("model produced a non-finite output ({x}, {y})")]
    NonFiniteOutput { x: f32, y: f32 },
    #[error("pipeline not ready (state: {0:?})")]
    PipelineNotReady(PipelineState),
    #[error("unknown model '{0}'")]
    UnknownModel(String),
    #[error("detector '{model}' failed: {source}")]
    Detector {
        model: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    /// True for failures confined to a single frame; the next frame may succeed.
    pub fn is_frame_local(&self) -> bool {
        matches!(
            self,
            Error::InvalidFrame(_)
                | Error::InvalidOutputShape(_)
                | Error::Inference(_)
                | Error::NonFiniteOutput { .. }
                | Error::Detector { .. }
        )
    }

    pub(crate) fn detector(model: &str, err: anyhow::Error) -> Self {
        Error::Detector {
            model: model.to_string(),
            source: err.into(),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
