//! Inference: tensor in, normalized (x, y) out.

use std::sync::Arc;

use log::{debug, warn};
use serde::Serialize;

use crate::error::{Error, Result};
use crate::frame::Frame;
use crate::model::RegressionModel;
use crate::preprocess::{InputTensor, Preprocessor};
use crate::store::ModelStore;

/// A point in normalized frame coordinates, both axes in [0, 1].
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct Prediction {
    pub x: f32,
    pub y: f32,
}

impl Prediction {
    /// Scale to pixel coordinates for a `width` x `height` frame.
    pub fn to_pixels(&self, width: u32, height: u32) -> (f32, f32) {
        (self.x * width as f32, self.y * height as f32)
    }
}

#[derive(Clone, Debug)]
pub struct Predictor {
    store: Arc<ModelStore>,
}

impl Predictor {
    pub fn new(store: Arc<ModelStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<ModelStore> {
        &self.store
    }

    /// Run the loaded model on `tensor`.
    ///
    /// The tensor is consumed; it and the raw output are dropped before this
    /// returns, whichever way it returns.
    pub fn predict(&self, tensor: InputTensor) -> Result<Prediction> {
        let model = self.store.get()?;
        run(&model, tensor)
    }

    /// Like `predict`, but only while the store still holds `model_id`.
    ///
    /// A store that was reloaded or disposed behind the caller's back yields
    /// `NoModelLoaded`, so a result is never attributed to the wrong model.
    pub fn predict_as(&self, model_id: &str, tensor: InputTensor) -> Result<Prediction> {
        let model = self.store.get()?;
        if model.id() != model_id {
            warn!(
                "predict: expected model '{}' but the store holds '{}'",
                model_id,
                model.id()
            );
            return Err(Error::NoModelLoaded);
        }
        run(&model, tensor)
    }

    pub fn predict_frame(&self, preprocessor: &Preprocessor, frame: &Frame) -> Result<Prediction> {
        let tensor = preprocessor.preprocess(frame)?;
        self.predict(tensor)
    }
}

fn run(model: &RegressionModel, tensor: InputTensor) -> Result<Prediction> {
    let output = model.forward(tensor)?;
    let (x, y) = match output.as_slice() {
        [x, y] => (*x, *y),
        other => return Err(Error::InvalidOutputShape(other.len())),
    };
    drop(output);
    if !x.is_finite() || !y.is_finite() {
        return Err(Error::NonFiniteOutput { x, y });
    }
    debug!("predict '{}': raw ({}, {})", model.id(), x, y);
    Ok(Prediction {
        x: x.clamp(0.0, 1.0),
        y: y.clamp(0.0, 1.0),
    })
}
