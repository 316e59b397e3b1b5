//! Frame -> tensor conversion.
//!
//! Every frame is resized to the model's 128x128 input with ONE interpolation
//! setting per preprocessor, scaled from [0, 255] to [0.0, 1.0] and given a
//! batch dimension of 1. The resulting `InputTensor` is NHWC.

use std::fmt;
use std::str::FromStr;

use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};
use serde::{Deserialize, Serialize};
use tract_nnef::prelude::tract_ndarray::{Array4, ArrayView4};

use crate::error::{Error, Result};
use crate::frame::{Frame, RGB_CHANNELS};
use crate::model::INPUT_SIZE;

/// Resize strategy for the 128x128 step.
///
/// `Bilinear` maps to the `image` crate's triangle (tent) filter, `Nearest`
/// to its nearest-neighbor filter. The two give numerically different tensors
/// for the same frame, so a deployment picks one and keeps it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Interpolation {
    #[default]
    Bilinear,
    Nearest,
}

impl Interpolation {
    fn filter(self) -> FilterType {
        match self {
            Interpolation::Bilinear => FilterType::Triangle,
            Interpolation::Nearest => FilterType::Nearest,
        }
    }
}

impl FromStr for Interpolation {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "bilinear" => Ok(Interpolation::Bilinear),
            "nearest" => Ok(Interpolation::Nearest),
            other => Err(format!(
                "unknown interpolation '{}' (expected bilinear or nearest)",
                other
            )),
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interpolation::Bilinear => write!(f, "bilinear"),
            Interpolation::Nearest => write!(f, "nearest"),
        }
    }
}

/// Normalized model input, shape `[1, 128, 128, 3]`, values in [0.0, 1.0].
///
/// Not `Clone`: the holder owns the buffer until it hands it to
/// `Predictor::predict`, which consumes it.
///
/// ```compile_fail
/// use std::sync::Arc;
/// use loob_vision::{InputTensor, ModelStore, Predictor};
///
/// let predictor = Predictor::new(Arc::new(ModelStore::new()));
/// let tensor = InputTensor::zeros();
/// let _ = predictor.predict(tensor);
/// let _ = tensor.shape();
/// ```
#[derive(Debug)]
pub struct InputTensor {
    data: Array4<f32>,
}

impl InputTensor {
    pub const SHAPE: [usize; 4] = [1, INPUT_SIZE, INPUT_SIZE, RGB_CHANNELS];

    /// All-zero tensor, used for warm-up.
    pub fn zeros() -> Self {
        Self {
            data: Array4::zeros((1, INPUT_SIZE, INPUT_SIZE, RGB_CHANNELS)),
        }
    }

    /// Wrap an existing array. The shape must be exactly `[1, 128, 128, 3]`.
    pub fn from_array(data: Array4<f32>) -> Result<Self> {
        if data.shape() != Self::SHAPE {
            return Err(Error::InvalidFrame(format!(
                "tensor shape {:?} does not match {:?}",
                data.shape(),
                Self::SHAPE
            )));
        }
        Ok(Self { data })
    }

    pub fn shape(&self) -> [usize; 4] {
        let (n, h, w, c) = self.data.dim();
        [n, h, w, c]
    }

    pub fn view(&self) -> ArrayView4<'_, f32> {
        self.data.view()
    }

    pub(crate) fn into_array(self) -> Array4<f32> {
        self.data
    }
}

/// Deterministic frame -> tensor conversion.
#[derive(Clone, Copy, Debug, Default)]
pub struct Preprocessor {
    interpolation: Interpolation,
}

impl Preprocessor {
    pub fn new(interpolation: Interpolation) -> Self {
        Self { interpolation }
    }

    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    pub fn preprocess(&self, frame: &Frame) -> Result<InputTensor> {
        if frame.is_empty() {
            return Err(Error::InvalidFrame(format!(
                "empty frame ({}x{}, {} bytes)",
                frame.width(),
                frame.height(),
                frame.pixels().len()
            )));
        }

        let source: ImageBuffer<Rgb<u8>, &[u8]> =
            ImageBuffer::from_raw(frame.width(), frame.height(), frame.pixels())
                .ok_or_else(|| Error::InvalidFrame("pixel buffer too small".to_string()))?;

        let side = INPUT_SIZE as u32;
        let resized = if source.dimensions() == (side, side) {
            ImageBuffer::from_raw(side, side, frame.pixels().to_vec())
                .ok_or_else(|| Error::InvalidFrame("pixel buffer too small".to_string()))?
        } else {
            imageops::resize(&source, side, side, self.interpolation.filter())
        };

        let values: Vec<f32> = resized
            .into_raw()
            .into_iter()
            .map(|v| v as f32 / 255.0)
            .collect();
        let data = Array4::from_shape_vec((1, INPUT_SIZE, INPUT_SIZE, RGB_CHANNELS), values)
            .map_err(|e| Error::InvalidFrame(format!("resize produced a bad buffer: {}", e)))?;

        Ok(InputTensor { data })
    }
}
