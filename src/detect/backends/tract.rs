#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgb};
use tract_onnx::prelude::*;

use crate::detect::backend::ObjectDetector;
use crate::detect::result::{BoundingBox, DetectionRecord, DetectionType};
use crate::frame::Frame;

/// Values per output row: x_min, y_min, x_max, y_max, score, class.
const ROW_WIDTH: usize = 6;

/// Pretrained SSD-style detector run through tract.
///
/// The model takes a `[1, 3, S, S]` float input in [0, 1] and returns rows of
/// normalized boxes with a score and a class id.
pub struct TractDetector {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    labels: Vec<String>,
    score_threshold: f32,
}

impl TractDetector {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(model_path: P, input_size: u32) -> Result<Self> {
        let model_path = model_path.as_ref();
        let side = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, side, side)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            labels: Vec::new(),
            score_threshold: 0.5,
        })
    }

    pub fn with_labels(mut self, labels: Vec<String>) -> Self {
        self.labels = labels;
        self
    }

    /// Override the default score threshold (0.5).
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.score_threshold = threshold;
        self
    }

    fn build_input(&self, frame: &Frame) -> Result<Tensor> {
        let source: ImageBuffer<Rgb<u8>, &[u8]> =
            ImageBuffer::from_raw(frame.width(), frame.height(), frame.pixels())
                .ok_or_else(|| anyhow!("frame buffer does not match its dimensions"))?;
        let resized = imageops::resize(&source, self.input_size, self.input_size, FilterType::Triangle);

        let side = self.input_size as usize;
        let input = tract_ndarray::Array4::from_shape_fn((1, 3, side, side), |(_, c, y, x)| {
            resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0
        });
        Ok(input.into_tensor())
    }

    fn label(&self, class: f32) -> String {
        let index = class.round().max(0.0) as usize;
        self.labels
            .get(index)
            .cloned()
            .unwrap_or_else(|| format!("class_{}", index))
    }

    fn decode(&self, outputs: TVec<TValue>, captured_at_ms: u64) -> Result<Vec<DetectionRecord>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let values: Vec<f32> = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .iter()
            .copied()
            .collect();
        if values.len() % ROW_WIDTH != 0 {
            return Err(anyhow!(
                "model output has {} values, not a multiple of {}",
                values.len(),
                ROW_WIDTH
            ));
        }

        Ok(values
            .chunks_exact(ROW_WIDTH)
            .filter(|row| row[4].is_finite() && row[4] >= self.score_threshold)
            .map(|row| DetectionRecord {
                bbox: BoundingBox::from_corners(row[0], row[1], row[2], row[3]),
                score: row[4].min(1.0),
                label: self.label(row[5]),
                kind: DetectionType::Object,
                captured_at_ms,
            })
            .collect())
    }
}

impl ObjectDetector for TractDetector {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<DetectionRecord>> {
        if frame.is_empty() {
            return Err(anyhow!("empty frame"));
        }
        let input = self.build_input(frame)?;
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, frame.captured_at_ms)
    }

    fn warm_up(&mut self) -> Result<()> {
        let side = self.input_size;
        self.detect(&Frame::filled(side, side, [0, 0, 0])).map(|_| ())
    }
}
