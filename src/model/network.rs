//! Validated, runnable regression network backed by tract.

use std::fs;
use std::panic::{catch_unwind, AssertUnwindSafe};

use log::debug;
use serde::Serialize;
use tract_nnef::internal::DimLike;
use tract_nnef::prelude::*;

use super::artifacts::{io_error, ModelArtifacts, TOPOLOGY_FILE};
use super::{format_dims, topology, weights, Dims, INPUT_SIZE, OUTPUT_UNITS};
use crate::error::{Error, ModelLoadError, Result, ShapeRole};
use crate::frame::RGB_CHANNELS;
use crate::preprocess::InputTensor;

/// Summary of a loaded model.
#[derive(Clone, Debug, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub fingerprint: String,
    pub node_count: usize,
    pub parameter_count: usize,
    pub resident_bytes: usize,
    pub input_shape: Dims,
    pub output_shape: Dims,
}

pub struct RegressionModel {
    info: ModelInfo,
    plan: TypedRunnableModel<TypedModel>,
}

impl std::fmt::Debug for RegressionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegressionModel")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl RegressionModel {
    /// Check, compile and validate `artifacts`. Nothing is returned unless
    /// the whole model checks out.
    pub fn build(id: &str, artifacts: &ModelArtifacts) -> Result<Self, ModelLoadError> {
        let topology_bytes = artifacts
            .topology
            .as_deref()
            .ok_or(ModelLoadError::MissingTopology)?;
        if artifacts.weights.is_empty() {
            return Err(ModelLoadError::MissingWeights(
                "no weight blobs supplied".to_string(),
            ));
        }

        let graph = topology::parse(topology_bytes)?;
        let bound = weights::bind(&graph.variables, &artifacts.weights)?;

        // tract reads NNEF from a directory, so the checked artifacts are
        // laid out in a scratch one that lives for the compile only.
        let scratch = tempfile::Builder::new()
            .prefix("loob-model-")
            .tempdir()
            .map_err(|e| io_error(&std::env::temp_dir(), e))?;
        let topology_path = scratch.path().join(TOPOLOGY_FILE);
        fs::write(&topology_path, topology_bytes).map_err(|e| io_error(&topology_path, e))?;
        for (variable, blob) in &bound.blobs {
            let path = scratch.path().join(format!("{}.dat", variable.label));
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
            }
            fs::write(&path, &blob.bytes).map_err(|e| io_error(&path, e))?;
        }

        let model = compile_step(|| tract_nnef::nnef().model_for_path(scratch.path()))?;
        let node_count = model.nodes().len();
        let (input_shape, output_shape) = check_facts(&model)?;
        let plan = compile_step(|| model.into_optimized()?.into_runnable())?;
        debug!(
            "model '{}': graph '{}' compiled ({} nodes, {} variables)",
            id,
            graph.name,
            node_count,
            bound.blobs.len()
        );

        let info = ModelInfo {
            id: id.to_string(),
            name: graph.name,
            fingerprint: artifacts.fingerprint(),
            node_count,
            parameter_count: bound.parameter_count,
            resident_bytes: bound.parameter_count.saturating_mul(std::mem::size_of::<f32>()),
            input_shape,
            output_shape,
        };
        Ok(Self { info, plan })
    }

    pub fn info(&self) -> &ModelInfo {
        &self.info
    }

    pub fn id(&self) -> &str {
        &self.info.id
    }

    /// Run the network on one NHWC input. Returns the output values in
    /// row-major order.
    pub fn forward(&self, input: InputTensor) -> Result<Vec<f32>> {
        let tensor: Tensor = input.into_array().into_tensor();
        let outputs = self
            .plan
            .run(tvec!(tensor.into()))
            .map_err(|e| Error::Inference(format!("{:#}", e)))?;
        let output = outputs
            .first()
            .ok_or_else(|| Error::Inference("model produced no outputs".to_string()))?;
        let values = output
            .to_array_view::<f32>()
            .map_err(|e| Error::Inference(format!("output is not f32: {:#}", e)))?
            .iter()
            .copied()
            .collect();
        Ok(values)
    }
}

/// Run one tract compile step. Errors and panics from a malformed graph
/// both come back as `CorruptTopology`.
fn compile_step<T>(step: impl FnOnce() -> TractResult<T>) -> Result<T, ModelLoadError> {
    match catch_unwind(AssertUnwindSafe(step)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(ModelLoadError::CorruptTopology(format!("{:#}", err))),
        Err(_) => Err(ModelLoadError::CorruptTopology(
            "graph compilation panicked".to_string(),
        )),
    }
}

fn fact_dims(fact: &TypedFact) -> Dims {
    fact.shape.iter().map(|d| d.to_usize().ok()).collect()
}

fn check_facts(model: &TypedModel) -> Result<(Dims, Dims), ModelLoadError> {
    if model.inputs.len() != 1 || model.outputs.len() != 1 {
        return Err(ModelLoadError::CorruptTopology(format!(
            "expected one input and one output, graph has {} and {}",
            model.inputs.len(),
            model.outputs.len()
        )));
    }
    let input = model
        .input_fact(0)
        .map_err(|e| ModelLoadError::CorruptTopology(format!("{:#}", e)))?;
    let output = model
        .output_fact(0)
        .map_err(|e| ModelLoadError::CorruptTopology(format!("{:#}", e)))?;
    if input.datum_type != f32::datum_type() {
        return Err(ModelLoadError::CorruptTopology(format!(
            "input is {:?}, expected f32",
            input.datum_type
        )));
    }

    let input_shape = fact_dims(input);
    let output_shape = fact_dims(output);
    let expected_input = [Some(INPUT_SIZE), Some(INPUT_SIZE), Some(RGB_CHANNELS)];
    if input_shape.len() != 4 || input_shape[1..] != expected_input {
        return Err(ModelLoadError::ShapeMismatch {
            role: ShapeRole::Input,
            expected: format!("[*, {}, {}, {}]", INPUT_SIZE, INPUT_SIZE, RGB_CHANNELS),
            actual: format_dims(&input_shape),
        });
    }
    if output_shape.len() != 2 || output_shape[1] != Some(OUTPUT_UNITS) {
        return Err(ModelLoadError::ShapeMismatch {
            role: ShapeRole::Output,
            expected: format!("[*, {}]", OUTPUT_UNITS),
            actual: format_dims(&output_shape),
        });
    }
    Ok((input_shape, output_shape))
}
