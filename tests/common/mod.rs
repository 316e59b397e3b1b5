//! Tiny regression models with exactly known outputs.
//!
//! With the default zero kernels the network output is the activation of
//! the final bias regardless of the input frame.
#![allow(dead_code)]

use std::path::Path;

use loob_vision::{ModelArtifacts, WeightBlob, TOPOLOGY_FILE};
use tract_nnef::prelude::*;

pub const HIDDEN_UNITS: usize = 4;

pub struct TinyRegressor {
    pub units: usize,
    pub out_bias: Vec<f32>,
    /// `sigmoid`, `relu` or `linear`.
    pub activation: &'static str,
    pub input_side: usize,
    /// Value of every kernel entry.
    pub kernel_fill: f32,
}

impl Default for TinyRegressor {
    fn default() -> Self {
        Self {
            units: 2,
            out_bias: vec![0.0, 0.0],
            activation: "sigmoid",
            input_side: 128,
            kernel_fill: 0.0,
        }
    }
}

impl TinyRegressor {
    pub fn with_bias(out_bias: [f32; 2]) -> Self {
        Self {
            out_bias: out_bias.to_vec(),
            ..Self::default()
        }
    }

    pub fn features(&self) -> usize {
        self.input_side * self.input_side * 3
    }

    /// flatten -> dense(4, relu) -> dense(units, activation)
    pub fn graph(&self) -> String {
        let side = self.input_side;
        let features = self.features();
        let units = self.units;
        let head = if self.activation == "linear" {
            "    output = add(out_product, out_bias);\n".to_string()
        } else {
            format!(
                "    logits = add(out_product, out_bias);\n    output = {}(logits);\n",
                self.activation
            )
        };
        format!(
            "version 1.0;\n\
             \n\
             graph tiny_regressor(input) -> (output)\n\
             {{\n\
             \x20   input = external<scalar>(shape = [1, {side}, {side}, 3]);\n\
             \x20   hidden_kernel = variable<scalar>(label = \"hidden_kernel\", shape = [{features}, {HIDDEN_UNITS}]);\n\
             \x20   hidden_bias = variable<scalar>(label = \"hidden_bias\", shape = [1, {HIDDEN_UNITS}]);\n\
             \x20   out_kernel = variable<scalar>(label = \"out_kernel\", shape = [{HIDDEN_UNITS}, {units}]);\n\
             \x20   out_bias = variable<scalar>(label = \"out_bias\", shape = [1, {units}]);\n\
             \x20   flat = reshape(input, shape = [1, {features}]);\n\
             \x20   hidden_product = matmul(flat, hidden_kernel);\n\
             \x20   hidden_sum = add(hidden_product, hidden_bias);\n\
             \x20   hidden = relu(hidden_sum);\n\
             \x20   out_product = matmul(hidden, out_kernel);\n\
             {head}\
             }}\n"
        )
    }

    pub fn artifacts(&self) -> ModelArtifacts {
        let mut bias = self.out_bias.clone();
        bias.resize(self.units, 0.0);
        let features = self.features();
        let weights = vec![
            blob("hidden_kernel", &[features, HIDDEN_UNITS], &vec![self.kernel_fill; features * HIDDEN_UNITS]),
            blob("hidden_bias", &[1, HIDDEN_UNITS], &[0.0; HIDDEN_UNITS]),
            blob("out_kernel", &[HIDDEN_UNITS, self.units], &vec![self.kernel_fill; HIDDEN_UNITS * self.units]),
            blob("out_bias", &[1, self.units], &bias),
        ];
        ModelArtifacts::new(self.graph().into_bytes(), weights)
    }
}

/// An NNEF `.dat` file holding `values` with `shape`.
pub fn dat(shape: &[usize], values: &[f32]) -> Vec<u8> {
    let tensor = Tensor::from_shape(shape, values).expect("tensor shape");
    let mut bytes = Vec::new();
    tract_nnef::tensors::write_tensor(&mut bytes, &tensor).expect("write tensor");
    bytes
}

fn blob(label: &str, shape: &[usize], values: &[f32]) -> WeightBlob {
    WeightBlob::new(format!("{label}.dat"), dat(shape, values))
}

pub fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

/// Write `artifacts` the way a model directory looks on disk.
pub fn write_model_dir(dir: &Path, artifacts: &ModelArtifacts) {
    std::fs::create_dir_all(dir).expect("create model dir");
    if let Some(topology) = &artifacts.topology {
        std::fs::write(dir.join(TOPOLOGY_FILE), topology).expect("write graph");
    }
    for blob in &artifacts.weights {
        std::fs::write(dir.join(&blob.name), &blob.bytes).expect("write tensor file");
    }
}
