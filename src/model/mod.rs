//! Coordinate-regression model: artifacts, topology, weights and inference.
//!
//! A model is an NNEF graph (`graph.nnef`) plus one `<label>.dat` tensor
//! file per `variable` the graph declares. `RegressionModel::build` checks
//! both against each other, compiles the graph with tract and validates the
//! input and output facts before anything is exposed, so a model value that
//! exists is always runnable.

mod artifacts;
mod network;
mod topology;
mod weights;

pub use artifacts::{ModelArtifacts, WeightBlob, TOPOLOGY_FILE, WEIGHT_EXTENSION};
pub use network::{ModelInfo, RegressionModel};
pub use topology::VariableDecl;

/// Side of the square model input, in pixels.
pub const INPUT_SIZE: usize = 128;

/// Width of the model output: one normalized (x, y) pair.
pub const OUTPUT_UNITS: usize = 2;

/// A tensor shape as reported by the compiled graph; `None` is a symbolic
/// (batch) dimension.
pub type Dims = Vec<Option<usize>>;

/// Render dims the way error messages and reports show them: `[null, 2]`.
pub fn format_dims(dims: &[Option<usize>]) -> String {
    let parts: Vec<String> = dims
        .iter()
        .map(|d| d.map_or_else(|| "null".to_string(), |v| v.to_string()))
        .collect();
    format!("[{}]", parts.join(", "))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dims_render_unbound_as_null() {
        assert_eq!(format_dims(&[None, Some(128), Some(3)]), "[null, 128, 3]");
        assert_eq!(format_dims(&[]), "[]");
    }
}
