//! Matching `.dat` tensor files to the variables a graph declares.

use std::collections::HashMap;

use log::warn;
use tract_nnef::prelude::*;

use super::artifacts::WeightBlob;
use super::topology::VariableDecl;
use crate::error::ModelLoadError;

/// The blobs a graph actually uses, in declaration order.
#[derive(Debug)]
pub(crate) struct BoundWeights<'a> {
    pub blobs: Vec<(&'a VariableDecl, &'a WeightBlob)>,
    pub parameter_count: usize,
}

/// Pair every declared variable with its blob and check the blob holds a
/// float32 tensor of exactly the declared shape.
pub(crate) fn bind<'a>(
    variables: &'a [VariableDecl],
    blobs: &'a [WeightBlob],
) -> Result<BoundWeights<'a>, ModelLoadError> {
    let mut by_label: HashMap<&str, &WeightBlob> = HashMap::with_capacity(blobs.len());
    for blob in blobs {
        if by_label.insert(blob.label(), blob).is_some() {
            return Err(ModelLoadError::CorruptWeights(format!(
                "more than one blob provides '{}'",
                blob.label()
            )));
        }
    }

    let mut bound = Vec::with_capacity(variables.len());
    let mut parameter_count = 0usize;
    for variable in variables {
        let blob = by_label.remove(variable.label.as_str()).ok_or_else(|| {
            ModelLoadError::MissingWeights(format!(
                "variable '{}' has no '{}.dat' blob",
                variable.label, variable.label
            ))
        })?;
        check_blob(variable, blob)?;
        parameter_count = parameter_count
            .checked_add(variable.element_count().unwrap_or(usize::MAX))
            .ok_or_else(|| {
                ModelLoadError::CorruptTopology("parameter count overflows".to_string())
            })?;
        bound.push((variable, blob));
    }

    let mut unused: Vec<_> = by_label.into_keys().collect();
    unused.sort_unstable();
    for label in unused {
        warn!("weight blob '{}' is not referenced by the graph", label);
    }

    Ok(BoundWeights {
        blobs: bound,
        parameter_count,
    })
}

fn check_blob(variable: &VariableDecl, blob: &WeightBlob) -> Result<(), ModelLoadError> {
    // Size first: the header is only trusted once the byte count matches
    // what the declared shape needs.
    let expected = variable.dat_len().ok_or_else(|| {
        ModelLoadError::CorruptTopology(format!("variable '{}' is too large", variable.label))
    })?;
    if blob.bytes.len() != expected {
        return Err(ModelLoadError::CorruptWeights(format!(
            "'{}' holds {} bytes, shape {:?} as float32 needs {}",
            blob.name,
            blob.bytes.len(),
            variable.shape,
            expected
        )));
    }

    let mut reader: &[u8] = &blob.bytes;
    let tensor = tract_nnef::tensors::read_tensor(&mut reader)
        .map_err(|e| ModelLoadError::CorruptWeights(format!("'{}': {:#}", blob.name, e)))?;
    if tensor.datum_type() != f32::datum_type() {
        return Err(ModelLoadError::CorruptWeights(format!(
            "'{}' holds {:?} values, expected f32",
            blob.name,
            tensor.datum_type()
        )));
    }
    if tensor.shape() != variable.shape.as_slice() {
        return Err(ModelLoadError::CorruptWeights(format!(
            "'{}' has shape {:?}, graph declares {:?}",
            blob.name,
            tensor.shape(),
            variable.shape
        )));
    }
    Ok(())
}
