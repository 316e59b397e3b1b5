//! Model store: the one loaded coordinate-regression network.
//!
//! The store owns a single slot. `load` builds and warms up the new model
//! completely before swapping it into the slot, so callers only ever observe
//! the previous model or the new one, never a partial load.

use std::sync::{Arc, Mutex, MutexGuard};

use log::info;

use crate::error::{Error, Result};
use crate::model::{ModelArtifacts, ModelInfo, RegressionModel};
use crate::preprocess::InputTensor;

#[derive(Debug, Default)]
pub struct ModelStore {
    slot: Mutex<Option<Arc<RegressionModel>>>,
}

impl ModelStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<RegressionModel>>> {
        // A panic while holding the lock cannot leave a half-written slot:
        // the slot is only ever assigned a fully built model.
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Build, validate and warm up a model, then make it the loaded one.
    ///
    /// The warm-up runs the model once on a zero tensor; a model that cannot
    /// produce two finite values there is refused. On error the store keeps
    /// whatever it held before.
    pub fn load(&self, id: &str, artifacts: &ModelArtifacts) -> Result<Arc<RegressionModel>> {
        let model = RegressionModel::build(id, artifacts)?;

        // Warm-up pass. The values are discarded once checked.
        let warm = model.forward(InputTensor::zeros())?;
        match warm.as_slice() {
            [x, y] if x.is_finite() && y.is_finite() => {}
            [x, y] => return Err(Error::NonFiniteOutput { x: *x, y: *y }),
            other => return Err(Error::InvalidOutputShape(other.len())),
        }
        drop(warm);

        let model = Arc::new(model);
        let previous = self.slot().replace(Arc::clone(&model));
        let info = model.info();
        info!(
            "model store: loaded '{}' ({} parameters, {} bytes, sha256 {})",
            info.id, info.parameter_count, info.resident_bytes, info.fingerprint
        );
        if let Some(previous) = previous {
            info!("model store: replaced '{}'", previous.id());
        }
        Ok(model)
    }

    /// The loaded model, or `NoModelLoaded`.
    pub fn get(&self) -> Result<Arc<RegressionModel>> {
        self.slot().clone().ok_or(Error::NoModelLoaded)
    }

    /// Release the loaded model. A no-op when nothing is loaded.
    ///
    /// Handles already returned by `get` stay valid until they are dropped.
    pub fn dispose(&self) {
        if let Some(model) = self.slot().take() {
            info!("model store: disposed '{}'", model.id());
        }
    }

    pub fn loaded_id(&self) -> Option<String> {
        self.slot().as_ref().map(|m| m.id().to_string())
    }

    pub fn info(&self) -> Option<ModelInfo> {
        self.slot().as_ref().map(|m| m.info().clone())
    }

    /// Bytes held by the loaded model's parameters; 0 when empty.
    pub fn resident_bytes(&self) -> usize {
        self.slot()
            .as_ref()
            .map_or(0, |m| m.info().resident_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ModelLoadError;

    #[test]
    fn empty_store_has_no_model() {
        let store = ModelStore::new();
        assert!(matches!(store.get(), Err(Error::NoModelLoaded)));
        assert_eq!(store.loaded_id(), None);
        assert_eq!(store.resident_bytes(), 0);
    }

    #[test]
    fn dispose_is_idempotent() {
        let store = ModelStore::new();
        store.dispose();
        store.dispose();
        assert!(matches!(store.get(), Err(Error::NoModelLoaded)));
    }

    #[test]
    fn missing_topology_leaves_store_empty() {
        let store = ModelStore::new();
        let err = store.load("m", &ModelArtifacts::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::ModelLoad(ModelLoadError::MissingTopology)
        ));
        assert!(store.info().is_none());
    }
}
