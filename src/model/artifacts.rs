//! Raw model artifacts as handed to the model store.

use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::ModelLoadError;

/// File name of the graph descriptor inside a model directory.
pub const TOPOLOGY_FILE: &str = "graph.nnef";

/// Extension of the tensor files holding variable values.
pub const WEIGHT_EXTENSION: &str = "dat";

/// One tensor file, named by its path relative to the model directory
/// (`conv1/kernel.dat`). The name without the extension is the variable
/// label it provides.
#[derive(Clone, Debug)]
pub struct WeightBlob {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl WeightBlob {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }

    /// The variable label this blob provides.
    pub fn label(&self) -> &str {
        let name = self.name.trim_start_matches("./");
        name.strip_suffix(".dat").unwrap_or(name)
    }
}

/// Graph bytes plus tensor files. Either part may be absent; the store
/// reports which one when it refuses to load.
#[derive(Clone, Debug, Default)]
pub struct ModelArtifacts {
    pub topology: Option<Vec<u8>>,
    pub weights: Vec<WeightBlob>,
}

impl ModelArtifacts {
    pub fn new(topology: Vec<u8>, weights: Vec<WeightBlob>) -> Self {
        Self {
            topology: Some(topology),
            weights,
        }
    }

    /// Read `graph.nnef` and every `*.dat` file below `dir`.
    ///
    /// A missing `graph.nnef` leaves `topology` empty instead of failing, so
    /// the load reports `MissingTopology`.
    pub fn from_dir(dir: &Path) -> Result<Self, ModelLoadError> {
        let topology_path = dir.join(TOPOLOGY_FILE);
        let topology = match fs::read(&topology_path) {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(io_error(&topology_path, e)),
        };

        let mut paths = Vec::new();
        collect_weight_files(dir, &mut paths)?;
        paths.sort();

        let mut weights = Vec::with_capacity(paths.len());
        for path in paths {
            let bytes = fs::read(&path).map_err(|e| io_error(&path, e))?;
            let name = path
                .strip_prefix(dir)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            weights.push(WeightBlob::new(name, bytes));
        }

        Ok(Self { topology, weights })
    }

    /// SHA-256 over the topology and every tensor file, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        if let Some(topology) = &self.topology {
            hasher.update(topology);
        }
        for blob in &self.weights {
            hasher.update(blob.name.as_bytes());
            hasher.update(&blob.bytes);
        }
        hex::encode(hasher.finalize())
    }
}

pub(crate) fn io_error(path: &Path, source: io::Error) -> ModelLoadError {
    ModelLoadError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn collect_weight_files(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<(), ModelLoadError> {
    for entry in fs::read_dir(dir).map_err(|e| io_error(dir, e))? {
        let path = entry.map_err(|e| io_error(dir, e))?.path();
        if path.is_dir() {
            collect_weight_files(&path, out)?;
        } else if path.extension().is_some_and(|ext| ext == WEIGHT_EXTENSION) {
            out.push(path);
        }
    }
    Ok(())
}
