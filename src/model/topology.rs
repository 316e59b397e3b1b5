//! Static checks on an NNEF graph descriptor before it reaches tract.
//!
//! Only what the loader needs is read here: the graph name and every
//! `variable` declaration with its label and shape. Everything else is left
//! to the NNEF parser.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::ModelLoadError;

/// Bytes in the fixed header of an NNEF tensor file.
pub(crate) const DAT_HEADER_BYTES: usize = 128;

/// A `variable` declared by the graph.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VariableDecl {
    pub label: String,
    pub shape: Vec<usize>,
}

impl VariableDecl {
    /// Element count, or `None` when the shape overflows.
    pub fn element_count(&self) -> Option<usize> {
        self.shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
    }

    /// Exact size of the `.dat` file holding this variable as float32.
    pub(crate) fn dat_len(&self) -> Option<usize> {
        self.element_count()?
            .checked_mul(std::mem::size_of::<f32>())?
            .checked_add(DAT_HEADER_BYTES)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct GraphSummary {
    pub name: String,
    pub variables: Vec<VariableDecl>,
}

fn version_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*version\s+\d+\.\d+\s*;").unwrap())
}

fn graph_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bgraph\s+([A-Za-z_][A-Za-z0-9_]*)\s*\(").unwrap())
}

fn variable_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\bvariable\s*(?:<\s*([A-Za-z_]+)\s*>)?\s*\(([^)]*)\)").unwrap()
    })
}

fn label_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"\blabel\s*=\s*["']([^"']*)["']"#).unwrap())
}

fn shape_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\bshape\s*=\s*\[([^\]]*)\]").unwrap())
}

fn strip_comments(text: &str) -> String {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn parse(bytes: &[u8]) -> Result<GraphSummary, ModelLoadError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| ModelLoadError::CorruptTopology(format!("graph is not UTF-8: {}", e)))?;
    let text = strip_comments(text);

    if !version_re().is_match(&text) {
        return Err(ModelLoadError::CorruptTopology(
            "missing `version` statement".to_string(),
        ));
    }
    let name = graph_re()
        .captures(&text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| ModelLoadError::CorruptTopology("missing `graph` declaration".to_string()))?;

    let mut variables: Vec<VariableDecl> = Vec::new();
    for caps in variable_re().captures_iter(&text) {
        if let Some(kind) = caps.get(1) {
            if kind.as_str() != "scalar" {
                return Err(ModelLoadError::CorruptTopology(format!(
                    "unsupported variable type <{}>",
                    kind.as_str()
                )));
            }
        }
        let args = caps.get(2).map_or("", |m| m.as_str());
        let variable = parse_variable(args)?;
        if variables.iter().any(|v| v.label == variable.label) {
            return Err(ModelLoadError::CorruptTopology(format!(
                "variable label '{}' is declared twice",
                variable.label
            )));
        }
        variables.push(variable);
    }

    Ok(GraphSummary { name, variables })
}

fn parse_variable(args: &str) -> Result<VariableDecl, ModelLoadError> {
    let label = label_re()
        .captures(args)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| {
            ModelLoadError::CorruptTopology(format!("variable without a label: ({})", args.trim()))
        })?;
    check_label(&label)?;

    let dims = shape_re()
        .captures(args)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| {
            ModelLoadError::CorruptTopology(format!("variable '{}' has no shape", label))
        })?;
    let shape = dims
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| {
            d.parse::<usize>().map_err(|_| {
                ModelLoadError::CorruptTopology(format!(
                    "variable '{}' has an invalid dimension '{}'",
                    label, d
                ))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let variable = VariableDecl { label, shape };
    if variable.dat_len().is_none() {
        return Err(ModelLoadError::CorruptTopology(format!(
            "variable '{}' shape {:?} is too large",
            variable.label, variable.shape
        )));
    }
    Ok(variable)
}

/// Labels become file paths under the model directory.
fn check_label(label: &str) -> Result<(), ModelLoadError> {
    let bad = label.is_empty()
        || label.starts_with('/')
        || label.contains('\\')
        || label.split('/').any(|part| part.is_empty() || part == "." || part == "..");
    if bad {
        return Err(ModelLoadError::CorruptTopology(format!(
            "variable label '{}' is not a relative path",
            label
        )));
    }
    Ok(())
}
