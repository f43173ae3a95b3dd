use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use crate::model::matrix::{ElementKey, Matrix};

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub alias: Option<String>,
    pub included: bool,
    pub pixel_size: Option<f64>,
}

impl Sample {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            included: true,
            pixel_size: None,
        }
    }

    pub fn label(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

/// User actions on the sample table. Inclusion is never inferred.
#[derive(Debug, Clone, PartialEq)]
pub enum SampleCommand {
    Include(String),
    Exclude(String),
    SetAlias { sample: String, alias: String },
    ClearAlias(String),
    SetPixelSize { sample: String, pixel_size: f64 },
}

impl SampleCommand {
    fn target(&self) -> &str {
        match self {
            SampleCommand::Include(s)
            | SampleCommand::Exclude(s)
            | SampleCommand::ClearAlias(s) => s,
            SampleCommand::SetAlias { sample, .. } | SampleCommand::SetPixelSize { sample, .. } => {
                sample
            }
        }
    }
}

/// Samples ordered by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SampleSet {
    samples: Vec<Sample>,
}

impl SampleSet {
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let unique = names
            .into_iter()
            .map(Into::into)
            .collect::<BTreeSet<String>>();
        Self {
            samples: unique.into_iter().map(Sample::new).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Sample> {
        self.samples.iter().find(|s| s.name == name)
    }

    pub fn included(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter().filter(|s| s.included)
    }

    /// Applies a command; returns `false` when the sample is unknown or the
    /// value is rejected.
    pub fn apply(&mut self, command: &SampleCommand) -> bool {
        let Some(sample) = self
            .samples
            .iter_mut()
            .find(|s| s.name == command.target())
        else {
            return false;
        };
        match command {
            SampleCommand::Include(_) => sample.included = true,
            SampleCommand::Exclude(_) => sample.included = false,
            SampleCommand::SetAlias { alias, .. } => {
                let alias = alias.trim();
                sample.alias = if alias.is_empty() || alias == sample.name {
                    None
                } else {
                    Some(alias.to_string())
                };
            }
            SampleCommand::ClearAlias(_) => sample.alias = None,
            SampleCommand::SetPixelSize { pixel_size, .. } => {
                if !pixel_size.is_finite() || *pixel_size <= 0.0 {
                    return false;
                }
                sample.pixel_size = Some(*pixel_size);
            }
        }
        true
    }
}

/// Parsed matrices per (sample, element), with the file each one came from.
/// Read-only while a batch runs.
#[derive(Debug, Clone, Default)]
pub struct MatrixStore {
    pub samples: SampleSet,
    matrices: BTreeMap<(String, ElementKey), Matrix>,
    inputs: BTreeMap<(String, ElementKey), PathBuf>,
}

impl MatrixStore {
    pub fn new(samples: SampleSet) -> Self {
        Self {
            samples,
            matrices: BTreeMap::new(),
            inputs: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, sample: &str, element: ElementKey, matrix: Matrix) {
        self.matrices.insert((sample.to_string(), element), matrix);
    }

    pub fn insert_from(&mut self, sample: &str, element: ElementKey, matrix: Matrix, input: Option<PathBuf>) {
        if let Some(path) = input {
            self.inputs.insert((sample.to_string(), element.clone()), path);
        }
        self.insert(sample, element, matrix);
    }

    pub fn matrix(&self, sample: &str, element: &ElementKey) -> Option<&Matrix> {
        self.matrices.get(&(sample.to_string(), element.clone()))
    }

    pub fn input(&self, sample: &str, element: &ElementKey) -> Option<&Path> {
        self.inputs
            .get(&(sample.to_string(), element.clone()))
            .map(PathBuf::as_path)
    }

    pub fn has(&self, sample: &str, element: &ElementKey) -> bool {
        self.matrix(sample, element).is_some()
    }

    pub fn len(&self) -> usize {
        self.matrices.len()
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/sample.rs"]
mod tests;
