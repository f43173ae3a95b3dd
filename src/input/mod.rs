use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

pub mod aliases;
pub mod matrix;
pub mod pixel_sizes;

use crate::model::matrix::{ElementKey, Matrix, Unit};
use crate::model::sample::{MatrixStore, SampleSet};
use matrix::read_matrix;

#[derive(Debug, Error)]
pub enum InputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("missing file: {}", .0.display())]
    MissingFile(PathBuf),
    #[error("cannot parse {}: {reason}", path.display())]
    MatrixParse { path: PathBuf, reason: String },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Where the engine gets a (sample, element) matrix from.
pub trait MatrixSource {
    fn load(&self, sample: &str, element: &ElementKey) -> Result<Matrix, InputError>;

    /// Backing file, when there is one. Used to judge output freshness.
    fn input_path(&self, _sample: &str, _element: &ElementKey) -> Option<PathBuf> {
        None
    }

    fn has_input(&self, sample: &str, element: &ElementKey) -> bool;

    /// Input parses and holds at least one valid pixel.
    fn readable(&self, sample: &str, element: &ElementKey) -> bool {
        self.load(sample, element)
            .is_ok_and(|matrix| matrix.n_valid() > 0)
    }
}

impl MatrixSource for MatrixStore {
    fn load(&self, sample: &str, element: &ElementKey) -> Result<Matrix, InputError> {
        self.matrix(sample, element).cloned().ok_or_else(|| {
            InputError::MissingFile(PathBuf::from(format!("{sample}/{}", element.dir_name())))
        })
    }

    fn input_path(&self, sample: &str, element: &ElementKey) -> Option<PathBuf> {
        self.input(sample, element).map(Path::to_path_buf)
    }

    fn has_input(&self, sample: &str, element: &ElementKey) -> bool {
        self.has(sample, element)
    }

    fn readable(&self, sample: &str, element: &ElementKey) -> bool {
        self.matrix(sample, element).is_some_and(|m| m.n_valid() > 0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatrixFile {
    pub path: PathBuf,
    pub sample: String,
    pub element: ElementKey,
}

const ELEMENT_PATTERN: &str = r"[A-Za-z]{1,2}\d{1,3}|Total[A-Za-z]+";
const EXT_PATTERN: &str = r"\.(?:(?:csv|tsv|txt)(?:\.gz)?|xlsx)";

static UNIT_TAGGED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"^(.+?)[ _]({ELEMENT_PATTERN})_(ppm|CPS) matrix{EXT_PATTERN}$"
    ))
    .unwrap_or_else(|e| panic!("bad file-name pattern: {e}"))
});

static RAW_COUNTS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"^(.+?) ({ELEMENT_PATTERN}) matrix{EXT_PATTERN}$"))
        .unwrap_or_else(|e| panic!("bad file-name pattern: {e}"))
});

/// `S1 Fe56_ppm matrix.csv` -> (`S1`, Fe56 ppm); `S1 Fe56 matrix.csv` -> raw counts.
pub fn parse_matrix_filename(file_name: &str) -> Option<(String, ElementKey)> {
    if let Some(caps) = UNIT_TAGGED.captures(file_name) {
        let unit = Unit::parse(&caps[3])?;
        return Some((caps[1].to_string(), ElementKey::new(&caps[2], unit)));
    }
    let caps = RAW_COUNTS.captures(file_name)?;
    Some((caps[1].to_string(), ElementKey::new(&caps[2], Unit::Counts)))
}

pub fn discover_matrix_files(input_dir: &Path) -> Result<Vec<MatrixFile>, InputError> {
    if !input_dir.is_dir() {
        return Err(InputError::MissingFile(input_dir.to_path_buf()));
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(input_dir)? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some((sample, element)) = parse_matrix_filename(name) {
            files.push(MatrixFile {
                path: path.clone(),
                sample,
                element,
            });
        }
    }
    files.sort_by(|a, b| {
        a.element
            .cmp(&b.element)
            .then_with(|| a.sample.cmp(&b.sample))
            .then_with(|| a.path.cmp(&b.path))
    });
    Ok(files)
}

/// Matrices parsed lazily from an input folder, one file per (sample, element).
#[derive(Debug, Clone, Default)]
pub struct DirectorySource {
    files: BTreeMap<(String, ElementKey), PathBuf>,
}

impl DirectorySource {
    pub fn from_files(files: &[MatrixFile]) -> Self {
        let mut map: BTreeMap<(String, ElementKey), PathBuf> = BTreeMap::new();
        for f in files {
            let key = (f.sample.clone(), f.element.clone());
            if let Some(previous) = map.get(&key) {
                tracing::warn!(
                    sample = %f.sample,
                    element = %f.element,
                    kept = %previous.display(),
                    ignored = %f.path.display(),
                    "duplicate matrix file; keeping first"
                );
                continue;
            }
            map.insert(key, f.path.clone());
        }
        Self { files: map }
    }

    pub fn elements(&self) -> Vec<ElementKey> {
        let mut out = self
            .files
            .keys()
            .map(|(_, e)| e.clone())
            .collect::<Vec<_>>();
        out.sort();
        out.dedup();
        out
    }

    pub fn samples(&self) -> SampleSet {
        SampleSet::from_names(self.files.keys().map(|(s, _)| s.clone()))
    }
}

impl MatrixSource for DirectorySource {
    fn load(&self, sample: &str, element: &ElementKey) -> Result<Matrix, InputError> {
        let path = self
            .input_path(sample, element)
            .ok_or_else(|| InputError::MissingFile(PathBuf::from(sample)))?;
        read_matrix(&path, &element.symbol, element.unit)
    }

    fn input_path(&self, sample: &str, element: &ElementKey) -> Option<PathBuf> {
        self.files
            .get(&(sample.to_string(), element.clone()))
            .cloned()
    }

    fn has_input(&self, sample: &str, element: &ElementKey) -> bool {
        self.files
            .contains_key(&(sample.to_string(), element.clone()))
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/input/tests.rs"]
mod tests;
