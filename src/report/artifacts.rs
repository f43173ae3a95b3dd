use std::path::{Path, PathBuf};

use crate::model::matrix::ElementKey;

pub const HISTOGRAM_DIR: &str = "Histograms";
pub const SUBPLOT_DIR: &str = "subplots";
pub const SUMMARY_FILE: &str = "batch_summary.json";

/// Names of everything a batch writes under the output folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactLayout {
    root: PathBuf,
}

impl ArtifactLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn element_dir(&self, element: &ElementKey) -> PathBuf {
        self.root.join(element.dir_name())
    }

    fn element_file(&self, element: &ElementKey, suffix: &str) -> PathBuf {
        self.element_dir(element)
            .join(format!("{}_{suffix}", element.dir_name()))
    }

    pub fn histogram(&self, element: &ElementKey, sample: &str) -> PathBuf {
        self.element_dir(element)
            .join(HISTOGRAM_DIR)
            .join(format!("{sample}_histogram.tsv"))
    }

    pub fn statistics(&self, element: &ElementKey) -> PathBuf {
        self.element_file(element, "statistics.csv")
    }

    pub fn composite(&self, element: &ElementKey) -> PathBuf {
        self.element_file(element, "composite.png")
    }

    pub fn manifest(&self, element: &ElementKey) -> PathBuf {
        self.element_file(element, "composite.json")
    }

    pub fn composite_matrix(&self, element: &ElementKey) -> PathBuf {
        self.element_file(element, "composite_matrix.csv")
    }

    pub fn colorbar(&self, element: &ElementKey) -> PathBuf {
        self.element_file(element, "colorbar.png")
    }

    pub fn subplot(&self, element: &ElementKey, sample: &str) -> PathBuf {
        self.element_dir(element)
            .join(SUBPLOT_DIR)
            .join(format!("{sample}.png"))
    }

    pub fn summary(&self) -> PathBuf {
        self.root.join(SUMMARY_FILE)
    }
}

/// Exists and is not empty. Zero-byte files are interrupted writes.
pub fn has_content(path: &Path) -> bool {
    std::fs::metadata(path).is_ok_and(|m| m.is_file() && m.len() > 0)
}
