use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::SystemTime;

use serde::Deserialize;

use crate::input::MatrixSource;
use crate::model::matrix::ElementKey;
use crate::model::progress::{ProgressRecord, ProgressStatus};
use crate::model::sample::SampleSet;
use crate::model::scale::ScaleConfig;
use crate::report::artifacts::{ArtifactLayout, has_content};

pub type ProgressMap = BTreeMap<(String, ElementKey), ProgressRecord>;

#[derive(Debug, Deserialize)]
struct ManifestHeader {
    samples: Vec<ManifestSample>,
    #[serde(default)]
    scale_config: Option<ScaleConfig>,
}

#[derive(Debug, Deserialize)]
struct ManifestSample {
    name: String,
}

#[derive(Debug, Default)]
struct ManifestState {
    samples: BTreeSet<String>,
    scale_config: Option<ScaleConfig>,
}

/// What the output folder says about one element.
#[derive(Debug)]
struct ElementOutputs {
    composite_time: Option<SystemTime>,
    /// `None` when there is no manifest; empty when it is unreadable.
    manifest: Option<ManifestState>,
    statistics_samples: BTreeSet<String>,
    /// Samples whose input parses to a non-empty map.
    readable: BTreeSet<String>,
    /// Manifest lists exactly the readable included samples, under the
    /// expected scale config.
    current: bool,
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn read_manifest(path: &Path) -> Option<ManifestState> {
    if !has_content(path) {
        return None;
    }
    let parsed = std::fs::read(path)
        .ok()
        .and_then(|bytes| serde_json::from_slice::<ManifestHeader>(&bytes).ok());
    match parsed {
        Some(manifest) => Some(ManifestState {
            samples: manifest.samples.into_iter().map(|s| s.name).collect(),
            scale_config: manifest.scale_config,
        }),
        None => {
            tracing::warn!(path = %path.display(), "unreadable composite manifest");
            Some(ManifestState::default())
        }
    }
}

fn read_statistics_samples(path: &Path) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    if !has_content(path) {
        return out;
    }
    let Ok(mut reader) = csv::ReaderBuilder::new().flexible(true).from_path(path) else {
        return out;
    };
    for record in reader.records().flatten() {
        if let Some(sample) = record.get(0).filter(|s| !s.is_empty()) {
            out.insert(sample.to_string());
        }
    }
    out
}

/// Read-only projection of the output folder onto (sample, element) status.
/// Nothing is cached between calls to [`ProgressTracker::refresh`].
pub struct ProgressTracker<'a> {
    artifacts: &'a ArtifactLayout,
    source: &'a dyn MatrixSource,
    samples: &'a SampleSet,
    elements: &'a [ElementKey],
    scale: Option<ScaleConfig>,
}

impl<'a> ProgressTracker<'a> {
    pub fn new(
        artifacts: &'a ArtifactLayout,
        source: &'a dyn MatrixSource,
        samples: &'a SampleSet,
        elements: &'a [ElementKey],
    ) -> Self {
        Self {
            artifacts,
            source,
            samples,
            elements,
            scale: None,
        }
    }

    /// Composites whose manifest records another scale config stop counting
    /// as complete.
    pub fn with_scale(mut self, scale: ScaleConfig) -> Self {
        self.scale = Some(scale);
        self
    }

    fn scan_element(&self, element: &ElementKey) -> ElementOutputs {
        let composite = self.artifacts.composite(element);
        let composite_time = if has_content(&composite) {
            modified(&composite).or(Some(SystemTime::UNIX_EPOCH))
        } else {
            None
        };
        let readable = self
            .samples
            .iter()
            .filter(|s| self.source.has_input(&s.name, element))
            .filter(|s| self.source.readable(&s.name, element))
            .map(|s| s.name.clone())
            .collect::<BTreeSet<_>>();
        let manifest = read_manifest(&self.artifacts.manifest(element));
        let current = manifest.as_ref().is_some_and(|m| {
            let expected = self
                .samples
                .included()
                .filter(|s| readable.contains(&s.name))
                .map(|s| &s.name);
            let same_samples = expected.eq(m.samples.iter());
            let same_scale = self.scale.is_none_or(|scale| m.scale_config == Some(scale));
            same_samples && same_scale
        });
        ElementOutputs {
            composite_time,
            manifest,
            statistics_samples: read_statistics_samples(&self.artifacts.statistics(element)),
            readable,
            current,
        }
    }

    fn status(&self, sample: &str, element: &ElementKey, outputs: &ElementOutputs) -> ProgressStatus {
        if !outputs.readable.contains(sample) {
            return ProgressStatus::Missing;
        }
        if let (Some(composite_time), Some(manifest)) = (outputs.composite_time, &outputs.manifest) {
            let listed = manifest.samples.contains(sample);
            let fresh = self
                .source
                .input_path(sample, element)
                .and_then(|p| modified(&p))
                .is_none_or(|input_time| composite_time >= input_time);
            if outputs.current && listed && fresh {
                return ProgressStatus::Complete;
            }
        }
        if has_content(&self.artifacts.histogram(element, sample))
            || outputs.statistics_samples.contains(sample)
        {
            return ProgressStatus::Partial;
        }
        ProgressStatus::Missing
    }

    fn records(&self, element: &ElementKey, outputs: &ElementOutputs) -> ProgressMap {
        self.samples
            .iter()
            .map(|sample| {
                let record = ProgressRecord {
                    sample: sample.name.clone(),
                    element: element.clone(),
                    status: self.status(&sample.name, element, outputs),
                    included: sample.included,
                };
                ((sample.name.clone(), element.clone()), record)
            })
            .collect()
    }

    pub fn refresh_element(&self, element: &ElementKey) -> ProgressMap {
        self.records(element, &self.scan_element(element))
    }

    pub fn refresh(&self) -> ProgressMap {
        let mut out = ProgressMap::new();
        for element in self.elements {
            out.extend(self.refresh_element(element));
        }
        out
    }

    /// True when every included sample with readable input is Complete, and
    /// there is at least one such sample. Unreadable input never blocks.
    pub fn element_complete(&self, element: &ElementKey) -> bool {
        let outputs = self.scan_element(element);
        let map = self.records(element, &outputs);
        let mut relevant = self
            .samples
            .included()
            .filter(|s| outputs.readable.contains(&s.name))
            .peekable();
        if relevant.peek().is_none() {
            return false;
        }
        relevant.all(|s| {
            map.get(&(s.name.clone(), element.clone()))
                .is_some_and(|r| r.status == ProgressStatus::Complete)
        })
    }
}

pub fn status_counts(map: &ProgressMap) -> [usize; 3] {
    let mut counts = [0usize; 3];
    for record in map.values() {
        let idx = match record.status {
            ProgressStatus::Missing => 0,
            ProgressStatus::Partial => 1,
            ProgressStatus::Complete => 2,
        };
        counts[idx] += 1;
    }
    counts
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage4_progress.rs"]
mod tests;
