use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::error::EngineError;
use crate::input::MatrixSource;
use crate::model::config::{BatchConfig, ColorMap};
use crate::model::layout::LayoutPlan;
use crate::model::matrix::{ElementKey, Matrix};
use crate::model::sample::{MatrixStore, Sample, SampleSet};
use crate::model::scale::{ResolvedScale, ScaleConfig};
use crate::model::stats::StatisticsRecord;
use crate::pipeline::stage1_statistics::{HISTOGRAM_BINS, Histogram, StatisticsCache, histogram};
use crate::pipeline::stage2_scale::{
    IntensityTransform, SampleScaleInput, build_transform, resolve,
};
use crate::pipeline::stage3_layout::plan;
use crate::pipeline::stage4_progress::ProgressTracker;
use crate::report::artifacts::ArtifactLayout;

/// One sample's map, ready to be placed in a composite.
#[derive(Debug, Clone)]
pub struct SamplePanel {
    pub sample: String,
    pub label: String,
    pub pixel_size_um: f64,
    pub matrix: Matrix,
    pub stats: StatisticsRecord,
}

pub struct CompositeRequest<'a> {
    pub element: &'a ElementKey,
    pub panels: &'a [SamplePanel],
    pub scale: &'a ResolvedScale,
    /// Settings the scale was resolved from; recorded so reruns can tell.
    pub scale_config: ScaleConfig,
    pub layout: &'a LayoutPlan,
    pub transform: &'a dyn IntensityTransform,
    pub scale_bar_um: f64,
    pub colormap: ColorMap,
}

/// Output collaborator: intermediate artifacts, the statistics table and the
/// final composite.
pub trait Renderer {
    fn write_histogram(
        &mut self,
        element: &ElementKey,
        sample: &str,
        histogram: &Histogram,
    ) -> Result<(), EngineError>;

    fn write_statistics(
        &mut self,
        element: &ElementKey,
        panels: &[SamplePanel],
    ) -> Result<(), EngineError>;

    fn render_composite(&mut self, request: &CompositeRequest<'_>) -> Result<(), EngineError>;
}

#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub element: ElementKey,
    pub element_index: usize,
    pub element_total: usize,
    pub sample: Option<String>,
    pub sample_index: usize,
    pub sample_total: usize,
}

impl ProgressEvent {
    /// Overall completion in `[0, 1]`.
    pub fn fraction(&self) -> f64 {
        if self.element_total == 0 {
            return 1.0;
        }
        let within = if self.sample_total == 0 {
            0.0
        } else {
            self.sample_index as f64 / self.sample_total as f64
        };
        ((self.element_index as f64 + within) / self.element_total as f64).clamp(0.0, 1.0)
    }
}

type ProgressCallback<'a> = Box<dyn FnMut(&ProgressEvent) + 'a>;

/// Rate-capped progress callback. Forced events (start and end of a batch)
/// always pass.
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
    min_interval: Duration,
    last: Option<Instant>,
    suppressed: usize,
}

impl<'a> ProgressReporter<'a> {
    pub fn silent() -> Self {
        Self {
            callback: None,
            min_interval: Duration::ZERO,
            last: None,
            suppressed: 0,
        }
    }

    pub fn new(min_interval: Duration, callback: impl FnMut(&ProgressEvent) + 'a) -> Self {
        Self {
            callback: Some(Box::new(callback)),
            min_interval,
            last: None,
            suppressed: 0,
        }
    }

    pub fn report(&mut self, event: &ProgressEvent, force: bool) {
        let Some(callback) = self.callback.as_mut() else {
            return;
        };
        let now = Instant::now();
        let due = self
            .last
            .is_none_or(|last| now.duration_since(last) >= self.min_interval);
        if !(force || due) {
            self.suppressed += 1;
            return;
        }
        self.last = Some(now);
        callback(event);
    }

    pub fn suppressed(&self) -> usize {
        self.suppressed
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleFailure {
    pub sample: String,
    pub reason: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ElementStatus {
    Succeeded,
    PartiallySucceeded,
    Failed,
    Skipped,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ElementOutcome {
    pub element: ElementKey,
    pub status: ElementStatus,
    pub processed: Vec<String>,
    pub failures: Vec<SampleFailure>,
    pub reason: Option<String>,
    pub scale_max: Option<f64>,
    pub rows: Option<usize>,
    pub cols: Option<usize>,
}

impl ElementOutcome {
    fn new(element: &ElementKey, status: ElementStatus) -> Self {
        Self {
            element: element.clone(),
            status,
            processed: Vec::new(),
            failures: Vec::new(),
            reason: None,
            scale_max: None,
            rows: None,
            cols: None,
        }
    }

    fn failed(mut self, reason: impl Into<String>) -> Self {
        self.status = ElementStatus::Failed;
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub outcomes: Vec<ElementOutcome>,
    pub statistics_computed: usize,
    pub composites_rendered: usize,
    pub cancelled: bool,
}

impl BatchSummary {
    pub fn count(&self, status: ElementStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

}

pub struct BatchController<'a, R: Renderer> {
    config: &'a BatchConfig,
    source: &'a dyn MatrixSource,
    samples: &'a SampleSet,
    elements: Vec<ElementKey>,
    artifacts: &'a ArtifactLayout,
    renderer: R,
    cache: StatisticsCache,
    cancel: CancelFlag,
    reporter: ProgressReporter<'a>,
    composites_rendered: usize,
}

impl<'a, R: Renderer> BatchController<'a, R> {
    pub fn new(
        config: &'a BatchConfig,
        source: &'a dyn MatrixSource,
        samples: &'a SampleSet,
        elements: &[ElementKey],
        artifacts: &'a ArtifactLayout,
        renderer: R,
    ) -> Self {
        let elements = elements
            .iter()
            .filter(|e| config.wants_element(e))
            .cloned()
            .collect();
        Self {
            config,
            source,
            samples,
            elements,
            artifacts,
            renderer,
            cache: StatisticsCache::new(),
            cancel: CancelFlag::new(),
            reporter: ProgressReporter::silent(),
            composites_rendered: 0,
        }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_progress(mut self, reporter: ProgressReporter<'a>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Parses the element's inputs for the given samples once. Failures are
    /// kept per sample; a failed sample is absent from the store.
    fn stage_element(
        &self,
        element: &ElementKey,
        candidates: &[Sample],
    ) -> Result<(MatrixStore, BTreeMap<String, String>), EngineError> {
        let mut store = MatrixStore::new(self.samples.clone());
        let mut failures = BTreeMap::new();
        for sample in candidates {
            if self.cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            match self.source.load(&sample.name, element) {
                Ok(matrix) => {
                    let input = self.source.input_path(&sample.name, element);
                    store.insert_from(&sample.name, element.clone(), matrix, input);
                }
                Err(err) => {
                    failures.insert(sample.name.clone(), err.to_string());
                }
            }
        }
        Ok((store, failures))
    }

    pub fn process_element(&mut self, element: &ElementKey) -> ElementOutcome {
        let index = self
            .elements
            .iter()
            .position(|e| e == element)
            .unwrap_or(0);
        let total = self.elements.len().max(1);
        self.process_element_at(element, index, total)
    }

    fn process_element_at(
        &mut self,
        element: &ElementKey,
        element_index: usize,
        element_total: usize,
    ) -> ElementOutcome {
        let span = tracing::info_span!("element", element = %element);
        let _enter = span.enter();

        let candidates = self
            .samples
            .included()
            .filter(|s| self.source.has_input(&s.name, element))
            .cloned()
            .collect::<Vec<_>>();
        let mut outcome = ElementOutcome::new(element, ElementStatus::Succeeded);
        if candidates.is_empty() {
            return outcome.failed("no included samples with input");
        }

        let (store, load_failures) = match self.stage_element(element, &candidates) {
            Ok(staged) => staged,
            Err(err) => {
                tracing::warn!("cancelled while reading inputs");
                outcome.status = ElementStatus::Cancelled;
                outcome.reason = Some(err.to_string());
                return outcome;
            }
        };
        tracing::debug!(matrices = store.len(), unreadable = load_failures.len(), "inputs staged");

        let elements = std::slice::from_ref(element);
        let complete = ProgressTracker::new(self.artifacts, &store, &store.samples, elements)
            .with_scale(self.config.scale)
            .element_complete(element);
        if complete {
            tracing::info!("all included samples complete; skipping");
            outcome.status = ElementStatus::Skipped;
            return outcome;
        }

        let mut panels = Vec::with_capacity(candidates.len());
        for (sample_index, sample) in candidates.iter().enumerate() {
            if self.cancel.is_cancelled() {
                tracing::warn!(sample = %sample.name, "cancelled before sample");
                outcome.status = ElementStatus::Cancelled;
                outcome.reason = Some(EngineError::Cancelled.to_string());
                return outcome;
            }
            self.reporter.report(
                &ProgressEvent {
                    element: element.clone(),
                    element_index,
                    element_total,
                    sample: Some(sample.name.clone()),
                    sample_index,
                    sample_total: candidates.len(),
                },
                element_index == 0 && sample_index == 0,
            );

            let pixel_size_um = self.config.pixel_size_for(&sample.name, sample.pixel_size);
            let prepared = match (store.matrix(&sample.name, element), load_failures.get(&sample.name)) {
                (Some(matrix), _) => {
                    self.prepare_sample(element, sample, matrix.clone(), pixel_size_um)
                }
                (None, Some(reason)) => Err(reason.clone()),
                (None, None) => Err(format!("no matrix for {}", sample.name)),
            };
            match prepared {
                Ok(panel) => {
                    outcome.processed.push(sample.name.clone());
                    panels.push(panel);
                }
                Err(reason) => {
                    tracing::warn!(sample = %sample.name, %reason, "sample failed");
                    outcome.failures.push(SampleFailure {
                        sample: sample.name.clone(),
                        reason,
                    });
                }
            }
        }

        if panels.is_empty() {
            return outcome.failed("no processable samples");
        }

        if let Err(err) = self.finish_element(element, &panels, &mut outcome) {
            tracing::error!(reason = %err, "element failed");
            return outcome.failed(err.to_string());
        }

        if !outcome.failures.is_empty() {
            outcome.status = ElementStatus::PartiallySucceeded;
        }
        tracing::info!(
            processed = outcome.processed.len(),
            failed = outcome.failures.len(),
            "element done"
        );
        outcome
    }

    fn prepare_sample(
        &mut self,
        element: &ElementKey,
        sample: &Sample,
        matrix: Matrix,
        pixel_size_um: f64,
    ) -> Result<SamplePanel, String> {
        if matrix.unit() != element.unit {
            return Err(format!(
                "matrix unit {} does not match {}",
                matrix.unit(),
                element.dir_name()
            ));
        }
        let stats = self
            .cache
            .get_or_compute(&sample.name, element, &matrix)
            .map_err(|e| e.to_string())?;
        let hist = histogram(&matrix, HISTOGRAM_BINS, stats.p99);
        self.renderer
            .write_histogram(element, &sample.name, &hist)
            .map_err(|e| e.to_string())?;
        Ok(SamplePanel {
            sample: sample.name.clone(),
            label: sample.label().to_string(),
            pixel_size_um,
            matrix,
            stats,
        })
    }

    fn finish_element(
        &mut self,
        element: &ElementKey,
        panels: &[SamplePanel],
        outcome: &mut ElementOutcome,
    ) -> Result<(), EngineError> {
        let inputs = panels
            .iter()
            .map(|p| SampleScaleInput {
                sample: &p.sample,
                included: true,
                stats: &p.stats,
            })
            .collect::<Vec<_>>();
        let scale = resolve(element, &inputs, &self.config.scale)?;
        let layout = plan(panels.len(), &self.config.layout)?;
        outcome.scale_max = Some(scale.max);
        outcome.rows = Some(layout.rows);
        outcome.cols = Some(layout.cols);
        tracing::info!(
            scale_max = scale.max,
            transform = ?scale.transform,
            source = scale.source_sample.as_deref().unwrap_or("user"),
            rows = layout.rows,
            cols = layout.cols,
            "scale and layout resolved"
        );

        self.renderer.write_statistics(element, panels)?;

        let transform = build_transform(&scale, panels.iter().map(|p| &p.matrix), self.config.log_floor);
        let display;
        let panels = if panels.len() > self.config.downsample_above {
            let target = self.config.downsample_target;
            display = panels
                .iter()
                .map(|p| {
                    // one display pixel now covers factor x factor input pixels
                    let factor = p.matrix.downsample_factor(target);
                    SamplePanel {
                        matrix: p.matrix.downsample(target),
                        pixel_size_um: p.pixel_size_um * factor as f64,
                        ..p.clone()
                    }
                })
                .collect::<Vec<_>>();
            &display[..]
        } else {
            panels
        };

        self.renderer.render_composite(&CompositeRequest {
            element,
            panels,
            scale: &scale,
            scale_config: self.config.scale,
            layout: &layout,
            transform: transform.as_ref(),
            scale_bar_um: self.config.scale_bar_um,
            colormap: self.config.colormap,
        })?;
        self.composites_rendered += 1;
        Ok(())
    }

    pub fn process_all_elements(&mut self) -> BatchSummary {
        let elements = self.elements.clone();
        let total = elements.len();
        let mut summary = BatchSummary::default();
        tracing::info!(elements = total, "batch started");

        for element in &elements {
            if self.cancel.is_cancelled() {
                summary.cancelled = true;
                let mut outcome = ElementOutcome::new(element, ElementStatus::Cancelled);
                outcome.reason = Some(EngineError::Cancelled.to_string());
                summary.outcomes.push(outcome);
                continue;
            }
            let outcome = self.process_element(element);
            if outcome.status == ElementStatus::Cancelled {
                summary.cancelled = true;
            }
            summary.outcomes.push(outcome);
        }

        if let Some(last) = elements.last() {
            self.reporter.report(
                &ProgressEvent {
                    element: last.clone(),
                    element_index: total,
                    element_total: total,
                    sample: None,
                    sample_index: 0,
                    sample_total: 0,
                },
                true,
            );
        }

        summary.statistics_computed = self.cache.computed();
        summary.composites_rendered = self.composites_rendered;
        tracing::info!(
            succeeded = summary.count(ElementStatus::Succeeded),
            partial = summary.count(ElementStatus::PartiallySucceeded),
            failed = summary.count(ElementStatus::Failed),
            skipped = summary.count(ElementStatus::Skipped),
            cancelled = summary.count(ElementStatus::Cancelled),
            progress_suppressed = self.reporter.suppressed(),
            "batch finished"
        );
        summary
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage5_batch.rs"]
mod tests;
