use crate::model::matrix::ElementKey;
use crate::model::progress::ProgressStatus;
use crate::model::sample::SampleSet;
use crate::pipeline::stage4_progress::ProgressMap;
use crate::pipeline::stage5_batch::{BatchSummary, ElementStatus};

fn status_label(status: ElementStatus) -> &'static str {
    match status {
        ElementStatus::Succeeded => "ok",
        ElementStatus::PartiallySucceeded => "partial",
        ElementStatus::Failed => "FAILED",
        ElementStatus::Skipped => "skipped (complete)",
        ElementStatus::Cancelled => "cancelled",
    }
}

pub fn render_summary_text(summary: &BatchSummary) -> String {
    let mut out = String::new();
    out.push_str("Batch summary\n");
    out.push_str("=============\n");
    out.push_str(&format!(
        "Succeeded: {}  Partial: {}  Failed: {}  Skipped: {}  Cancelled: {}\n",
        summary.count(ElementStatus::Succeeded),
        summary.count(ElementStatus::PartiallySucceeded),
        summary.count(ElementStatus::Failed),
        summary.count(ElementStatus::Skipped),
        summary.count(ElementStatus::Cancelled),
    ));
    out.push_str(&format!(
        "Statistics computed: {}  Composites rendered: {}\n\n",
        summary.statistics_computed, summary.composites_rendered
    ));

    for outcome in &summary.outcomes {
        let total = outcome.processed.len() + outcome.failures.len();
        out.push_str(&format!(
            "{:<16} {}",
            outcome.element.dir_name(),
            status_label(outcome.status)
        ));
        if total > 0 {
            out.push_str(&format!(" ({}/{} samples)", outcome.processed.len(), total));
        }
        if let Some(max) = outcome.scale_max {
            out.push_str(&format!(" scale max {}", crate::report::format_sig5(max)));
        }
        if let (Some(rows), Some(cols)) = (outcome.rows, outcome.cols) {
            out.push_str(&format!(" layout {rows}x{cols}"));
        }
        out.push('\n');
        if let Some(reason) = &outcome.reason {
            out.push_str(&format!("    reason: {reason}\n"));
        }
        for failure in &outcome.failures {
            out.push_str(&format!("    - {}: {}\n", failure.sample, failure.reason));
        }
    }
    out
}

fn status_cell(status: ProgressStatus) -> &'static str {
    match status {
        ProgressStatus::Missing => ".",
        ProgressStatus::Partial => "~",
        ProgressStatus::Complete => "#",
    }
}

/// Samples down, elements across. `#` complete, `~` partial, `.` missing.
pub fn render_progress_table(
    map: &ProgressMap,
    samples: &SampleSet,
    elements: &[ElementKey],
) -> String {
    let name_width = samples
        .iter()
        .map(|s| s.label().len())
        .max()
        .unwrap_or(6)
        .max(6);
    let headers = elements.iter().map(|e| e.dir_name()).collect::<Vec<_>>();

    let mut out = String::new();
    out.push_str(&format!("{:<name_width$}  incl", "sample"));
    for h in &headers {
        out.push_str(&format!("  {h}"));
    }
    out.push('\n');

    for sample in samples.iter() {
        out.push_str(&format!(
            "{:<name_width$}  {:<4}",
            sample.label(),
            if sample.included { "yes" } else { "no" }
        ));
        for (element, header) in elements.iter().zip(&headers) {
            let cell = map
                .get(&(sample.name.clone(), element.clone()))
                .map(|r| status_cell(r.status))
                .unwrap_or(" ");
            out.push_str(&format!("  {:^width$}", cell, width = header.len()));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
#[path = "../../tests/src_inline/report/text.rs"]
mod tests;
