use serde::Serialize;

use crate::model::layout::LayoutPlan;
use crate::model::scale::{ResolvedScale, ScaleConfig};
use crate::pipeline::stage5_batch::{BatchSummary, CompositeRequest};

#[derive(Debug, Serialize)]
pub struct ManifestSample<'a> {
    pub name: &'a str,
    pub label: &'a str,
    pub pixel_size_um: f64,
    pub row: usize,
    pub col: usize,
    pub p99: f64,
}

#[derive(Debug, Serialize)]
pub struct ScaleBar {
    pub length_um: f64,
    pub length_px: usize,
}

/// Sidecar describing a rendered composite. Its sample list and scale config
/// are what the progress scan checks for completeness.
#[derive(Debug, Serialize)]
pub struct CompositeManifest<'a> {
    pub tool: &'static str,
    pub version: &'static str,
    pub element: String,
    pub unit: &'static str,
    pub scale: &'a ResolvedScale,
    pub scale_config: ScaleConfig,
    pub layout: LayoutSummary,
    pub colormap: &'static str,
    pub scale_bar: ScaleBar,
    pub samples: Vec<ManifestSample<'a>>,
}

#[derive(Debug, Serialize)]
pub struct LayoutSummary {
    pub rows: usize,
    pub cols: usize,
    pub empty_cells: usize,
}

impl From<&LayoutPlan> for LayoutSummary {
    fn from(plan: &LayoutPlan) -> Self {
        Self {
            rows: plan.rows,
            cols: plan.cols,
            empty_cells: plan.empty_cells(),
        }
    }
}

pub fn build_manifest<'a>(request: &'a CompositeRequest<'a>, scale_bar_px: usize) -> CompositeManifest<'a> {
    let samples = request
        .layout
        .cells
        .iter()
        .filter_map(|cell| {
            let panel = request.panels.get(cell.index)?;
            Some(ManifestSample {
                name: &panel.sample,
                label: &panel.label,
                pixel_size_um: panel.pixel_size_um,
                row: cell.row,
                col: cell.col,
                p99: panel.stats.p99,
            })
        })
        .collect();
    CompositeManifest {
        tool: "kira-elemaps",
        version: env!("CARGO_PKG_VERSION"),
        element: request.element.symbol.clone(),
        unit: request.element.unit.as_str(),
        scale: request.scale,
        scale_config: request.scale_config,
        layout: request.layout.into(),
        colormap: request.colormap.name(),
        scale_bar: ScaleBar {
            length_um: request.scale_bar_um,
            length_px: scale_bar_px,
        },
        samples,
    }
}

pub fn render_summary_json(summary: &BatchSummary) -> serde_json::Result<String> {
    serde_json::to_string_pretty(summary)
}
