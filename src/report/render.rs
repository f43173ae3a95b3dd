use std::io::Write;
use std::path::Path;

use image::{Rgb, RgbImage};
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::error::EngineError;
use crate::model::config::ColorMap;
use crate::model::layout::LayoutPlan;
use crate::model::matrix::{ElementKey, Matrix};
use crate::pipeline::stage1_statistics::Histogram;
use crate::pipeline::stage2_scale::IntensityTransform;
use crate::pipeline::stage5_batch::{CompositeRequest, Renderer, SamplePanel};
use crate::report::artifacts::{ArtifactLayout, has_content};
use crate::report::json::build_manifest;
use crate::report::statistics::write_statistics_csv;
use crate::report::{format_sig5, write_text};

const CELL_GAP: u32 = 8;
const COLORBAR_WIDTH: u32 = 20;
const COLORBAR_MIN_HEIGHT: u32 = 48;
const SCALE_BAR_THICKNESS: u32 = 4;
/// Element label across the top.
const TITLE_BAND: u32 = 28;
/// Sample labels above each cell; also the unit above the colour bar and
/// the caption under the scale bar.
const LABEL_BAND: u32 = 16;
/// Room right of the colour bar for its ceiling value.
const TICK_TEXT_WIDTH: u32 = 56;
const TITLE_FONT_PX: u32 = 18;
const LABEL_FONT_PX: u32 = 12;
const FONT_FAMILY: &str = "sans-serif";

fn render_error(path: &Path, err: impl std::fmt::Display) -> EngineError {
    EngineError::Render(format!("{}: {err}", path.display()))
}

fn save_png(image: &RgbImage, path: &Path) -> Result<(), EngineError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    image.save(path).map_err(|e| render_error(path, e))
}

/// Scale bar length in pixels of the reference panel; at least one pixel.
pub fn scale_bar_px(scale_bar_um: f64, pixel_size_um: f64) -> usize {
    if !(pixel_size_um.is_finite() && pixel_size_um > 0.0) || !scale_bar_um.is_finite() {
        return 0;
    }
    ((scale_bar_um / pixel_size_um).round() as usize).max(1)
}

fn paint_matrix(
    image: &mut RgbImage,
    matrix: &Matrix,
    x0: u32,
    y0: u32,
    transform: &dyn IntensityTransform,
    colormap: ColorMap,
) {
    for r in 0..matrix.rows() {
        for c in 0..matrix.cols() {
            let value = matrix.get(r, c).unwrap_or(f64::NAN);
            let t = transform.normalize(value).unwrap_or(0.0);
            image.put_pixel(x0 + c as u32, y0 + r as u32, Rgb(colormap.rgb8(t)));
        }
    }
}

fn paint_colorbar(image: &mut RgbImage, x0: u32, y0: u32, width: u32, height: u32, colormap: ColorMap) {
    if height == 0 {
        return;
    }
    for y in 0..height {
        let t = if height == 1 {
            1.0
        } else {
            1.0 - y as f64 / (height - 1) as f64
        };
        let color = Rgb(colormap.rgb8(t));
        for x in 0..width {
            image.put_pixel(x0 + x, y0 + y, color);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Center,
    Left,
}

/// Text drawn onto the composite; `(x, y)` is the anchor point.
#[derive(Debug, Clone, PartialEq)]
pub struct TextLabel {
    pub text: String,
    pub x: i32,
    pub y: i32,
    pub size: u32,
    pub align: TextAlign,
}

/// Pixel positions of everything on the composite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompositeGeometry {
    pub cell_w: u32,
    pub cell_h: u32,
    pub width: u32,
    pub height: u32,
    pub bar_x: u32,
    pub bar_y: u32,
    pub bar_h: u32,
    pub scale_y: u32,
    pub bar_px: u32,
}

impl CompositeGeometry {
    pub fn new(request: &CompositeRequest<'_>, bar_px: usize) -> Self {
        let layout: &LayoutPlan = request.layout;
        let cell_w = request.panels.iter().map(|p| p.matrix.cols()).max().unwrap_or(1).max(1) as u32;
        let cell_h = request.panels.iter().map(|p| p.matrix.rows()).max().unwrap_or(1).max(1) as u32;
        let cols = layout.cols as u32;
        let rows = layout.rows as u32;

        let grid_w = cols * cell_w + (cols + 1) * CELL_GAP;
        let grid_h = TITLE_BAND + rows * (LABEL_BAND + cell_h) + (rows + 1) * CELL_GAP;
        let bar_px = bar_px.min(grid_w as usize) as u32;
        let side_w = (COLORBAR_WIDTH + TICK_TEXT_WIDTH).max(bar_px) + CELL_GAP;

        let bar_y = TITLE_BAND + CELL_GAP + LABEL_BAND;
        let bar_h = cell_h.max(COLORBAR_MIN_HEIGHT);
        let scale_y = bar_y + bar_h + CELL_GAP;
        let side_h = scale_y + SCALE_BAR_THICKNESS + LABEL_BAND + CELL_GAP;
        Self {
            cell_w,
            cell_h,
            width: grid_w + side_w,
            height: grid_h.max(side_h),
            bar_x: grid_w,
            bar_y,
            bar_h,
            scale_y,
            bar_px,
        }
    }

    /// Top-left pixel of the map in grid cell `(row, col)`.
    pub fn cell_origin(&self, row: usize, col: usize) -> (u32, u32) {
        let x = CELL_GAP + col as u32 * (self.cell_w + CELL_GAP);
        let y = TITLE_BAND + CELL_GAP + LABEL_BAND + row as u32 * (LABEL_BAND + self.cell_h + CELL_GAP);
        (x, y)
    }
}

/// Element title, one label per sample cell, the unit over the colour bar,
/// its ceiling value and the scale-bar caption.
pub fn composite_labels(request: &CompositeRequest<'_>, geometry: &CompositeGeometry) -> Vec<TextLabel> {
    let label = |text: String, x: u32, y: u32, size: u32, align: TextAlign| TextLabel {
        text,
        x: x as i32,
        y: y as i32,
        size,
        align,
    };
    let mut out = vec![label(
        request.element.to_string(),
        geometry.width / 2,
        TITLE_BAND / 2,
        TITLE_FONT_PX,
        TextAlign::Center,
    )];
    for cell in &request.layout.cells {
        let Some(panel) = request.panels.get(cell.index) else {
            continue;
        };
        let (x0, y0) = geometry.cell_origin(cell.row, cell.col);
        out.push(label(
            panel.label.clone(),
            x0 + geometry.cell_w / 2,
            y0 - LABEL_BAND / 2,
            LABEL_FONT_PX,
            TextAlign::Center,
        ));
    }
    out.push(label(
        request.element.unit.as_str().to_string(),
        geometry.bar_x + COLORBAR_WIDTH / 2,
        geometry.bar_y - LABEL_BAND / 2,
        LABEL_FONT_PX,
        TextAlign::Center,
    ));
    out.push(label(
        format_sig5(request.scale.max),
        geometry.bar_x + COLORBAR_WIDTH + 4,
        geometry.bar_y + LABEL_FONT_PX / 2,
        LABEL_FONT_PX,
        TextAlign::Left,
    ));
    if geometry.bar_px > 0 {
        out.push(label(
            format!("{} \u{b5}m", format_sig5(request.scale_bar_um)),
            geometry.bar_x,
            geometry.scale_y + SCALE_BAR_THICKNESS + LABEL_BAND / 2,
            LABEL_FONT_PX,
            TextAlign::Left,
        ));
    }
    out
}

/// Rasterizes `labels` in place through the plotters bitmap backend.
pub fn draw_labels(image: &mut RgbImage, labels: &[TextLabel], ink: [u8; 3]) -> Result<(), EngineError> {
    let (width, height) = image.dimensions();
    let pixels: &mut [u8] = &mut **image;
    let root = BitMapBackend::with_buffer(pixels, (width, height)).into_drawing_area();
    let color = RGBColor(ink[0], ink[1], ink[2]);
    for label in labels {
        let anchor = match label.align {
            TextAlign::Center => Pos::new(HPos::Center, VPos::Center),
            TextAlign::Left => Pos::new(HPos::Left, VPos::Center),
        };
        let style = (FONT_FAMILY, label.size).into_font().color(&color).pos(anchor);
        root.draw(&Text::new(label.text.as_str(), (label.x, label.y), style))
            .map_err(|e| EngineError::Render(format!("label {:?}: {e}", label.text)))?;
    }
    root.present()
        .map_err(|e| EngineError::Render(format!("labels: {e}")))
}

/// Composite raster: a title band, the labelled sample grid, then a right
/// column with the shared colour bar above the scale bar.
pub fn compose_image(request: &CompositeRequest<'_>, bar_px: usize) -> RgbImage {
    let geometry = CompositeGeometry::new(request, bar_px);
    let background = Rgb(request.colormap.rgb8(0.0));
    let mut image = RgbImage::from_pixel(geometry.width, geometry.height, background);

    for cell in &request.layout.cells {
        let Some(panel) = request.panels.get(cell.index) else {
            continue;
        };
        let (x0, y0) = geometry.cell_origin(cell.row, cell.col);
        paint_matrix(&mut image, &panel.matrix, x0, y0, request.transform, request.colormap);
    }

    paint_colorbar(
        &mut image,
        geometry.bar_x,
        geometry.bar_y,
        COLORBAR_WIDTH,
        geometry.bar_h,
        request.colormap,
    );

    let ink = request.colormap.contrasting_rgb8();
    for y in geometry.scale_y..(geometry.scale_y + SCALE_BAR_THICKNESS).min(geometry.height) {
        for x in geometry.bar_x..(geometry.bar_x + geometry.bar_px).min(geometry.width) {
            image.put_pixel(x, y, Rgb(ink));
        }
    }

    // a host without usable fonts still gets the maps, colour bar and scale bar
    if let Err(err) = draw_labels(&mut image, &composite_labels(request, &geometry), ink) {
        tracing::warn!(element = %request.element, reason = %err, "composite labels not drawn");
    }
    image
}

pub fn render_panel(panel: &SamplePanel, transform: &dyn IntensityTransform, colormap: ColorMap) -> RgbImage {
    let w = panel.matrix.cols().max(1) as u32;
    let h = panel.matrix.rows().max(1) as u32;
    let mut image = RgbImage::from_pixel(w, h, Rgb(colormap.rgb8(0.0)));
    paint_matrix(&mut image, &panel.matrix, 0, 0, transform, colormap);
    image
}

/// Grid of matrices padded to a common shape, one missing-value row/column
/// between cells, for downstream region selection tools.
pub fn composite_matrix(panels: &[SamplePanel], layout: &LayoutPlan) -> Vec<Vec<f64>> {
    let cell_h = panels.iter().map(|p| p.matrix.rows()).max().unwrap_or(0);
    let cell_w = panels.iter().map(|p| p.matrix.cols()).max().unwrap_or(0);
    let total_h = layout.rows * cell_h + layout.rows.saturating_sub(1);
    let total_w = layout.cols * cell_w + layout.cols.saturating_sub(1);
    let mut grid = vec![vec![f64::NAN; total_w]; total_h];
    for cell in &layout.cells {
        let Some(panel) = panels.get(cell.index) else {
            continue;
        };
        let r0 = cell.row * (cell_h + 1);
        let c0 = cell.col * (cell_w + 1);
        for r in 0..panel.matrix.rows() {
            for c in 0..panel.matrix.cols() {
                grid[r0 + r][c0 + c] = panel.matrix.get(r, c).unwrap_or(f64::NAN);
            }
        }
    }
    grid
}

fn write_composite_matrix(path: &Path, grid: &[Vec<f64>]) -> Result<(), EngineError> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| render_error(path, e))?;
    for row in grid {
        let fields = row
            .iter()
            .map(|v| if v.is_finite() { v.to_string() } else { String::new() });
        writer.write_record(fields).map_err(|e| render_error(path, e))?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes every artifact under an [`ArtifactLayout`].
#[derive(Debug, Clone)]
pub struct FileRenderer {
    artifacts: ArtifactLayout,
    pub write_subplots: bool,
    pub write_composite_matrix: bool,
}

impl FileRenderer {
    pub fn new(artifacts: ArtifactLayout) -> Self {
        Self {
            artifacts,
            write_subplots: true,
            write_composite_matrix: true,
        }
    }
}

impl Renderer for FileRenderer {
    fn write_histogram(
        &mut self,
        element: &ElementKey,
        sample: &str,
        histogram: &Histogram,
    ) -> Result<(), EngineError> {
        let path = self.artifacts.histogram(element, sample);
        let edges = histogram.bin_edges();
        let mut out = Vec::new();
        writeln!(out, "bin_start\tbin_end\tcount")?;
        for (i, count) in histogram.counts.iter().enumerate() {
            writeln!(out, "{}\t{}\t{}", edges[i], edges[i + 1], count)?;
        }
        write_text(&path, &String::from_utf8_lossy(&out))?;
        Ok(())
    }

    fn write_statistics(
        &mut self,
        element: &ElementKey,
        panels: &[SamplePanel],
    ) -> Result<(), EngineError> {
        let path = self.artifacts.statistics(element);
        write_statistics_csv(&path, panels).map_err(|e| render_error(&path, e))
    }

    fn render_composite(&mut self, request: &CompositeRequest<'_>) -> Result<(), EngineError> {
        let element = request.element;
        std::fs::create_dir_all(self.artifacts.element_dir(element))?;

        // scale bar measured on the last panel as drawn, downsampling included
        let reference_px = request.panels.last().map(|p| p.pixel_size_um).unwrap_or(0.0);
        let bar_px = scale_bar_px(request.scale_bar_um, reference_px);

        if self.write_subplots {
            for panel in request.panels {
                let path = self.artifacts.subplot(element, &panel.sample);
                if has_content(&path) {
                    continue;
                }
                save_png(&render_panel(panel, request.transform, request.colormap), &path)?;
            }
        }

        let colorbar_path = self.artifacts.colorbar(element);
        let mut colorbar = RgbImage::new(COLORBAR_WIDTH, 256);
        paint_colorbar(&mut colorbar, 0, 0, COLORBAR_WIDTH, 256, request.colormap);
        save_png(&colorbar, &colorbar_path)?;

        if self.write_composite_matrix {
            let grid = composite_matrix(request.panels, request.layout);
            write_composite_matrix(&self.artifacts.composite_matrix(element), &grid)?;
        }

        let manifest = build_manifest(request, bar_px);
        let manifest_path = self.artifacts.manifest(element);
        let json = serde_json::to_string_pretty(&manifest).map_err(|e| render_error(&manifest_path, e))?;
        write_text(&manifest_path, &json)?;

        // the composite goes last: its presence marks the element complete
        let composite_path = self.artifacts.composite(element);
        save_png(&compose_image(request, bar_px), &composite_path)?;
        tracing::info!(path = %composite_path.display(), "composite written");
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/report/render.rs"]
mod tests;
