use std::collections::BTreeMap;
use std::time::Duration;

use crate::model::matrix::ElementKey;
use crate::model::scale::ScaleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorMap {
    Jet,
    Viridis,
    Hot,
    Gray,
}

impl ColorMap {
    pub fn parse(s: &str) -> Option<ColorMap> {
        match s.to_ascii_lowercase().as_str() {
            "jet" => Some(ColorMap::Jet),
            "viridis" => Some(ColorMap::Viridis),
            "hot" => Some(ColorMap::Hot),
            "gray" | "grey" => Some(ColorMap::Gray),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LayoutConfig {
    pub user_rows: Option<usize>,
    pub auto_fallback: bool,
    /// Preferred cols/rows ratio for breaking ties between equally full grids.
    pub target_aspect: f64,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            user_rows: None,
            auto_fallback: true,
            target_aspect: 1.3,
        }
    }
}

/// Everything a batch run reads. Built once, never mutated during the run.
#[derive(Debug, Clone)]
pub struct BatchConfig {
    pub scale: ScaleConfig,
    pub layout: LayoutConfig,
    pub pixel_size_um: f64,
    pub custom_pixel_sizes: BTreeMap<String, f64>,
    pub scale_bar_um: f64,
    /// Empty means every discovered element.
    pub elements: Vec<ElementKey>,
    /// Composites with more samples than this are rendered from downsampled maps.
    pub downsample_above: usize,
    pub downsample_target: usize,
    pub colormap: ColorMap,
    pub log_floor: f64,
    pub progress_interval: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            scale: ScaleConfig::default(),
            layout: LayoutConfig::default(),
            pixel_size_um: 6.0,
            custom_pixel_sizes: BTreeMap::new(),
            scale_bar_um: 500.0,
            elements: Vec::new(),
            downsample_above: 10,
            downsample_target: 512,
            colormap: ColorMap::Jet,
            log_floor: 1.0,
            progress_interval: Duration::from_millis(100),
        }
    }
}

impl BatchConfig {
    /// Custom table entry, then the sample's own override, then the global size.
    pub fn pixel_size_for(&self, sample: &str, sample_override: Option<f64>) -> f64 {
        self.custom_pixel_sizes
            .get(sample)
            .copied()
            .or(sample_override)
            .unwrap_or(self.pixel_size_um)
    }

    pub fn wants_element(&self, element: &ElementKey) -> bool {
        self.elements.is_empty() || self.elements.contains(element)
    }
}
