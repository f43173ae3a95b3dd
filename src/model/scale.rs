use serde::{Deserialize, Serialize};

use crate::model::matrix::ElementKey;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleMode {
    AutoPercentile,
    UserFixed,
    Log,
    Ecdf,
}

/// Recorded in each composite manifest; a composite built under a different
/// config is stale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleConfig {
    pub mode: ScaleMode,
    pub value: Option<f64>,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            mode: ScaleMode::AutoPercentile,
            value: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformKind {
    Linear,
    Log1p,
    Ecdf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedScale {
    pub element: ElementKey,
    pub max: f64,
    pub transform: TransformKind,
    /// Sample whose p99 set the ceiling, when the ceiling was derived.
    pub source_sample: Option<String>,
}
