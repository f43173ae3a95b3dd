use crate::error::EngineError;
use crate::model::matrix::{ElementKey, Matrix};
use crate::model::scale::{ResolvedScale, ScaleConfig, ScaleMode, TransformKind};
use crate::model::stats::StatisticsRecord;

#[derive(Debug, Clone, Copy)]
pub struct SampleScaleInput<'a> {
    pub sample: &'a str,
    pub included: bool,
    pub stats: &'a StatisticsRecord,
}

fn validate_user_value(value: Option<f64>) -> Result<f64, EngineError> {
    match value {
        Some(v) if v.is_finite() && v > 0.0 => Ok(v),
        Some(v) => Err(EngineError::InvalidScale(v)),
        None => Err(EngineError::InvalidScale(f64::NAN)),
    }
}

/// Largest p99 among included samples, with the sample that holds it.
/// Ties keep the first sample in input order.
fn auto_percentile<'a>(
    element: &ElementKey,
    samples: &[SampleScaleInput<'a>],
) -> Result<(f64, &'a str), EngineError> {
    let mut best: Option<(f64, &str)> = None;
    for s in samples.iter().filter(|s| s.included) {
        if !s.stats.p99.is_finite() {
            continue;
        }
        if best.is_none_or(|(max, _)| s.stats.p99 > max) {
            best = Some((s.stats.p99, s.sample));
        }
    }
    best.ok_or_else(|| EngineError::EmptyData(format!("no included samples for {element}")))
}

/// Shared display ceiling for one element across a sample set.
pub fn resolve(
    element: &ElementKey,
    samples: &[SampleScaleInput<'_>],
    config: &ScaleConfig,
) -> Result<ResolvedScale, EngineError> {
    let transform = match config.mode {
        ScaleMode::AutoPercentile | ScaleMode::UserFixed => TransformKind::Linear,
        ScaleMode::Log => TransformKind::Log1p,
        ScaleMode::Ecdf => TransformKind::Ecdf,
    };

    let (max, source_sample) = match (config.mode, config.value) {
        (ScaleMode::UserFixed, value) => (validate_user_value(value)?, None),
        (ScaleMode::Log | ScaleMode::Ecdf, Some(value)) => {
            (validate_user_value(Some(value))?, None)
        }
        (ScaleMode::AutoPercentile | ScaleMode::Log | ScaleMode::Ecdf, _) => {
            let (max, sample) = auto_percentile(element, samples)?;
            (max, Some(sample.to_string()))
        }
    };

    Ok(ResolvedScale {
        element: element.clone(),
        max,
        transform,
        source_sample,
    })
}

/// Maps raw intensities onto the colormap domain `[0, 1]`.
pub trait IntensityTransform {
    fn kind(&self) -> TransformKind;

    /// `None` for missing pixels.
    fn normalize(&self, value: f64) -> Option<f64>;
}

#[derive(Debug, Clone, Copy)]
pub struct LinearTransform {
    pub max: f64,
}

impl IntensityTransform for LinearTransform {
    fn kind(&self) -> TransformKind {
        TransformKind::Linear
    }

    fn normalize(&self, value: f64) -> Option<f64> {
        if !value.is_finite() {
            return None;
        }
        if self.max <= 0.0 {
            return Some(0.0);
        }
        Some((value / self.max).clamp(0.0, 1.0))
    }
}

/// `log1p` scaling between `floor` and `max`; anything below the floor maps to 0.
#[derive(Debug, Clone, Copy)]
pub struct Log1pTransform {
    pub floor: f64,
    pub max: f64,
}

impl IntensityTransform for Log1pTransform {
    fn kind(&self) -> TransformKind {
        TransformKind::Log1p
    }

    fn normalize(&self, value: f64) -> Option<f64> {
        if !value.is_finite() {
            return None;
        }
        let floor = self.floor.max(0.0);
        let lo = floor.ln_1p();
        let hi = self.max.max(0.0).ln_1p();
        if hi <= lo {
            return Some(if value >= self.max { 1.0 } else { 0.0 });
        }
        let v = value.max(floor);
        Some(((v.ln_1p() - lo) / (hi - lo)).clamp(0.0, 1.0))
    }
}

/// Rank-based redistribution over the pooled pixels of the included samples,
/// capped at the shared scale maximum.
#[derive(Debug, Clone)]
pub struct EcdfTransform {
    sorted: Vec<f64>,
    max: f64,
    n_at_max: usize,
}

impl EcdfTransform {
    pub fn fit<'a>(matrices: impl IntoIterator<Item = &'a Matrix>, max: f64) -> Self {
        let mut sorted = matrices
            .into_iter()
            .flat_map(|m| m.valid_values())
            .collect::<Vec<_>>();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let n_at_max = sorted.partition_point(|&v| v <= max);
        Self {
            sorted,
            max,
            n_at_max,
        }
    }
}

impl IntensityTransform for EcdfTransform {
    fn kind(&self) -> TransformKind {
        TransformKind::Ecdf
    }

    fn normalize(&self, value: f64) -> Option<f64> {
        if !value.is_finite() {
            return None;
        }
        if value >= self.max || self.n_at_max == 0 {
            return Some(if value >= self.max { 1.0 } else { 0.0 });
        }
        let rank = self.sorted.partition_point(|&v| v <= value);
        Some((rank as f64 / self.n_at_max as f64).clamp(0.0, 1.0))
    }
}

pub fn build_transform<'a>(
    scale: &ResolvedScale,
    matrices: impl IntoIterator<Item = &'a Matrix>,
    log_floor: f64,
) -> Box<dyn IntensityTransform> {
    match scale.transform {
        TransformKind::Linear => Box::new(LinearTransform { max: scale.max }),
        TransformKind::Log1p => Box::new(Log1pTransform {
            floor: log_floor,
            max: scale.max,
        }),
        TransformKind::Ecdf => Box::new(EcdfTransform::fit(matrices, scale.max)),
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage2_scale.rs"]
mod tests;
