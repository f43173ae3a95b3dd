use std::collections::HashMap;

use crate::error::EngineError;
use crate::model::matrix::{ElementKey, Matrix};
use crate::model::stats::StatisticsRecord;

pub const HISTOGRAM_BINS: usize = 50;

/// Percentile of sorted values, linear interpolation between order statistics.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let pos = (p / 100.0).clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

fn sorted_valid(matrix: &Matrix) -> Vec<f64> {
    let mut values = matrix.valid_values().collect::<Vec<_>>();
    values.sort_by(|a, b| a.total_cmp(b));
    values
}

pub fn compute(matrix: &Matrix) -> Result<StatisticsRecord, EngineError> {
    let sorted = sorted_valid(matrix);
    if sorted.is_empty() {
        return Err(EngineError::EmptyData(format!(
            "{}x{} matrix has no valid pixels",
            matrix.rows(),
            matrix.cols()
        )));
    }
    let p25 = percentile_sorted(&sorted, 25.0);
    let p50 = percentile_sorted(&sorted, 50.0);
    let p75 = percentile_sorted(&sorted, 75.0);
    let p99 = percentile_sorted(&sorted, 99.0);
    let mean = sorted.iter().sum::<f64>() / sorted.len() as f64;
    Ok(StatisticsRecord {
        p25,
        p50,
        p75,
        p99,
        iqr: p75 - p25,
        mean,
        n_valid: sorted.len(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub lower: f64,
    pub upper: f64,
    pub counts: Vec<u64>,
}

impl Histogram {
    pub fn bin_edges(&self) -> Vec<f64> {
        let n = self.counts.len();
        let width = (self.upper - self.lower) / n as f64;
        (0..=n).map(|i| self.lower + width * i as f64).collect()
    }
}

/// Counts valid pixels in `bins` equal bins over `[0, upper]`; values above
/// `upper` are left out.
pub fn histogram(matrix: &Matrix, bins: usize, upper: f64) -> Histogram {
    let bins = bins.max(1);
    let upper = if upper.is_finite() && upper > 0.0 {
        upper
    } else {
        1.0
    };
    let mut counts = vec![0u64; bins];
    for v in matrix.valid_values() {
        if v > upper {
            continue;
        }
        let idx = ((v / upper) * bins as f64) as usize;
        counts[idx.min(bins - 1)] += 1;
    }
    Histogram {
        lower: 0.0,
        upper,
        counts,
    }
}

/// Records per (sample, element), valid only for the matrix content they were
/// computed from.
#[derive(Debug, Default)]
pub struct StatisticsCache {
    entries: HashMap<(String, ElementKey), (u64, StatisticsRecord)>,
    computed: usize,
}

impl StatisticsCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(
        &self,
        sample: &str,
        element: &ElementKey,
        matrix: &Matrix,
    ) -> Option<StatisticsRecord> {
        let (fingerprint, record) = self.entries.get(&(sample.to_string(), element.clone()))?;
        (*fingerprint == matrix.fingerprint()).then_some(*record)
    }

    pub fn get_or_compute(
        &mut self,
        sample: &str,
        element: &ElementKey,
        matrix: &Matrix,
    ) -> Result<StatisticsRecord, EngineError> {
        if let Some(record) = self.get(sample, element, matrix) {
            return Ok(record);
        }
        let record = compute(matrix)?;
        self.computed += 1;
        self.entries.insert(
            (sample.to_string(), element.clone()),
            (matrix.fingerprint(), record),
        );
        Ok(record)
    }

    /// Number of fresh computations since construction.
    pub fn computed(&self) -> usize {
        self.computed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage1_statistics.rs"]
mod tests;
