use serde::Serialize;

/// Descriptive statistics over the valid pixels of one matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct StatisticsRecord {
    pub p25: f64,
    pub p50: f64,
    pub p75: f64,
    pub p99: f64,
    pub iqr: f64,
    pub mean: f64,
    pub n_valid: usize,
}
