use std::cmp::Ordering;
use std::fmt;

use serde::Serialize;

/// Intensity unit of a concentration map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Unit {
    Ppm,
    Cps,
    Counts,
}

impl Unit {
    /// Folder and file-name form. Raw detector counts are tagged `raw`.
    pub fn as_str(self) -> &'static str {
        match self {
            Unit::Ppm => "ppm",
            Unit::Cps => "CPS",
            Unit::Counts => "raw",
        }
    }

    pub fn parse(s: &str) -> Option<Unit> {
        match s {
            "ppm" | "PPM" => Some(Unit::Ppm),
            "CPS" | "cps" => Some(Unit::Cps),
            "raw" | "counts" => Some(Unit::Counts),
            _ => None,
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An element channel. ppm and CPS maps of the same symbol are distinct keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct ElementKey {
    pub symbol: String,
    pub unit: Unit,
}

impl ElementKey {
    pub fn new(symbol: impl Into<String>, unit: Unit) -> Self {
        Self {
            symbol: symbol.into(),
            unit,
        }
    }

    /// `Fe56_ppm`, used for the per-element output folder.
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.symbol, self.unit.as_str())
    }

    fn symbol_sort_key(&self) -> (&str, u32) {
        let digits = self
            .symbol
            .bytes()
            .rev()
            .take_while(|b| b.is_ascii_digit())
            .count();
        let split = self.symbol.len() - digits;
        if digits == 0 || split == 0 {
            return (self.symbol.as_str(), 0);
        }
        let mass = self.symbol[split..].parse::<u32>().unwrap_or(0);
        (&self.symbol[..split], mass)
    }
}

impl fmt::Display for ElementKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.symbol, self.unit.as_str())
    }
}

impl Ord for ElementKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.unit
            .cmp(&other.unit)
            .then_with(|| self.symbol_sort_key().cmp(&other.symbol_sort_key()))
            .then_with(|| self.symbol.cmp(&other.symbol))
    }
}

impl PartialOrd for ElementKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Row-major 2-D intensity map. `NaN` marks a missing pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    values: Vec<f64>,
    unit: Unit,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, values: Vec<f64>, unit: Unit) -> Option<Self> {
        if rows.checked_mul(cols)? != values.len() {
            return None;
        }
        Some(Self {
            rows,
            cols,
            values,
            unit,
        })
    }

    /// Builds from equally sized rows; returns `None` for ragged input.
    pub fn from_rows(rows: Vec<Vec<f64>>, unit: Unit) -> Option<Self> {
        let n_rows = rows.len();
        let n_cols = rows.first().map(|r| r.len()).unwrap_or(0);
        if rows.iter().any(|r| r.len() != n_cols) {
            return None;
        }
        let values = rows.into_iter().flatten().collect();
        Self::new(n_rows, n_cols, values, unit)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn unit(&self) -> Unit {
        self.unit
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f64> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        Some(self.values[row * self.cols + col])
    }

    pub fn valid_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().copied().filter(|v| v.is_finite())
    }

    pub fn n_valid(&self) -> usize {
        self.valid_values().count()
    }

    /// Content hash over shape, unit and value bits.
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = Fnv64::new();
        hasher.update(&(self.rows as u64).to_le_bytes());
        hasher.update(&(self.cols as u64).to_le_bytes());
        hasher.update(self.unit.as_str().as_bytes());
        for v in &self.values {
            hasher.update(&v.to_bits().to_le_bytes());
        }
        hasher.finish()
    }

    /// Block edge used by [`Matrix::downsample`]; 1 when the map is kept as is.
    pub fn downsample_factor(&self, target_max: usize) -> usize {
        let longest = self.rows.max(self.cols);
        if target_max == 0 || longest <= target_max {
            return 1;
        }
        (longest / target_max).max(1)
    }

    /// Block-averages so the longer side is at most about `target_max`.
    /// Missing pixels are ignored; an all-missing block stays missing.
    /// One output pixel spans [`Matrix::downsample_factor`] input pixels per side.
    pub fn downsample(&self, target_max: usize) -> Matrix {
        let factor = self.downsample_factor(target_max);
        if factor == 1 {
            return self.clone();
        }
        let out_rows = self.rows.div_ceil(factor);
        let out_cols = self.cols.div_ceil(factor);
        let mut values = Vec::with_capacity(out_rows * out_cols);
        for br in 0..out_rows {
            for bc in 0..out_cols {
                let mut sum = 0.0;
                let mut n = 0usize;
                for r in br * factor..((br + 1) * factor).min(self.rows) {
                    for c in bc * factor..((bc + 1) * factor).min(self.cols) {
                        let v = self.values[r * self.cols + c];
                        if v.is_finite() {
                            sum += v;
                            n += 1;
                        }
                    }
                }
                values.push(if n == 0 { f64::NAN } else { sum / n as f64 });
            }
        }
        Matrix {
            rows: out_rows,
            cols: out_cols,
            values,
            unit: self.unit,
        }
    }
}

struct Fnv64 {
    hash: u64,
}

impl Fnv64 {
    fn new() -> Self {
        Self {
            hash: 0xcbf29ce484222325,
        }
    }

    fn update(&mut self, data: &[u8]) {
        let mut h = self.hash;
        for &b in data {
            h ^= b as u64;
            h = h.wrapping_mul(0x100000001b3);
        }
        self.hash = h;
    }

    fn finish(&self) -> u64 {
        self.hash
    }
}

#[cfg(test)]
#[path = "../../tests/src_inline/model/matrix.rs"]
mod tests;
