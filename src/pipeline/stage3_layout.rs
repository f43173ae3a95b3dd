use crate::error::EngineError;
use crate::model::config::LayoutConfig;
use crate::model::layout::{CellAssignment, LayoutPlan};

fn assign_cells(sample_count: usize, rows: usize, cols: usize) -> LayoutPlan {
    let cells = (0..sample_count)
        .map(|index| CellAssignment {
            row: index / cols,
            col: index % cols,
            index,
        })
        .collect();
    LayoutPlan { rows, cols, cells }
}

fn aspect_distance(rows: usize, cols: usize, target_aspect: f64) -> f64 {
    let target = if target_aspect.is_finite() && target_aspect > 0.0 {
        target_aspect
    } else {
        1.0
    };
    ((cols as f64 / rows as f64).ln() - target.ln()).abs()
}

/// Grid with the fewest empty cells; ties go to the shape nearest the target
/// aspect ratio (compared on a log scale), then to fewer rows.
pub fn auto_rows(sample_count: usize, target_aspect: f64) -> usize {
    let mut best_rows = 1usize;
    let mut best_empty = usize::MAX;
    let mut best_distance = f64::INFINITY;
    for rows in 1..=sample_count.max(1) {
        let cols = sample_count.div_ceil(rows).max(1);
        let empty = rows * cols - sample_count;
        let distance = aspect_distance(rows, cols, target_aspect);
        if empty < best_empty || (empty == best_empty && distance < best_distance) {
            best_rows = rows;
            best_empty = empty;
            best_distance = distance;
        }
    }
    best_rows
}

pub fn plan(sample_count: usize, config: &LayoutConfig) -> Result<LayoutPlan, EngineError> {
    if sample_count == 0 {
        return Err(EngineError::EmptyData("no samples to lay out".to_string()));
    }
    let rows = match config.user_rows {
        Some(0) => {
            return Err(EngineError::LayoutOverflow {
                rows: 0,
                samples: sample_count,
            });
        }
        Some(rows) if rows > sample_count => {
            if !config.auto_fallback {
                return Err(EngineError::LayoutOverflow {
                    rows,
                    samples: sample_count,
                });
            }
            tracing::debug!(rows, samples = sample_count, "requested rows clamped to sample count");
            sample_count
        }
        Some(rows) => rows,
        None => auto_rows(sample_count, config.target_aspect),
    };
    let cols = sample_count.div_ceil(rows);
    Ok(assign_cells(sample_count, rows, cols))
}

#[cfg(test)]
#[path = "../../tests/src_inline/pipeline/stage3_layout.rs"]
mod tests;
