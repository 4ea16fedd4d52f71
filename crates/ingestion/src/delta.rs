//! Per-interval differences between adjacent accumulated grids.

use crate::error::{IngestionError, Result};
use crate::grid::{DeltaGrid, Grid};

/// Difference `current - previous`, cell by cell.
///
/// Without a `previous` grid the output is `current` itself. Any cell that
/// is not finite afterwards (a missing operand, an overflow) is written as
/// `empty_value`. The inputs are taken as given: callers are responsible
/// for passing catalog-adjacent grids in order.
pub fn compute_delta(
    current: &Grid,
    previous: Option<&Grid>,
    empty_value: f32,
) -> Result<DeltaGrid> {
    let fill = |v: f32| if v.is_finite() { v } else { empty_value };

    let values: Vec<f32> = match previous {
        None => current.values().iter().map(|&v| fill(v)).collect(),
        Some(previous) => {
            if !current.same_shape(previous) {
                return Err(IngestionError::GridMismatch {
                    current_rows: current.rows(),
                    current_cols: current.cols(),
                    previous_rows: previous.rows(),
                    previous_cols: previous.cols(),
                });
            }
            current
                .values()
                .iter()
                .zip(previous.values())
                .map(|(&c, &p)| fill(c - p))
                .collect()
        }
    };

    DeltaGrid::new(current.rows(), current.cols(), values)
}

/// Carries the previous grid forward so each push yields the delta against
/// the entry right before it.
#[derive(Debug)]
pub struct DeltaAccumulator {
    baseline: Option<Grid>,
    empty_value: f32,
}

impl DeltaAccumulator {
    pub fn new(empty_value: f32) -> Self {
        Self {
            baseline: None,
            empty_value,
        }
    }

    pub fn has_baseline(&self) -> bool {
        self.baseline.is_some()
    }

    /// Feed the next grid in order.
    ///
    /// The first grid only becomes the baseline and yields `None`. On error
    /// the baseline is left untouched.
    pub fn push(&mut self, grid: Grid) -> Result<Option<DeltaGrid>> {
        let delta = match &self.baseline {
            None => None,
            Some(previous) => Some(compute_delta(&grid, Some(previous), self.empty_value)?),
        };
        self.baseline = Some(grid);
        Ok(delta)
    }

    /// Forget the baseline; the next push starts a new series.
    pub fn reset(&mut self) {
        self.baseline = None;
    }
}
