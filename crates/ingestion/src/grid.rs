//! In-memory grid types.

use chrono::{DateTime, Utc};

use crate::error::{IngestionError, Result};

/// Geodetic extent, spacing and valid time of a regular lat/lon grid.
#[derive(Debug, Clone, PartialEq)]
pub struct GridMetadata {
    pub lat_first: f64,
    pub lat_last: f64,
    pub lon_first: f64,
    pub lon_last: f64,
    /// Spacing along a row (longitude), degrees.
    pub i_increment: f64,
    /// Spacing between rows (latitude), degrees.
    pub j_increment: f64,
    pub valid_time: DateTime<Utc>,
}

/// A decoded field in row-major order. Missing cells are `NaN`.
#[derive(Debug, Clone, PartialEq)]
pub struct Grid {
    rows: usize,
    cols: usize,
    values: Vec<f32>,
    metadata: GridMetadata,
}

impl Grid {
    pub fn new(rows: usize, cols: usize, values: Vec<f32>, metadata: GridMetadata) -> Result<Self> {
        check_len(rows, cols, values.len())?;
        Ok(Self {
            rows,
            cols,
            values,
            metadata,
        })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn metadata(&self) -> &GridMetadata {
        &self.metadata
    }

    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row < self.rows && col < self.cols {
            Some(self.values[row * self.cols + col])
        } else {
            None
        }
    }

    pub fn same_shape(&self, other: &Grid) -> bool {
        self.rows == other.rows && self.cols == other.cols
    }
}

/// Difference between two adjacent grids, invalid cells already replaced
/// by the sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct DeltaGrid {
    rows: usize,
    cols: usize,
    values: Vec<f32>,
}

impl DeltaGrid {
    pub fn new(rows: usize, cols: usize, values: Vec<f32>) -> Result<Self> {
        check_len(rows, cols, values.len())?;
        Ok(Self { rows, cols, values })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Rows in storage order.
    pub fn row_iter(&self) -> impl Iterator<Item = &[f32]> {
        // chunks(0) panics; an empty grid simply has no rows
        self.values.chunks(self.cols.max(1)).take(self.rows)
    }
}

fn check_len(rows: usize, cols: usize, len: usize) -> Result<()> {
    if rows.checked_mul(cols) != Some(len) {
        return Err(IngestionError::InvalidGrid(format!(
            "{} x {} grid cannot hold {} values",
            rows, cols, len
        )));
    }
    Ok(())
}
