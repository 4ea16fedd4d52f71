//! Decoding cached GRIB2 files into [`Grid`]s.

use std::path::Path;

use bytes::Bytes;
use chrono::{DurationRound, TimeDelta};
use grib2_parser::{Grib2Error, Grib2Message, Grib2Reader, ScanMode};
use tracing::debug;

use crate::error::{IngestionError, Result};
use crate::grid::{Grid, GridMetadata};

/// Produces a normalized grid from a cached file.
///
/// Implementations are synchronous; the pipeline calls them from a blocking
/// task.
pub trait GridLoader: Send + Sync {
    fn load(&self, path: &Path) -> Result<Grid>;
}

/// [`GridLoader`] for GRIB2 files on regular lat/lon grids.
///
/// Files carrying several lead times hold one message per step; the first
/// message is the field for the file's own lead hour. Single-message files
/// follow the same rule.
#[derive(Debug, Clone, Copy, Default)]
pub struct Grib2GridLoader;

impl GridLoader for Grib2GridLoader {
    fn load(&self, path: &Path) -> Result<Grid> {
        let data = std::fs::read(path).map_err(|e| IngestionError::filesystem(path, e))?;
        let decode = |source| IngestionError::Decode {
            path: path.to_path_buf(),
            source,
        };

        let mut reader = Grib2Reader::new(Bytes::from(data));
        let message = reader.next_message().map_err(decode)?.ok_or_else(|| {
            decode(Grib2Error::InvalidFormat("file contains no GRIB2 messages".to_string()))
        })?;

        let grid = grid_from_message(&message).map_err(decode)?;
        debug!(
            path = %path.display(),
            parameter = %message.parameter(),
            rows = grid.rows(),
            cols = grid.cols(),
            valid_time = %grid.metadata().valid_time,
            "Loaded grid"
        );
        Ok(grid)
    }
}

/// Build a row-major [`Grid`] from a parsed message.
pub fn grid_from_message(message: &Grib2Message) -> std::result::Result<Grid, Grib2Error> {
    let gd = &message.grid_definition;
    let (rows, cols) = message.grid_dims();
    if rows * cols != gd.num_data_points as usize {
        return Err(Grib2Error::InvalidSection {
            section: 3,
            reason: format!(
                "{} x {} grid declares {} data points",
                rows, cols, gd.num_data_points
            ),
        });
    }

    let valid_time = message
        .valid_time()?
        .duration_trunc(TimeDelta::seconds(1))
        .map_err(|e| Grib2Error::InvalidFormat(format!("Invalid valid time: {}", e)))?;

    let values = ScanMode::from_grib2_flag(gd.scanning_mode).to_row_major(
        message.unpack_data()?,
        rows,
        cols,
    );

    let metadata = GridMetadata {
        lat_first: gd.first_latitude(),
        lat_last: gd.last_latitude(),
        lon_first: gd.first_longitude(),
        lon_last: gd.last_longitude(),
        i_increment: gd.i_increment(),
        j_increment: gd.j_increment(),
        valid_time,
    };

    Grid::new(rows, cols, values, metadata)
        .map_err(|e| Grib2Error::InvalidFormat(e.to_string()))
}
