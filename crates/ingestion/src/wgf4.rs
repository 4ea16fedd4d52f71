//! `wgf4` binary grid output.
//!
//! Layout, native byte order, no padding:
//!
//! | Offset | Size | Content |
//! |--------|------|---------|
//! | 0 | 7 × i32 | lat_first, lat_last, lon_first, lon_last, i_increment, j_increment (× scale, rounded), 1 |
//! | 28 | f32 | sentinel for cells without data |
//! | 32 | rows × cols × f32 | values, row-major |

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::{debug, instrument};

use crate::config::PipelineConfig;
use crate::error::{IngestionError, Result};
use crate::grid::{DeltaGrid, GridMetadata};

pub const HEADER_LEN: usize = 28;
pub const SENTINEL_LEN: usize = 4;

/// Total file size for a grid with `cells` values.
pub fn file_len(cells: usize) -> usize {
    HEADER_LEN + SENTINEL_LEN + cells * 4
}

/// The seven header integers in file order.
pub fn header_values(metadata: &GridMetadata, scale: f64) -> [i32; 7] {
    // `as` saturates on out-of-range values
    let scaled = |v: f64| (v * scale).round() as i32;
    [
        scaled(metadata.lat_first),
        scaled(metadata.lat_last),
        scaled(metadata.lon_first),
        scaled(metadata.lon_last),
        scaled(metadata.i_increment),
        scaled(metadata.j_increment),
        1,
    ]
}

pub fn serialize_header(metadata: &GridMetadata, scale: f64) -> [u8; HEADER_LEN] {
    let mut header = [0u8; HEADER_LEN];
    for (chunk, value) in header
        .chunks_exact_mut(4)
        .zip(header_values(metadata, scale))
    {
        chunk.copy_from_slice(&value.to_ne_bytes());
    }
    header
}

/// Full file contents: header, sentinel, then the rows.
pub fn encode(header: &[u8; HEADER_LEN], delta: &DeltaGrid, empty_value: f32) -> Vec<u8> {
    let mut out = Vec::with_capacity(file_len(delta.values().len()));
    out.extend_from_slice(header);
    out.extend_from_slice(&empty_value.to_ne_bytes());
    for row in delta.row_iter() {
        for value in row {
            out.extend_from_slice(&value.to_ne_bytes());
        }
    }
    out
}

/// Output directory name for a valid time: `dd:mm:YYYY_HH:MM_<unix seconds>`.
pub fn valid_time_dir_name(valid_time: DateTime<Utc>) -> String {
    format!(
        "{}_{}",
        valid_time.format("%d:%m:%Y_%H:%M"),
        valid_time.timestamp()
    )
}

/// Writes delta grids into the per-valid-time output tree.
#[derive(Debug, Clone)]
pub struct GridWriter {
    output_root: PathBuf,
    model: String,
    file_name: String,
    empty_value: f32,
}

impl GridWriter {
    pub fn new(
        output_root: impl Into<PathBuf>,
        model: impl Into<String>,
        file_name: impl Into<String>,
        empty_value: f32,
    ) -> Self {
        Self {
            output_root: output_root.into(),
            model: model.into(),
            file_name: file_name.into(),
            empty_value,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            &config.output_root,
            &config.model,
            &config.output_file_name,
            config.empty_value,
        )
    }

    /// `<output_root>/<model>/<valid time dir>`
    pub fn output_dir(&self, valid_time: DateTime<Utc>) -> PathBuf {
        self.output_root
            .join(&self.model)
            .join(valid_time_dir_name(valid_time))
    }

    /// Write one grid file into `output_dir`, creating it if needed.
    /// Returns the path of the written file.
    #[instrument(skip(self, header, delta), fields(dir = %output_dir.display()))]
    pub async fn write(
        &self,
        output_dir: &Path,
        header: &[u8; HEADER_LEN],
        delta: &DeltaGrid,
    ) -> Result<PathBuf> {
        fs::create_dir_all(output_dir)
            .await
            .map_err(|e| IngestionError::filesystem(output_dir, e))?;

        let path = output_dir.join(&self.file_name);
        let bytes = encode(header, delta, self.empty_value);
        fs::write(&path, &bytes)
            .await
            .map_err(|e| IngestionError::filesystem(&path, e))?;

        debug!(path = %path.display(), bytes = bytes.len(), "Wrote grid file");
        Ok(path)
    }
}
