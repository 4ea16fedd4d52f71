//! Error types for the ingestion crate.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while ingesting a forecast series.
#[derive(Error, Debug)]
pub enum IngestionError {
    #[error("HTTP {status} from {url}")]
    Http { url: String, status: u16 },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Giving up on {url} after {attempts} attempts: {source}")]
    Network {
        url: String,
        attempts: u32,
        #[source]
        source: Box<IngestionError>,
    },

    #[error("Failed to create HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),

    #[error("Failed to decode {}: {source}", path.display())]
    Decode {
        path: PathBuf,
        #[source]
        source: grib2_parser::Grib2Error,
    },

    #[error("Filesystem error at {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Decompression of {entry} failed: {reason}")]
    Decompression { entry: String, reason: String },

    #[error(
        "Grid shape mismatch: current is {current_rows}x{current_cols}, previous is {previous_rows}x{previous_cols}"
    )]
    GridMismatch {
        current_rows: usize,
        current_cols: usize,
        previous_rows: usize,
        previous_cols: usize,
    },

    #[error("Invalid grid: {0}")]
    InvalidGrid(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Processing {entry} failed after {attempts} attempts: {source}")]
    Processing {
        entry: String,
        attempts: u32,
        #[source]
        source: Box<IngestionError>,
    },

    #[error("Background task failed: {0}")]
    TaskJoin(String),
}

impl IngestionError {
    pub(crate) fn filesystem(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        IngestionError::Filesystem {
            path: path.into(),
            source,
        }
    }

    /// Whether another attempt at the same operation may succeed.
    ///
    /// Network and filesystem hiccups are transient; decode and structural
    /// errors will fail the same way every time.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IngestionError::Http { .. }
                | IngestionError::Transport { .. }
                | IngestionError::Filesystem { .. }
        )
    }
}

impl From<tokio::task::JoinError> for IngestionError {
    fn from(err: tokio::task::JoinError) -> Self {
        IngestionError::TaskJoin(err.to_string())
    }
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
