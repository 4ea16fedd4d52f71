//! Pipeline configuration.
//!
//! Every tunable of a run lives in [`PipelineConfig`], loaded from YAML with
//! defaults for anything left out:
//!
//! ```yaml
//! base_url: https://opendata.dwd.de/weather/nwp/icon-d2/grib/12/tot_prec/
//! cache_dir: .cache
//! output_root: /data/wgf4
//! max_concurrent_downloads: 8
//! processing:
//!   on_failure: skip
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{IngestionError, Result};

/// Sentinel written for cells without a valid delta.
pub const EMPTY_VALUE: f32 = -100500.0;

/// Multiplier turning degrees into the integer header units.
pub const COORDINATE_SCALE: f64 = 1_000_000.0;

/// Configuration for a single ingestion run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory listing that holds the source files (also the prefix for
    /// each entry's URL).
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Substring an index entry must contain to be selected.
    #[serde(default = "default_projection_marker")]
    pub projection_marker: String,
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,
    /// Model directory name under `output_root`.
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_output_file_name")]
    pub output_file_name: String,
    #[serde(default = "default_empty_value")]
    pub empty_value: f32,
    #[serde(default = "default_coordinate_scale")]
    pub coordinate_scale: f64,
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,
    /// Per-request timeout; unset keeps the HTTP client default.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default = "RetryConfig::fetch_default")]
    pub fetch_retry: RetryConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
}

fn default_base_url() -> String {
    "https://opendata.dwd.de/weather/nwp/icon-d2/grib/12/tot_prec/".to_string()
}

fn default_projection_marker() -> String {
    "regular-lat-lon".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from(".cache")
}

fn default_output_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_model() -> String {
    "icon_d2".to_string()
}

fn default_output_file_name() -> String {
    "PRATE.wgf4".to_string()
}

fn default_empty_value() -> f32 {
    EMPTY_VALUE
}

fn default_coordinate_scale() -> f64 {
    COORDINATE_SCALE
}

fn default_max_concurrent_downloads() -> usize {
    8
}

fn is_path_separator(c: char) -> bool {
    c == '/' || c == '\\'
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            projection_marker: default_projection_marker(),
            cache_dir: default_cache_dir(),
            output_root: default_output_root(),
            model: default_model(),
            output_file_name: default_output_file_name(),
            empty_value: default_empty_value(),
            coordinate_scale: default_coordinate_scale(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            request_timeout_secs: None,
            fetch_retry: RetryConfig::fetch_default(),
            processing: ProcessingConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| IngestionError::filesystem(path, e))?;
        let config: PipelineConfig = serde_yaml::from_str(&content).map_err(|e| {
            IngestionError::Config(format!("Failed to parse {}: {}", path.display(), e))
        })?;

        info!(path = %path.display(), "Loaded pipeline config");
        Ok(config)
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(IngestionError::Config(format!(
                "base_url must be an http(s) URL, got '{}'",
                self.base_url
            )));
        }
        if self.projection_marker.is_empty() {
            return Err(IngestionError::Config(
                "projection_marker must not be empty".to_string(),
            ));
        }
        if self.model.is_empty() || self.model.contains(is_path_separator) {
            return Err(IngestionError::Config(format!(
                "model must be a single path component, got '{}'",
                self.model
            )));
        }
        if self.output_file_name.is_empty() || self.output_file_name.contains(is_path_separator) {
            return Err(IngestionError::Config(format!(
                "output_file_name must be a plain file name, got '{}'",
                self.output_file_name
            )));
        }
        if !(self.coordinate_scale.is_finite() && self.coordinate_scale > 0.0) {
            return Err(IngestionError::Config(
                "coordinate_scale must be a positive number".to_string(),
            ));
        }
        if self.max_concurrent_downloads == 0 {
            return Err(IngestionError::Config(
                "max_concurrent_downloads must be at least 1".to_string(),
            ));
        }
        self.fetch_retry.validate("fetch_retry")?;
        self.processing.retry.validate("processing.retry")?;
        Ok(())
    }

    /// URL of the directory index.
    pub fn index_url(&self) -> String {
        format!("{}/", self.base_url.trim_end_matches('/'))
    }
}

/// Retry settings as they appear in configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_multiplier() -> f64 {
    2.0
}

impl RetryConfig {
    /// Downloads: ten attempts, fixed two second pause.
    pub fn fetch_default() -> Self {
        Self {
            max_attempts: 10,
            initial_delay_ms: 2_000,
            max_delay_ms: 2_000,
            multiplier: 1.0,
        }
    }

    /// Processing steps: three attempts, doubling from one second.
    pub fn processing_default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            multiplier: 2.0,
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.max_attempts == 0 {
            return Err(IngestionError::Config(format!(
                "{}.max_attempts must be at least 1",
                name
            )));
        }
        if !(self.multiplier.is_finite() && self.multiplier >= 1.0) {
            return Err(IngestionError::Config(format!(
                "{}.multiplier must be >= 1.0",
                name
            )));
        }
        if self.max_delay_ms < self.initial_delay_ms {
            return Err(IngestionError::Config(format!(
                "{}.max_delay_ms must not be below initial_delay_ms",
                name
            )));
        }
        Ok(())
    }
}

/// What to do with an entry whose processing keeps failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnFailure {
    /// Stop the run.
    #[default]
    Abort,
    /// Drop the entry and start a fresh baseline with the next one.
    Skip,
}

/// Failure policy for the sequential Load, Delta and Write steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingConfig {
    #[serde(default = "RetryConfig::processing_default")]
    pub retry: RetryConfig,
    #[serde(default)]
    pub on_failure: OnFailure,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::processing_default(),
            on_failure: OnFailure::Abort,
        }
    }
}
