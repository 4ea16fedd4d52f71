//! Accumulated precipitation ingestion.
//!
//! Turns a published series of accumulated precipitation forecasts into
//! per-interval `wgf4` grid files:
//!
//! 1. [`SourceCatalog`] reads the provider's directory index
//! 2. [`CacheStore`] fetches and decompresses every entry once, in parallel
//! 3. [`GridLoader`] decodes cached files in catalog order
//! 4. [`DeltaAccumulator`] differences each grid against the previous one
//! 5. [`GridWriter`] writes the result under a valid-time directory
//!
//! [`Pipeline`] runs these stages end to end.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod delta;
pub mod error;
pub mod fetch;
pub mod grid;
pub mod loader;
pub mod pipeline;
pub mod retry;
pub mod wgf4;

// Re-exports
pub use cache::{CacheOutcome, CacheStore};
pub use catalog::{parse_index, Compression, SourceCatalog, SourceEntry};
pub use config::{OnFailure, PipelineConfig, ProcessingConfig, RetryConfig, EMPTY_VALUE};
pub use delta::{compute_delta, DeltaAccumulator};
pub use error::{IngestionError, Result};
pub use fetch::{Fetcher, HttpClient, ReqwestClient};
pub use grid::{DeltaGrid, Grid, GridMetadata};
pub use loader::{Grib2GridLoader, GridLoader};
pub use pipeline::{Pipeline, PipelineStage, RunSummary};
pub use retry::RetryPolicy;
pub use wgf4::{serialize_header, GridWriter};
