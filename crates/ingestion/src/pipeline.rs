//! Run orchestration: discover, cache everything, then process in order.

use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tracing::{debug, error, info, instrument, warn};

use crate::cache::{CacheOutcome, CacheStore};
use crate::catalog::{SourceCatalog, SourceEntry};
use crate::config::{OnFailure, PipelineConfig};
use crate::delta::DeltaAccumulator;
use crate::error::{IngestionError, Result};
use crate::fetch::{Fetcher, HttpClient, ReqwestClient};
use crate::grid::Grid;
use crate::loader::{Grib2GridLoader, GridLoader};
use crate::retry::{RetryExhausted, RetryPolicy};
use crate::wgf4::{serialize_header, GridWriter};

/// Stages of a run, entered in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Init,
    Discover,
    CacheAll,
    ProcessSequence,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Init => "init",
            PipelineStage::Discover => "discover",
            PipelineStage::CacheAll => "cache_all",
            PipelineStage::ProcessSequence => "process_sequence",
            PipelineStage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Counters and outputs of a completed run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    /// Entries listed by the index (before de-duplication).
    pub discovered: usize,
    pub cache_hits: usize,
    pub fetched: usize,
    pub written: usize,
    pub skipped: usize,
    /// Written files in processing order.
    pub outputs: Vec<PathBuf>,
}

/// One ingestion run over everything currently published.
pub struct Pipeline {
    config: PipelineConfig,
    catalog: SourceCatalog,
    cache: CacheStore,
    loader: Arc<dyn GridLoader>,
    writer: GridWriter,
    processing_retry: RetryPolicy,
}

impl Pipeline {
    /// Wire a pipeline from a validated config and the given collaborators.
    pub fn new(
        config: PipelineConfig,
        client: Arc<dyn HttpClient>,
        loader: Arc<dyn GridLoader>,
    ) -> Result<Self> {
        config.validate()?;

        let fetcher = Arc::new(Fetcher::new(client, RetryPolicy::from(&config.fetch_retry)));
        let catalog = SourceCatalog::new(
            config.index_url(),
            config.projection_marker.clone(),
            Arc::clone(&fetcher),
        );
        let cache = CacheStore::new(config.cache_dir.clone(), config.index_url(), fetcher);
        let writer = GridWriter::from_config(&config);
        let processing_retry = RetryPolicy::from(&config.processing.retry);

        Ok(Self {
            config,
            catalog,
            cache,
            loader,
            writer,
            processing_retry,
        })
    }

    /// Production wiring: `reqwest` client and the GRIB2 loader.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let client = ReqwestClient::new(config.request_timeout_secs.map(Duration::from_secs))?;
        Self::new(config, Arc::new(client), Arc::new(Grib2GridLoader))
    }

    /// Execute all stages once.
    pub async fn run(&self) -> Result<RunSummary> {
        let mut summary = RunSummary::default();

        enter(PipelineStage::Init);
        self.prepare_directories().await?;

        enter(PipelineStage::Discover);
        let discovered = self.catalog.discover().await?;
        summary.discovered = discovered.len();
        let entries = dedup_entries(discovered);
        if entries.len() < summary.discovered {
            warn!(
                discovered = summary.discovered,
                distinct = entries.len(),
                "Index lists entries sharing a cache file"
            );
        }

        enter(PipelineStage::CacheAll);
        self.cache_all(&entries, &mut summary).await?;

        enter(PipelineStage::ProcessSequence);
        self.process_sequence(&entries, &mut summary).await?;

        enter(PipelineStage::Done);
        info!(
            discovered = summary.discovered,
            cache_hits = summary.cache_hits,
            fetched = summary.fetched,
            written = summary.written,
            skipped = summary.skipped,
            "Run complete"
        );
        Ok(summary)
    }

    async fn prepare_directories(&self) -> Result<()> {
        let model_dir = self.config.output_root.join(&self.config.model);
        for dir in [&self.config.cache_dir, &model_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| IngestionError::filesystem(dir, e))?;
        }
        Ok(())
    }

    /// Cache every entry with at most `max_concurrent_downloads` in flight.
    ///
    /// All tasks run to completion so that successful downloads land in the
    /// cache for the next run; the first failure is then returned.
    pub async fn cache_all(
        &self,
        entries: &[SourceEntry],
        summary: &mut RunSummary,
    ) -> Result<()> {
        let results: Vec<(&SourceEntry, Result<CacheOutcome>)> = stream::iter(entries)
            .map(|entry| async move { (entry, self.cache.ensure_cached(entry).await) })
            .buffer_unordered(self.config.max_concurrent_downloads)
            .collect()
            .await;

        let mut first_error = None;
        for (entry, result) in results {
            match result {
                Ok(CacheOutcome::Hit(_)) => summary.cache_hits += 1,
                Ok(CacheOutcome::Fetched(_)) => summary.fetched += 1,
                Err(err) => {
                    error!(entry = %entry, error = %err, "Failed to cache entry");
                    first_error.get_or_insert(err);
                }
            }
        }

        info!(
            cache_hits = summary.cache_hits,
            fetched = summary.fetched,
            "Cache stage finished"
        );
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Load, difference and write each entry in catalog order.
    pub async fn process_sequence(
        &self,
        entries: &[SourceEntry],
        summary: &mut RunSummary,
    ) -> Result<()> {
        let mut accumulator = DeltaAccumulator::new(self.config.empty_value);

        for entry in entries {
            match self.process_entry(entry, &mut accumulator).await {
                Ok(Some(path)) => {
                    summary.written += 1;
                    summary.outputs.push(path);
                }
                Ok(None) => {}
                Err(err) => match self.config.processing.on_failure {
                    OnFailure::Abort => return Err(err),
                    OnFailure::Skip => {
                        warn!(
                            entry = %entry,
                            error = %err,
                            "Skipping entry, next one starts a new baseline"
                        );
                        accumulator.reset();
                        summary.skipped += 1;
                    }
                },
            }
        }
        Ok(())
    }

    #[instrument(skip(self, accumulator), fields(entry = %entry))]
    async fn process_entry(
        &self,
        entry: &SourceEntry,
        accumulator: &mut DeltaAccumulator,
    ) -> Result<Option<PathBuf>> {
        let path = self.cache.cache_path(entry);
        let grid = self
            .processing_retry
            .run(entry.name(), |_| self.load(path.clone()))
            .await
            .map_err(|e| processing_error(entry, e))?;

        let metadata = grid.metadata().clone();
        let delta = match accumulator.push(grid) {
            Ok(Some(delta)) => delta,
            Ok(None) => {
                info!(valid_time = %metadata.valid_time, "Baseline established");
                return Ok(None);
            }
            Err(error) => {
                return Err(processing_error(entry, RetryExhausted { attempts: 1, error }));
            }
        };

        let output_dir = self.writer.output_dir(metadata.valid_time);
        let header = serialize_header(&metadata, self.config.coordinate_scale);
        let written = self
            .processing_retry
            .run(entry.name(), |_| self.writer.write(&output_dir, &header, &delta))
            .await
            .map_err(|e| processing_error(entry, e))?;

        info!(path = %written.display(), valid_time = %metadata.valid_time, "Wrote delta");
        Ok(Some(written))
    }

    async fn load(&self, path: PathBuf) -> Result<Grid> {
        let loader = Arc::clone(&self.loader);
        debug!(path = %path.display(), "Loading grid");
        tokio::task::spawn_blocking(move || loader.load(&path)).await?
    }
}

fn enter(stage: PipelineStage) {
    info!(stage = %stage, "Entering stage");
}

/// Keep the first entry for each cache file, in the original order.
///
/// Names that differ only in directory or compression suffix share a cache
/// file, so later ones are dropped as well.
fn dedup_entries(entries: Vec<SourceEntry>) -> Vec<SourceEntry> {
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter(|entry| seen.insert(entry.cache_name().to_string()))
        .collect()
}

fn processing_error(entry: &SourceEntry, exhausted: RetryExhausted) -> IngestionError {
    IngestionError::Processing {
        entry: entry.name().to_string(),
        attempts: exhausted.attempts,
        source: Box::new(exhausted.error),
    }
}
