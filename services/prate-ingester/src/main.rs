//! Accumulated precipitation ingester.
//!
//! Runs one ingestion pass and exits:
//! - Lists the published forecast files
//! - Downloads and decompresses anything not yet cached
//! - Writes one wgf4 grid per forecast interval

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use ingestion::{OnFailure, Pipeline, PipelineConfig};

#[derive(Parser, Debug)]
#[command(name = "prate-ingester")]
#[command(about = "Convert accumulated precipitation forecasts into per-interval wgf4 grids")]
struct Args {
    /// YAML pipeline configuration (defaults apply when omitted)
    #[arg(short, long, env = "PRATE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory index of the source files
    #[arg(long, env = "PRATE_BASE_URL")]
    base_url: Option<String>,

    /// Directory for decompressed downloads
    #[arg(long, env = "PRATE_CACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Root of the output tree
    #[arg(long, env = "PRATE_OUTPUT_ROOT")]
    output_root: Option<PathBuf>,

    /// Model directory name under the output root
    #[arg(short, long, env = "PRATE_MODEL")]
    model: Option<String>,

    /// Maximum concurrent downloads
    #[arg(long, env = "PRATE_MAX_CONCURRENT")]
    max_concurrent: Option<usize>,

    /// What to do when an entry cannot be processed
    #[arg(long, value_enum, env = "PRATE_ON_FAILURE")]
    on_failure: Option<FailureMode>,

    /// Log level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FailureMode {
    Abort,
    Skip,
}

impl From<FailureMode> for OnFailure {
    fn from(mode: FailureMode) -> Self {
        match mode {
            FailureMode::Abort => OnFailure::Abort,
            FailureMode::Skip => OnFailure::Skip,
        }
    }
}

impl Args {
    fn pipeline_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None => PipelineConfig::default(),
        };

        if let Some(base_url) = &self.base_url {
            config.base_url = base_url.clone();
        }
        if let Some(cache_dir) = &self.cache_dir {
            config.cache_dir = cache_dir.clone();
        }
        if let Some(output_root) = &self.output_root {
            config.output_root = output_root.clone();
        }
        if let Some(model) = &self.model {
            config.model = model.clone();
        }
        if let Some(max_concurrent) = self.max_concurrent {
            config.max_concurrent_downloads = max_concurrent;
        }
        if let Some(mode) = self.on_failure {
            config.processing.on_failure = mode.into();
        }

        config.validate().context("Invalid pipeline configuration")?;
        Ok(config)
    }
}

fn init_tracing(log_level: &str, json: bool) -> Result<()> {
    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json)?;

    let config = args.pipeline_config()?;
    info!(
        base_url = %config.base_url,
        cache_dir = %config.cache_dir.display(),
        output_root = %config.output_root.display(),
        model = %config.model,
        "Starting precipitation ingester"
    );

    let pipeline = Pipeline::from_config(config).context("Failed to set up pipeline")?;
    let summary = pipeline.run().await.context("Ingestion run failed")?;

    info!(
        written = summary.written,
        skipped = summary.skipped,
        fetched = summary.fetched,
        cache_hits = summary.cache_hits,
        "Done"
    );
    Ok(())
}
