//! Write-once local cache of decompressed source files.
//!
//! A cache file is only ever created by renaming a fully written
//! `<name>.partial` into place, so its presence means the entry was fetched
//! and decompressed completely in some earlier attempt or run.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::fs;
use tracing::{debug, info, instrument};

use crate::catalog::{Compression, SourceEntry};
use crate::error::{IngestionError, Result};
use crate::fetch::Fetcher;

/// Result of [`CacheStore::ensure_cached`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheOutcome {
    /// Already on disk; no network access happened.
    Hit(PathBuf),
    /// Downloaded and decompressed during this call.
    Fetched(PathBuf),
}

impl CacheOutcome {
    pub fn path(&self) -> &Path {
        match self {
            CacheOutcome::Hit(path) | CacheOutcome::Fetched(path) => path,
        }
    }

    pub fn is_hit(&self) -> bool {
        matches!(self, CacheOutcome::Hit(_))
    }
}

/// Flat directory of decompressed source files keyed by entry name.
pub struct CacheStore {
    cache_dir: PathBuf,
    base_url: String,
    fetcher: Arc<Fetcher>,
}

impl CacheStore {
    /// `base_url` must end with `/`; entry names are appended to it.
    pub fn new(
        cache_dir: impl Into<PathBuf>,
        base_url: impl Into<String>,
        fetcher: Arc<Fetcher>,
    ) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            base_url: base_url.into(),
            fetcher,
        }
    }

    pub fn cache_path(&self, entry: &SourceEntry) -> PathBuf {
        self.cache_dir.join(entry.cache_name())
    }

    /// Make sure a decompressed copy of `entry` exists locally.
    #[instrument(skip(self), fields(entry = %entry))]
    pub async fn ensure_cached(&self, entry: &SourceEntry) -> Result<CacheOutcome> {
        let path = self.cache_path(entry);
        if path.exists() {
            debug!(path = %path.display(), "Cache hit");
            return Ok(CacheOutcome::Hit(path));
        }

        let url = format!("{}{}", self.base_url, entry.name());
        let compressed = self.fetcher.fetch(&url).await?;

        let compression = entry.compression();
        let name = entry.name().to_string();
        let data =
            tokio::task::spawn_blocking(move || decompress(&name, compression, &compressed))
                .await??;

        fs::create_dir_all(&self.cache_dir)
            .await
            .map_err(|e| IngestionError::filesystem(&self.cache_dir, e))?;

        let partial = self
            .cache_dir
            .join(format!("{}.partial", entry.cache_name()));
        fs::write(&partial, &data)
            .await
            .map_err(|e| IngestionError::filesystem(&partial, e))?;
        fs::rename(&partial, &path)
            .await
            .map_err(|e| IngestionError::filesystem(&path, e))?;

        info!(path = %path.display(), bytes = data.len(), "Saved file");
        Ok(CacheOutcome::Fetched(path))
    }
}

/// Decompress a whole file held in memory.
pub fn decompress(entry: &str, compression: Compression, data: &[u8]) -> Result<Vec<u8>> {
    let mut decompressed = Vec::new();
    let result = match compression {
        Compression::Bzip2 => bzip2::read::BzDecoder::new(data).read_to_end(&mut decompressed),
        Compression::Gzip => flate2::read::GzDecoder::new(data).read_to_end(&mut decompressed),
        Compression::None => return Ok(data.to_vec()),
    };

    result.map_err(|e| IngestionError::Decompression {
        entry: entry.to_string(),
        reason: e.to_string(),
    })?;
    Ok(decompressed)
}
