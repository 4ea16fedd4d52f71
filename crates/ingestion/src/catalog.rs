//! Source discovery from the provider's directory index.

use std::fmt;
use std::sync::Arc;

use tracing::{info, instrument, warn};

use crate::error::Result;
use crate::fetch::Fetcher;

/// Name of a published file, as it appears in the directory index.
///
/// Position in the discovered list encodes forecast order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceEntry(String);

impl SourceEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Local file name: the last path component with any compression
    /// suffix removed.
    pub fn cache_name(&self) -> &str {
        let file_name = self.0.rsplit('/').next().unwrap_or(&self.0);
        Compression::from_name(file_name).strip(file_name)
    }

    pub fn compression(&self) -> Compression {
        Compression::from_name(&self.0)
    }
}

impl fmt::Display for SourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compression of a source file, derived from its suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Bzip2,
    Gzip,
    None,
}

impl Compression {
    pub fn from_name(name: &str) -> Self {
        if name.ends_with(".bz2") {
            Compression::Bzip2
        } else if name.ends_with(".gz") {
            Compression::Gzip
        } else {
            Compression::None
        }
    }

    fn suffix(&self) -> &'static str {
        match self {
            Compression::Bzip2 => ".bz2",
            Compression::Gzip => ".gz",
            Compression::None => "",
        }
    }

    /// `name` without this compression's suffix.
    pub fn strip<'a>(&self, name: &'a str) -> &'a str {
        name.strip_suffix(self.suffix()).unwrap_or(name)
    }
}

/// Extract entries whose link contains `marker`, in document order.
///
/// Each line is cut at the first `">`; what remains must split on `href="`
/// into exactly two parts, the second being the link target.
pub fn parse_index(document: &str, marker: &str) -> Vec<SourceEntry> {
    document
        .lines()
        .filter_map(|line| {
            let head = line.split("\">").next().unwrap_or(line);
            let parts: Vec<&str> = head.split("href=\"").collect();
            match parts.as_slice() {
                [_, href] if href.contains(marker) => Some(SourceEntry::new(*href)),
                _ => None,
            }
        })
        .collect()
}

/// Lists the entries currently published under the index URL.
pub struct SourceCatalog {
    index_url: String,
    marker: String,
    fetcher: Arc<Fetcher>,
}

impl SourceCatalog {
    pub fn new(
        index_url: impl Into<String>,
        marker: impl Into<String>,
        fetcher: Arc<Fetcher>,
    ) -> Self {
        Self {
            index_url: index_url.into(),
            marker: marker.into(),
            fetcher,
        }
    }

    /// Fetch the index and return the matching entries in listing order.
    #[instrument(skip(self), fields(url = %self.index_url))]
    pub async fn discover(&self) -> Result<Vec<SourceEntry>> {
        let body = self.fetcher.fetch(&self.index_url).await?;
        let document = String::from_utf8_lossy(&body);
        let entries = parse_index(&document, &self.marker);

        if entries.is_empty() {
            warn!(marker = %self.marker, "Index lists no matching entries");
        } else {
            info!(count = entries.len(), "Discovered entries");
        }
        Ok(entries)
    }
}
