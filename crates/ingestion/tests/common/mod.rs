//! Shared helpers for the ingestion integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use bytes::Bytes;
use ingestion::{HttpClient, IngestionError, PipelineConfig, Result, RetryConfig};
use test_utils::fixtures::index;
use test_utils::{create_accumulation_series, Grib2Builder};

pub const BASE_URL: &str = "http://opendata.test/weather/nwp/icon-d2/grib/12/tot_prec/";

pub const COLS: usize = 4;
pub const ROWS: usize = 3;

/// Scripted in-memory HTTP server.
///
/// Unknown URLs answer 404. URLs registered with [`fail_times`] answer 503
/// that many times before serving their body.
///
/// [`fail_times`]: MockHttpClient::fail_times
#[derive(Default)]
pub struct MockHttpClient {
    responses: Mutex<HashMap<String, Bytes>>,
    failures: Mutex<HashMap<String, u32>>,
    calls: Mutex<Vec<String>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, url: &str, body: impl Into<Bytes>) {
        self.responses
            .lock()
            .unwrap()
            .insert(url.to_string(), body.into());
    }

    pub fn fail_times(&self, url: &str, times: u32) {
        self.failures.lock().unwrap().insert(url.to_string(), times);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, url: &str) -> usize {
        self.calls().iter().filter(|u| u.as_str() == url).count()
    }

    /// Requests for anything but the index page.
    pub fn entry_calls(&self) -> usize {
        self.calls().iter().filter(|u| u.as_str() != BASE_URL).count()
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, url: &str) -> Result<Bytes> {
        self.calls.lock().unwrap().push(url.to_string());

        if let Some(remaining) = self.failures.lock().unwrap().get_mut(url) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(IngestionError::Http {
                    url: url.to_string(),
                    status: 503,
                });
            }
        }

        self.responses
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .ok_or_else(|| IngestionError::Http {
                url: url.to_string(),
                status: 404,
            })
    }
}

pub fn bzip2(data: &[u8]) -> Vec<u8> {
    let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::fast());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

/// Config pointing at the mock server and a temp dir, with millisecond
/// retry delays.
pub fn test_config(root: &Path) -> PipelineConfig {
    let fast = |max_attempts| RetryConfig {
        max_attempts,
        initial_delay_ms: 1,
        max_delay_ms: 4,
        multiplier: 2.0,
    };

    PipelineConfig {
        base_url: BASE_URL.to_string(),
        cache_dir: root.join("cache"),
        output_root: root.join("out"),
        max_concurrent_downloads: 2,
        fetch_retry: fast(3),
        processing: ingestion::ProcessingConfig {
            retry: fast(2),
            ..Default::default()
        },
        ..PipelineConfig::default()
    }
}

/// A published forecast series registered on a mock server.
pub struct Series {
    /// Entry names in publication order.
    pub names: Vec<String>,
    /// Row-major accumulated values per entry.
    pub grids: Vec<Vec<f32>>,
}

impl Series {
    pub fn url(&self, step: usize) -> String {
        format!("{}{}", BASE_URL, self.names[step])
    }
}

/// Publish `steps` hourly accumulations (lead hours 0, 1, ...) plus an
/// icosahedral decoy, and serve the index listing them.
pub fn publish_series(client: &MockHttpClient, steps: usize) -> Series {
    publish_grids(client, create_accumulation_series(COLS, ROWS, steps))
}

/// Publish the given row-major grids as consecutive hourly entries.
pub fn publish_grids(client: &MockHttpClient, grids: Vec<Vec<f32>>) -> Series {
    let mut names = Vec::with_capacity(grids.len());
    for (step, values) in grids.iter().enumerate() {
        let name = index::entry_name(index::MARKER, step as u32);
        let grib = Grib2Builder::new_tot_prec()
            .with_accumulation_hours(step as u32)
            .with_data(values.clone())
            .build();
        client.respond(&format!("{}{}", BASE_URL, name), bzip2(&grib));
        names.push(name);
    }

    let decoy = index::entry_name("icosahedral", 0);
    let mut listed: Vec<&str> = vec![decoy.as_str()];
    listed.extend(names.iter().map(String::as_str));
    client.respond(BASE_URL, index::listing(&listed));

    Series { names, grids }
}

/// Read a wgf4 file back as (header, sentinel, payload).
pub fn read_wgf4(path: &Path) -> ([i32; 7], f32, Vec<f32>) {
    let bytes = std::fs::read(path).unwrap();
    let mut header = [0i32; 7];
    for (i, value) in header.iter_mut().enumerate() {
        *value = i32::from_ne_bytes(bytes[i * 4..i * 4 + 4].try_into().unwrap());
    }
    let sentinel = f32::from_ne_bytes(bytes[28..32].try_into().unwrap());
    let payload = bytes[32..]
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes(c.try_into().unwrap()))
        .collect();
    (header, sentinel, payload)
}
