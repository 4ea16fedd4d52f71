//! HTTP retrieval with bounded retries.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{info, instrument};

use crate::error::{IngestionError, Result};
use crate::retry::RetryPolicy;

/// Minimal HTTP GET abstraction so the pipeline can run against a mock.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Fetch the full body of `url`. Non-success statuses are errors.
    async fn get(&self, url: &str) -> Result<Bytes>;
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Build a client. `timeout` of `None` keeps the transport default.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("prate-ingest/", env!("CARGO_PKG_VERSION")))
            .pool_max_idle_per_host(8)
            .tcp_nodelay(true);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(IngestionError::ClientBuild)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn get(&self, url: &str) -> Result<Bytes> {
        let transport = |source| IngestionError::Transport {
            url: url.to_string(),
            source,
        };

        let response = self.client.get(url).send().await.map_err(transport)?;
        let status = response.status();
        if !status.is_success() {
            return Err(IngestionError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.bytes().await.map_err(transport)
    }
}

/// Downloads resources through an [`HttpClient`], retrying failed attempts.
pub struct Fetcher {
    client: Arc<dyn HttpClient>,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(client: Arc<dyn HttpClient>, policy: RetryPolicy) -> Self {
        Self { client, policy }
    }

    /// GET `url`, retrying any failure until the policy is exhausted.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str) -> Result<Bytes> {
        info!("Start fetching");

        let body = self
            .policy
            .run(url, |_| self.client.get(url))
            .await
            .map_err(|exhausted| IngestionError::Network {
                url: url.to_string(),
                attempts: exhausted.attempts,
                source: Box::new(exhausted.error),
            })?;

        info!(bytes = body.len(), "End fetching");
        Ok(body)
    }
}
