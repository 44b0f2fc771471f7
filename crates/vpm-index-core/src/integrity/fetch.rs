use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::redirect::Policy;

use crate::error::FetchError;

const MAX_REDIRECTS: usize = 10;
pub(crate) const USER_AGENT: &str = concat!("vpm-index/", env!("CARGO_PKG_VERSION"));

/// Downloads artifact bytes. Implementations must follow redirects.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// reqwest-backed fetcher with a per-request timeout and no retries.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(Policy::limited(MAX_REDIRECTS))
            .user_agent(USER_AGENT)
            .build()
            .map_err(|err| FetchError::Transport {
                reason: format!("failed to build HTTP client: {err}"),
            })?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(transport)?;
        let status = response.status();
        if status.is_client_error() || status.is_server_error() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }
        let bytes = response.bytes().await.map_err(transport)?;
        tracing::debug!(url, bytes = bytes.len(), "downloaded artifact");
        Ok(bytes.to_vec())
    }
}

fn transport(err: reqwest::Error) -> FetchError {
    FetchError::Transport {
        reason: err.to_string(),
    }
}
