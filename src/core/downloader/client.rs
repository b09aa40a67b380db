use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::core::error::{ServerError, ServerResult};

/// Retrieves raw document bytes for a URL.
///
/// The sync pipeline only talks to the network through this seam, so tests
/// substitute an in-memory implementation.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn fetch(&self, url: &str) -> ServerResult<Vec<u8>>;
}

/// reqwest-backed document source with a bounded retry policy.
pub struct Downloader {
    client: Client,
    /// Additional attempts after the first failure.
    retries: u32,
    /// Delay before retry `n` is `backoff * n`.
    backoff: Duration,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            retries: 2,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    async fn fetch_once(&self, url: &str) -> ServerResult<Vec<u8>> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServerError::DownloadFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        Ok(response.bytes().await?.to_vec())
    }

    // ── Single file download ────────────────────────────

    /// Download a single file to `dest`, creating parent directories as needed.
    pub async fn download_file(&self, url: &str, dest: &Path) -> ServerResult<()> {
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ServerError::io(parent, e))?;
        }

        let bytes = self.fetch(url).await?;

        // Write inside a block so the handle is dropped before the caller reads it back
        {
            let mut file = tokio::fs::File::create(dest)
                .await
                .map_err(|e| ServerError::io(dest, e))?;
            file.write_all(&bytes)
                .await
                .map_err(|e| ServerError::io(dest, e))?;
            file.flush().await.map_err(|e| ServerError::io(dest, e))?;
        }

        debug!("Downloaded: {} -> {:?}", url, dest);
        Ok(())
    }
}

#[async_trait]
impl DocumentSource for Downloader {
    async fn fetch(&self, url: &str) -> ServerResult<Vec<u8>> {
        let mut attempt = 0;
        loop {
            match self.fetch_once(url).await {
                Ok(bytes) => return Ok(bytes),
                Err(e) if attempt < self.retries && is_retryable(&e) => {
                    attempt += 1;
                    warn!(
                        "Request to {} failed ({}), retry {}/{}",
                        url, e, attempt, self.retries
                    );
                    tokio::time::sleep(self.backoff * attempt).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// 4xx answers are final; timeouts, connection errors and 5xx are retried.
fn is_retryable(error: &ServerError) -> bool {
    match error {
        ServerError::DownloadFailed { status, .. } => *status >= 500 || *status == 429,
        ServerError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_errors_are_not_retried() {
        let not_found = ServerError::DownloadFailed {
            url: "https://example.com".into(),
            status: 404,
        };
        assert!(!is_retryable(&not_found));
    }

    #[test]
    fn server_errors_and_throttling_are_retried() {
        for status in [500, 502, 503, 429] {
            let err = ServerError::DownloadFailed {
                url: "https://example.com".into(),
                status,
            };
            assert!(is_retryable(&err), "status {status} should be retried");
        }
    }

    #[test]
    fn non_transport_errors_are_final() {
        assert!(!is_retryable(&ServerError::Other("boom".into())));
    }
}
