//! HTTP client for streaming archive parts to disk.

use std::path::Path;
use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::FetchError;
use crate::config::DEFAULT_CHUNK_SIZE_BYTES;

/// HTTP client that streams a response body to an explicit local path.
///
/// Designed to be created once and shared across the worker pool, taking
/// advantage of connection pooling. The body is written chunk-by-chunk
/// through a fixed-size buffer; the full part is never materialized in
/// memory.
#[derive(Debug, Clone)]
pub struct PartClient {
    client: Client,
    chunk_size: usize,
}

impl PartClient {
    /// Creates a client with default timeouts (30 s connect, 5 min read)
    /// and the default 8 KiB write buffer.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new() -> Self {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, DEFAULT_CHUNK_SIZE_BYTES)
    }

    /// Creates a client with explicit timeout values and chunk size.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the supplied
    /// configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
        chunk_size: usize,
    ) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client, chunk_size }
    }

    /// Streams `url` into `local_path`, returning the bytes written.
    ///
    /// The file is created (truncating any existing content) before the
    /// stream starts. On failure mid-stream the partially written file is
    /// left on disk as-is; callers treating presence as completeness inherit
    /// that gap knowingly.
    ///
    /// # Errors
    ///
    /// Returns [`FetchError`] when the URL is invalid, the request fails,
    /// the server returns a non-success status, or writing to disk fails.
    pub async fn fetch_to_path(&self, url: &str, local_path: &Path) -> Result<u64, FetchError> {
        Url::parse(url).map_err(|_| FetchError::invalid_url(url))?;

        debug!(url, path = %local_path.display(), "starting fetch");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::timeout(url)
            } else {
                FetchError::network(url, e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::http_status(url, status.as_u16()));
        }

        let file = File::create(local_path)
            .await
            .map_err(|e| FetchError::io(local_path, e))?;
        let mut writer = BufWriter::with_capacity(self.chunk_size, file);
        let mut stream = response.bytes_stream();
        let mut bytes_written: u64 = 0;

        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result.map_err(|e| {
                if e.is_timeout() {
                    FetchError::timeout(url)
                } else {
                    FetchError::network(url, e)
                }
            })?;
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| FetchError::io(local_path, e))?;
            bytes_written += chunk.len() as u64;
        }

        writer
            .flush()
            .await
            .map_err(|e| FetchError::io(local_path, e))?;

        info!(url, bytes = bytes_written, "fetch complete");
        Ok(bytes_written)
    }
}

impl Default for PartClient {
    fn default() -> Self {
        Self::new()
    }
}
