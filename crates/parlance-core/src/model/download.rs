//! Streaming HTTP download of individual model files.

use std::path::Path;

use futures_util::StreamExt;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::error::{ParlanceError, ParlanceResult};

/// How many bytes may accumulate between two progress callbacks
const PROGRESS_GRANULARITY: u64 = 256 * 1024;

/// Fetches single files into a staging location.
#[derive(Debug, Clone)]
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    /// Create a downloader over an existing HTTP client
    #[must_use]
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Stream `url` into `dest`, reporting cumulative bytes through
    /// `progress` and returning the SHA-256 of the body.
    ///
    /// When `expected_size` is known, a mismatching body length is treated
    /// as a failed (truncated or padded) transfer.
    ///
    /// # Errors
    ///
    /// Returns a network error for HTTP failures, non-success statuses, and
    /// size mismatches, or a file error if the destination cannot be
    /// written. The partially written destination file is left to the
    /// caller's staging cleanup.
    pub async fn fetch_to<F>(
        &self,
        url: &str,
        dest: &Path,
        expected_size: Option<u64>,
        mut progress: F,
    ) -> ParlanceResult<String>
    where
        F: FnMut(u64) + Send,
    {
        debug!("downloading {url} -> {}", dest.display());

        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ParlanceError::network(format!(
                "download of {url} failed with HTTP {}",
                response.status().as_u16()
            )));
        }

        let mut file = tokio::fs::File::create(dest).await.map_err(|e| {
            ParlanceError::file(format!("cannot create {}: {e}", dest.display()))
        })?;

        let mut hasher = Sha256::new();
        let mut received: u64 = 0;
        let mut last_reported: u64 = 0;
        let mut stream = response.bytes_stream();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            hasher.update(&chunk);
            file.write_all(&chunk).await.map_err(|e| {
                ParlanceError::file(format!("cannot write {}: {e}", dest.display()))
            })?;
            received += chunk.len() as u64;

            if received - last_reported >= PROGRESS_GRANULARITY {
                last_reported = received;
                progress(received);
            }
        }

        file.flush().await?;
        progress(received);

        if let Some(expected) = expected_size {
            if received != expected {
                return Err(ParlanceError::network(format!(
                    "download of {url} returned {received} bytes, expected {expected}"
                )));
            }
        }

        Ok(format!("{:x}", hasher.finalize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha2::{Digest, Sha256};
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_fetch_writes_body_and_digest() {
        let server = MockServer::start().await;
        let body = b"piper-weights".to_vec();
        Mock::given(method("GET"))
            .and(path("/file.onnx"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let dest = temp.path().join("file.onnx");
        let downloader = Downloader::new(reqwest::Client::new());

        let mut seen = 0;
        let digest = downloader
            .fetch_to(
                &format!("{}/file.onnx", server.uri()),
                &dest,
                Some(body.len() as u64),
                |received| seen = received,
            )
            .await
            .unwrap();

        assert_eq!(std::fs::read(&dest).unwrap(), body);
        assert_eq!(seen, body.len() as u64);
        assert_eq!(digest, format!("{:x}", Sha256::digest(&body)));
    }

    #[tokio::test]
    async fn test_fetch_rejects_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.onnx"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let downloader = Downloader::new(reqwest::Client::new());
        let err = downloader
            .fetch_to(
                &format!("{}/missing.onnx", server.uri()),
                &temp.path().join("missing.onnx"),
                None,
                |_| {},
            )
            .await
            .unwrap_err();

        assert_eq!(err.category(), "network");
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn test_fetch_rejects_size_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/short.onnx"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abc".to_vec()))
            .mount(&server)
            .await;

        let temp = TempDir::new().unwrap();
        let downloader = Downloader::new(reqwest::Client::new());
        let err = downloader
            .fetch_to(
                &format!("{}/short.onnx", server.uri()),
                &temp.path().join("short.onnx"),
                Some(1000),
                |_| {},
            )
            .await
            .unwrap_err();

        assert_eq!(err.category(), "network");
        assert!(err.to_string().contains("expected 1000"));
    }
}
