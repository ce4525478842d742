//! Tarball download. Single attempt, no retry.

use std::{path::Path, time::Duration};

use {
    async_trait::async_trait,
    tokio::io::AsyncWriteExt,
    tracing::{debug, warn},
    url::Url,
};

use crate::error::{Error, IoContext, Result};

/// Fetches a tarball URL into a local file.
#[async_trait]
pub trait TarballFetcher: Send + Sync {
    /// Write the body behind `url` to `dest`, returning the byte count.
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64>;
}

/// `http(s)://` via reqwest, `file://` via the local filesystem.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("bazaar/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::MissingDependency(format!("HTTP client unavailable: {e}")))?;
        Ok(Self { client })
    }

    async fn fetch_http(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| download_failed(url, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %url, status = %status, "download returned non-success status");
            return Err(download_failed(url, format!("HTTP {status}")));
        }

        let mut file = tokio::fs::File::create(dest)
            .await
            .fs_context(|| format!("create {}", dest.display()))?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await.map_err(|e| download_failed(url, e))? {
            file.write_all(&chunk)
                .await
                .fs_context(|| format!("write {}", dest.display()))?;
            written += chunk.len() as u64;
        }
        file.flush()
            .await
            .fs_context(|| format!("flush {}", dest.display()))?;

        Ok(written)
    }
}

#[async_trait]
impl TarballFetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest: &Path) -> Result<u64> {
        let parsed = Url::parse(url).map_err(|e| download_failed(url, format!("invalid URL: {e}")))?;
        debug!(url = %url, dest = %dest.display(), "downloading tarball");

        let bytes = match parsed.scheme() {
            "http" | "https" => self.fetch_http(url, dest).await?,
            "file" => fetch_file(&parsed, url, dest).await?,
            other => {
                return Err(Error::MissingDependency(format!(
                    "no transport for {other}:// URLs"
                )));
            },
        };

        debug!(url = %url, bytes, "download complete");
        Ok(bytes)
    }
}

async fn fetch_file(parsed: &Url, url: &str, dest: &Path) -> Result<u64> {
    let source = parsed
        .to_file_path()
        .map_err(|()| download_failed(url, "not a local file path"))?;
    tokio::fs::copy(&source, dest)
        .await
        .map_err(|e| download_failed(url, e))
}

fn download_failed(url: &str, reason: impl std::fmt::Display) -> Error {
    Error::DownloadFailed {
        url: url.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_http_download() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/demo-1.2.0.tar.gz")
            .with_status(200)
            .with_body(b"tarball-bytes")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("download.tar.gz");
        let fetcher = HttpFetcher::new(Some(Duration::from_secs(5))).unwrap();
        let url = format!("{}/demo-1.2.0.tar.gz", server.url());

        let bytes = fetcher.fetch(&url, &dest).await.unwrap();
        assert_eq!(bytes, 13);
        assert_eq!(std::fs::read(&dest).unwrap(), b"tarball-bytes");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_http_error_status() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/missing.tar.gz")
            .with_status(404)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(None).unwrap();
        let url = format!("{}/missing.tar.gz", server.url());

        let err = fetcher
            .fetch(&url, &dir.path().join("out"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DownloadFailed { ref reason, .. } if reason.contains("404")));
    }

    #[tokio::test]
    async fn test_file_url() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("source.tar.gz");
        std::fs::write(&source, b"local").unwrap();
        let url = Url::from_file_path(&source).unwrap();

        let dest = dir.path().join("dest.tar.gz");
        let fetcher = HttpFetcher::new(None).unwrap();
        assert_eq!(fetcher.fetch(url.as_str(), &dest).await.unwrap(), 5);
        assert_eq!(std::fs::read(&dest).unwrap(), b"local");
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let url = Url::from_file_path(dir.path().join("absent.tar.gz")).unwrap();
        let fetcher = HttpFetcher::new(None).unwrap();
        let err = fetcher
            .fetch(url.as_str(), &dir.path().join("dest"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DownloadFailed { .. }));
    }

    #[tokio::test]
    async fn test_unsupported_scheme() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(None).unwrap();
        let err = fetcher
            .fetch("ftp://example/demo.tar.gz", &dir.path().join("dest"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingDependency(_)));
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = HttpFetcher::new(None).unwrap();
        let err = fetcher
            .fetch("not a url", &dir.path().join("dest"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DownloadFailed { .. }));
    }
}
