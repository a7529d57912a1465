//! HTTP downloads and the reachability probe.

use std::path::Path;
use std::time::Duration;

use reqwest::Client;
use tokio::io::AsyncWriteExt;

use crate::config::TimeoutConfig;
use crate::error::{ProvisionError, Result};

#[derive(Clone)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(timeouts: &TimeoutConfig) -> Result<Self> {
        Self::with_timeouts(timeouts.connect(), timeouts.download())
    }

    pub fn with_timeouts(connect: Duration, total: Duration) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(connect)
            .timeout(total)
            .user_agent(concat!("rigup/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Any HTTP response counts as reachable; only transport failures do not.
    pub async fn probe(&self, url: &str) -> Result<()> {
        let response = self.client.head(url).send().await?;
        tracing::debug!("Probe {} answered {}", url, response.status());
        Ok(())
    }

    /// Stream `url` into `dest`, returning the number of bytes written.
    pub async fn download(&self, url: &str, dest: &Path) -> Result<u64> {
        let mut response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ProvisionError::download(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProvisionError::download(url, format!("HTTP {}", status)));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| ProvisionError::download(url, e.to_string()))?
        {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        tracing::debug!("Downloaded {} ({} bytes) to {}", url, written, dest.display());
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn downloader() -> Downloader {
        Downloader::with_timeouts(Duration::from_secs(2), Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_download_writes_body() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/pkg.deb"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"debian-archive".to_vec()))
            .mount(&mock_server)
            .await;

        let temp_dir = tempfile::tempdir().unwrap();
        let dest = temp_dir.path().join("pkg.deb");
        let written = downloader()
            .download(&format!("{}/pkg.deb", mock_server.uri()), &dest)
            .await
            .unwrap();

        assert_eq!(written, 14);
        assert_eq!(std::fs::read(&dest).unwrap(), b"debian-archive");
    }

    #[tokio::test]
    async fn test_download_http_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/missing.deb"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let temp_dir = tempfile::tempdir().unwrap();
        let err = downloader()
            .download(
                &format!("{}/missing.deb", mock_server.uri()),
                &temp_dir.path().join("missing.deb"),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, ProvisionError::Download { .. }));
        assert!(err.to_string().contains("404"));
        assert!(!temp_dir.path().join("missing.deb").exists());
    }

    #[tokio::test]
    async fn test_probe_accepts_any_status() {
        let mock_server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&mock_server)
            .await;

        assert!(downloader().probe(&mock_server.uri()).await.is_ok());
    }

    #[tokio::test]
    async fn test_probe_unreachable_host() {
        // Nothing listens on the discard port locally.
        let result = downloader().probe("http://127.0.0.1:9/").await;
        assert!(result.is_err());
    }
}
