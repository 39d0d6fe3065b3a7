//! Byte fetching for host videos and overlay assets.

use std::path::PathBuf;

use async_trait::async_trait;

use gifmix_common::error::{GifmixError, GifmixResult};

/// Resolves a URI to its bytes.
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, uri: &str) -> GifmixResult<Vec<u8>>;
}

/// Fetches `http(s)://` over the network and everything else from disk.
#[derive(Debug, Clone, Default)]
pub struct DefaultFetcher {
    client: reqwest::Client,
}

impl DefaultFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    async fn fetch_http(&self, uri: &str) -> GifmixResult<Vec<u8>> {
        let response = self
            .client
            .get(uri)
            .send()
            .await
            .map_err(|e| GifmixError::fetch(format!("GET {uri} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GifmixError::fetch(format!("GET {uri} returned {status}")));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| GifmixError::fetch(format!("Reading body of {uri} failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl AssetFetcher for DefaultFetcher {
    async fn fetch(&self, uri: &str) -> GifmixResult<Vec<u8>> {
        match classify(uri) {
            AssetLocation::Remote => self.fetch_http(uri).await,
            AssetLocation::Local(path) => match tokio::fs::read(&path).await {
                Ok(bytes) => Ok(bytes),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    Err(GifmixError::FileNotFound { path })
                }
                Err(e) => Err(e.into()),
            },
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum AssetLocation {
    Remote,
    Local(PathBuf),
}

fn classify(uri: &str) -> AssetLocation {
    let lower = uri.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        AssetLocation::Remote
    } else if let Some(path) = uri.strip_prefix("file://") {
        AssetLocation::Local(PathBuf::from(path))
    } else {
        AssetLocation::Local(PathBuf::from(uri))
    }
}
