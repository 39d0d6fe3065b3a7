//! Overlay catalog search (Giphy).
//!
//! Only a source of overlay URIs: results carry the direct URL of the
//! `fixed_height` rendition, which is what gets staged for rendering.

use serde::{Deserialize, Serialize};

use gifmix_common::config::CatalogConfig;
use gifmix_common::error::{GifmixError, GifmixResult};

/// Which catalog section to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogKind {
    Gifs,
    Stickers,
}

impl CatalogKind {
    fn path(self) -> &'static str {
        match self {
            Self::Gifs => "gifs",
            Self::Stickers => "stickers",
        }
    }
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub title: String,
    /// Direct asset URL, usable as an overlay source.
    pub url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    id: String,
    #[serde(default)]
    title: String,
    images: SearchImages,
}

#[derive(Debug, Deserialize)]
struct SearchImages {
    fixed_height: Rendition,
}

#[derive(Debug, Deserialize)]
struct Rendition {
    url: String,
}

/// Paginated search client.
#[derive(Debug, Clone)]
pub struct GiphyCatalog {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    page_size: u32,
}

impl GiphyCatalog {
    /// Build a client from config. Fails when no API key is configured.
    pub fn from_config(config: &CatalogConfig) -> GifmixResult<Self> {
        let api_key = config.resolved_api_key().ok_or_else(|| {
            GifmixError::config(format!(
                "no catalog API key; set {} or catalog.api_key",
                gifmix_common::config::CATALOG_API_KEY_ENV
            ))
        })?;
        Ok(Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
            page_size: config.page_size.max(1),
        })
    }

    /// Search `kind` for `query`. Pages start at 1.
    pub async fn search(
        &self,
        query: &str,
        kind: CatalogKind,
        page: u32,
    ) -> GifmixResult<Vec<CatalogEntry>> {
        let url = format!("{}/{}/search", self.base_url, kind.path());
        let (limit, offset) = page_window(page, self.page_size);
        tracing::debug!(query, kind = ?kind, page, limit, offset, "Searching catalog");

        let limit = limit.to_string();
        let offset = offset.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("q", query),
                ("limit", limit.as_str()),
                ("offset", offset.as_str()),
            ])
            .send()
            .await
            .map_err(|e| GifmixError::catalog(format!("search request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(GifmixError::catalog(format!("search returned {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| GifmixError::catalog(format!("reading search response failed: {e}")))?;
        parse_search_response(&body)
    }
}

/// `(limit, offset)` for a 1-based page.
fn page_window(page: u32, page_size: u32) -> (u32, u32) {
    let page = page.max(1);
    (page_size, (page - 1).saturating_mul(page_size))
}

/// Extract entries from a search response body.
pub fn parse_search_response(body: &str) -> GifmixResult<Vec<CatalogEntry>> {
    let response: SearchResponse = serde_json::from_str(body)?;
    Ok(response
        .data
        .into_iter()
        .map(|item| CatalogEntry {
            id: item.id,
            title: item.title,
            url: item.images.fixed_height.url,
        })
        .collect())
}
