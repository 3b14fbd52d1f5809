use anyhow::{Context, Result, anyhow};
use reqwest::{Client, StatusCode, Url};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{API_KEY_ENV, Config};
use crate::constants::constants;
use crate::gallery::{GalleryItem, ImageResponse};

/// Why a page could not be fetched.
///
/// Transport, status and decode failures are all recoverable the same way:
/// request the page again.
#[derive(Debug, Error)]
pub enum SearchError {
  #[error("request failed: {0}")]
  Transport(#[source] reqwest::Error),
  #[error("provider returned {status}: {body}")]
  Status { status: StatusCode, body: String },
  #[error("malformed response: {0}")]
  Decode(#[source] serde_json::Error),
  #[error("request cancelled")]
  Cancelled,
}

impl SearchError {
  pub fn is_cancelled(&self) -> bool {
    matches!(self, SearchError::Cancelled)
  }
}

/// A backend that returns one filtered page of image results.
pub trait ImageSearch: Send + Sync + 'static {
  /// Fetch page `page` (zero-based) for `query`. Resolves with
  /// [`SearchError::Cancelled`] once `cancel` fires, discarding any late response.
  fn fetch_page(
    &self,
    query: &str,
    page: u32,
    cancel: &CancellationToken,
  ) -> impl Future<Output = Result<Vec<GalleryItem>, SearchError>> + Send;
}

/// HTTP client for the image search provider.
#[derive(Debug, Clone)]
pub struct SearchClient {
  http: Client,
  endpoint: Url,
  api_key: String,
}

impl SearchClient {
  pub fn from_config(config: &Config) -> Result<Self> {
    let api_key = config
      .api_key
      .clone()
      .filter(|k| !k.trim().is_empty())
      .ok_or_else(|| anyhow!("No API key. Set {} or api_key in config.toml", API_KEY_ENV))?;
    let base_url = config.base_url.as_deref().unwrap_or(&constants().base_url);

    let mut builder = Client::builder().user_agent(&constants().user_agent);
    if let Some(secs) = config.timeout_secs {
      builder = builder.timeout(Duration::from_secs(secs));
    }
    let http = builder.build().context("Failed to build HTTP client")?;
    Self::with_http_client(http, base_url, api_key)
  }

  pub fn with_http_client(http: Client, base_url: &str, api_key: String) -> Result<Self> {
    let endpoint = Url::parse(base_url)
      .and_then(|base| base.join(&constants().search_path))
      .with_context(|| format!("Invalid search endpoint base URL: {}", base_url))?;
    Ok(Self { http, endpoint, api_key })
  }

  /// Request URL for one page, with the fixed provider parameters appended.
  pub fn page_url(&self, query: &str, page: u32) -> Url {
    let c = constants();
    let mut url = self.endpoint.clone();
    url
      .query_pairs_mut()
      .append_pair("q", query)
      .append_pair("ijn", &page.to_string())
      .append_pair("tbm", &c.search_mode)
      .append_pair("engine", &c.engine)
      .append_pair("output", &c.output_format)
      .append_pair("safe", &c.safe_search)
      .append_pair("api_key", &self.api_key);
    url
  }

  async fn request(&self, url: Url) -> Result<Vec<GalleryItem>, SearchError> {
    let response = self.http.get(url).send().await.map_err(SearchError::Transport)?;
    let status = response.status();
    if !status.is_success() {
      let body = response.text().await.unwrap_or_else(|e| format!("<unreadable body: {}>", e));
      return Err(SearchError::Status { status, body });
    }
    let bytes = response.bytes().await.map_err(SearchError::Transport)?;
    let parsed: ImageResponse = serde_json::from_slice(&bytes).map_err(SearchError::Decode)?;

    let raw = parsed.gallery_items.len();
    let items = parsed.into_items();
    if items.len() < raw {
      debug!(raw, kept = items.len(), "serp: dropped invalid results");
    }
    Ok(items)
  }
}

impl ImageSearch for SearchClient {
  async fn fetch_page(
    &self,
    query: &str,
    page: u32,
    cancel: &CancellationToken,
  ) -> Result<Vec<GalleryItem>, SearchError> {
    if cancel.is_cancelled() {
      return Err(SearchError::Cancelled);
    }
    debug!(query = %query, page, "serp: fetching page");
    let url = self.page_url(query, page);

    tokio::select! {
      biased;
      _ = cancel.cancelled() => {
        info!(query = %query, page, "serp: page request cancelled");
        Err(SearchError::Cancelled)
      }
      result = self.request(url) => {
        if let Err(ref e) = result {
          warn!(query = %query, page, err = %e, "serp: failed to fetch images");
        }
        result
      }
    }
  }
}
