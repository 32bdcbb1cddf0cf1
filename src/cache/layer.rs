//! Fetch interception: cache-first with network fallback.

use color_eyre::Result;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use super::storage::CacheStorage;
use super::types::{Destination, FetchReply, FetchSource, Request};
use crate::net::Fetcher;

/// Cache-first request interceptor.
///
/// Sits between the pages and the network: serves cached entries when they
/// exist, stores fresh same-origin responses as they pass through, and falls
/// back to the cached root document for offline navigations.
pub struct CacheFirst<S: CacheStorage> {
  storage: Arc<S>,
  /// Bucket new entries are written into (the current generation)
  bucket: String,
  /// URL substrings that bypass the interceptor entirely
  bypass: Vec<String>,
  /// Root document served to offline navigations
  fallback_url: Url,
}

impl<S: CacheStorage> CacheFirst<S> {
  /// Create an interceptor writing into `bucket`, with `origin`'s root
  /// document as the offline navigation fallback.
  pub fn new(storage: Arc<S>, bucket: impl Into<String>, origin: &Url) -> Result<Self> {
    let fallback_url = origin
      .join("/")
      .map_err(|e| color_eyre::eyre::eyre!("Invalid origin {}: {}", origin, e))?;

    Ok(Self {
      storage,
      bucket: bucket.into(),
      bypass: Vec::new(),
      fallback_url,
    })
  }

  /// Set the URL substrings that pass through uncached.
  pub fn with_bypass(mut self, patterns: &[&str]) -> Self {
    self.bypass = patterns.iter().map(|p| p.to_string()).collect();
    self
  }

  fn is_bypassed(&self, request: &Request) -> bool {
    let url = request.url.as_str();
    self.bypass.iter().any(|pattern| url.contains(pattern))
  }

  /// Handle one intercepted request.
  ///
  /// 1. Denylisted URLs pass through untouched.
  /// 2. A cache hit is served without touching the network.
  /// 3. On a miss, fetch; basic 200 responses are stored on the way out.
  /// 4. If the network fails, document navigations get the cached root;
  ///    everything else gets nothing (no fallback exists for assets).
  pub async fn handle<F: Fetcher>(&self, request: &Request, fetcher: &F) -> Result<FetchReply> {
    if self.is_bypassed(request) {
      debug!(url = %request.url, "bypassing denylisted URL");
      return Ok(FetchReply::Bypass);
    }

    if let Some(cached) = self.storage.match_any(request)? {
      debug!(url = %request.url, "cache hit");
      return Ok(FetchReply::Response {
        response: cached,
        source: FetchSource::Cache,
      });
    }

    match fetcher.fetch(request).await {
      Ok(response) => {
        if response.is_cacheable() {
          // The page gets the response either way; a failed write only
          // costs the next request a network round-trip.
          if let Err(err) = self.storage.put(&self.bucket, request, &response) {
            warn!(url = %request.url, "failed to cache response: {err}");
          }
        }
        Ok(FetchReply::Response {
          response,
          source: FetchSource::Network,
        })
      }
      Err(err) => {
        warn!(url = %request.url, "network fetch failed: {err}");
        if request.destination == Destination::Document {
          let root = Request::document(self.fallback_url.clone());
          if let Some(cached) = self.storage.match_any(&root)? {
            return Ok(FetchReply::Response {
              response: cached,
              source: FetchSource::OfflineFallback,
            });
          }
        }
        Ok(FetchReply::NoResponse)
      }
    }
  }
}
