//! Network fetching behind a trait seam.

use async_trait::async_trait;
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use url::Url;

use crate::cache::{Request, ResponseKind, StoredResponse};

/// Trait for performing network fetches.
#[async_trait]
pub trait Fetcher: Send + Sync {
  /// Fetch a request and snapshot the response.
  async fn fetch(&self, request: &Request) -> Result<StoredResponse>;
}

/// reqwest-backed fetcher.
///
/// Classifies each response against the configured app origin so the cache
/// layer can tell basic (same-origin) responses from foreign ones.
pub struct HttpFetcher {
  client: reqwest::Client,
  origin: Url,
}

impl HttpFetcher {
  pub fn new(origin: Url) -> Result<Self> {
    let client = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to build HTTP client: {}", e))?;

    Ok(Self { client, origin })
  }
}

#[async_trait]
impl Fetcher for HttpFetcher {
  async fn fetch(&self, request: &Request) -> Result<StoredResponse> {
    let method = reqwest::Method::from_bytes(request.method.as_bytes())
      .map_err(|e| eyre!("Invalid HTTP method '{}': {}", request.method, e))?;

    let response = self
      .client
      .request(method, request.url.clone())
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", request.url, e))?;

    let status = response.status().as_u16();
    let has_cors_headers = response
      .headers()
      .contains_key("access-control-allow-origin");
    let kind = classify(&self.origin, response.url(), has_cors_headers);

    let headers: Vec<(String, String)> = response
      .headers()
      .iter()
      .filter_map(|(name, value)| {
        value
          .to_str()
          .ok()
          .map(|v| (name.as_str().to_string(), v.to_string()))
      })
      .collect();

    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", request.url, e))?
      .to_vec();

    Ok(StoredResponse {
      status,
      headers,
      body,
      kind,
      fetched_at: Utc::now(),
    })
  }
}

/// Classify a response the way the platform types them: same-origin is
/// basic, cross-origin is cors when it exposes CORS headers and opaque
/// otherwise.
fn classify(app_origin: &Url, response_url: &Url, has_cors_headers: bool) -> ResponseKind {
  if response_url.origin() == app_origin.origin() {
    ResponseKind::Basic
  } else if has_cors_headers {
    ResponseKind::Cors
  } else {
    ResponseKind::Opaque
  }
}

#[cfg(test)]
pub mod tests {
  use super::*;
  use std::collections::HashMap;
  use std::sync::Mutex;

  /// Scripted fetcher for tests: serves canned responses by URL and records
  /// every request it sees. `offline()` makes every fetch fail.
  pub struct FakeFetcher {
    responses: Mutex<HashMap<String, StoredResponse>>,
    requested: Mutex<Vec<String>>,
    offline: bool,
  }

  impl FakeFetcher {
    pub fn new() -> Self {
      Self {
        responses: Mutex::new(HashMap::new()),
        requested: Mutex::new(Vec::new()),
        offline: false,
      }
    }

    pub fn offline(mut self) -> Self {
      self.offline = true;
      self
    }

    pub fn serve(&self, url: &str, response: StoredResponse) {
      self
        .responses
        .lock()
        .unwrap()
        .insert(url.to_string(), response);
    }

    pub fn requested(&self) -> Vec<String> {
      self.requested.lock().unwrap().clone()
    }
  }

  #[async_trait]
  impl Fetcher for FakeFetcher {
    async fn fetch(&self, request: &Request) -> Result<StoredResponse> {
      self
        .requested
        .lock()
        .unwrap()
        .push(request.url.as_str().to_string());

      if self.offline {
        return Err(eyre!("simulated offline: {}", request.url));
      }

      self
        .responses
        .lock()
        .unwrap()
        .get(request.url.as_str())
        .cloned()
        .ok_or_else(|| eyre!("no scripted response for {}", request.url))
    }
  }

  fn url(s: &str) -> Url {
    Url::parse(s).unwrap()
  }

  #[test]
  fn test_same_origin_is_basic() {
    let origin = url("https://breath.example.com");
    let response_url = url("https://breath.example.com/index.html");
    assert_eq!(classify(&origin, &response_url, false), ResponseKind::Basic);
  }

  #[test]
  fn test_cross_origin_with_cors_headers() {
    let origin = url("https://breath.example.com");
    let response_url = url("https://fonts.example.net/breath.woff2");
    assert_eq!(classify(&origin, &response_url, true), ResponseKind::Cors);
  }

  #[test]
  fn test_cross_origin_without_cors_headers_is_opaque() {
    let origin = url("https://breath.example.com");
    let response_url = url("https://fonts.example.net/breath.woff2");
    assert_eq!(classify(&origin, &response_url, false), ResponseKind::Opaque);
  }

  #[test]
  fn test_scheme_and_port_participate_in_origin() {
    let origin = url("https://breath.example.com");
    assert_eq!(
      classify(&origin, &url("http://breath.example.com/"), false),
      ResponseKind::Opaque
    );
    assert_eq!(
      classify(&origin, &url("https://breath.example.com:8443/"), false),
      ResponseKind::Opaque
    );
  }
}
