//! Core types for the request/response cache.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use url::Url;

/// What kind of resource a request targets (the platform's request
/// destination). Only `Document` participates in the offline fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Destination {
  Document,
  Script,
  Style,
  Image,
  Font,
  Manifest,
  #[default]
  Other,
}

/// A request as seen by the fetch interceptor.
#[derive(Debug, Clone)]
pub struct Request {
  /// Uppercase HTTP method
  pub method: String,
  pub url: Url,
  pub destination: Destination,
}

impl Request {
  pub fn new(method: &str, url: Url, destination: Destination) -> Self {
    Self {
      method: method.to_uppercase(),
      url,
      destination,
    }
  }

  /// A plain GET request with no particular destination.
  pub fn get(url: Url) -> Self {
    Self::new("GET", url, Destination::Other)
  }

  /// A GET request for a document navigation.
  pub fn document(url: Url) -> Self {
    Self::new("GET", url, Destination::Document)
  }

  /// Stable fixed-length storage key for this request.
  ///
  /// Method + URL identify an entry; the destination does not participate,
  /// so a pre-cached asset matches regardless of how it is later requested.
  pub fn cache_key(&self) -> String {
    let mut hasher = Sha256::new();
    hasher.update(self.method.as_bytes());
    hasher.update(b" ");
    hasher.update(self.url.as_str().as_bytes());
    hex::encode(hasher.finalize())
  }
}

/// Browser-style response classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseKind {
  /// Same-origin response; safe to cache
  Basic,
  /// Cross-origin response with CORS headers
  Cors,
  /// Cross-origin response without readable headers
  Opaque,
}

impl ResponseKind {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Basic => "basic",
      Self::Cors => "cors",
      Self::Opaque => "opaque",
    }
  }

  pub fn parse(s: &str) -> Option<Self> {
    match s {
      "basic" => Some(Self::Basic),
      "cors" => Some(Self::Cors),
      "opaque" => Some(Self::Opaque),
      _ => None,
    }
  }
}

/// Snapshot of a response, as stored in (or served from) the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResponse {
  pub status: u16,
  pub headers: Vec<(String, String)>,
  pub body: Vec<u8>,
  pub kind: ResponseKind,
  pub fetched_at: DateTime<Utc>,
}

impl StoredResponse {
  /// Whether the interceptor may store this response: present, 200, and
  /// same-origin. Anything else is passed through uncached.
  pub fn is_cacheable(&self) -> bool {
    self.status == 200 && self.kind == ResponseKind::Basic
  }
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchSource {
  /// Served from the cache without touching the network
  Cache,
  /// Fresh from the network
  Network,
  /// Network failed; served the cached root document instead
  OfflineFallback,
}

/// Reply produced by the fetch interceptor for a single request.
#[derive(Debug)]
pub enum FetchReply {
  /// Denylisted URL; the host performs its own uncached fetch
  Bypass,
  /// A response, and where it came from
  Response {
    response: StoredResponse,
    source: FetchSource,
  },
  /// Offline with no fallback available; the failure is swallowed
  NoResponse,
}

#[cfg(test)]
mod tests {
  use super::*;

  fn response(status: u16, kind: ResponseKind) -> StoredResponse {
    StoredResponse {
      status,
      headers: Vec::new(),
      body: Vec::new(),
      kind,
      fetched_at: Utc::now(),
    }
  }

  #[test]
  fn test_cache_key_ignores_destination() {
    let url = Url::parse("https://breath.example.com/index.html").unwrap();
    let as_other = Request::get(url.clone());
    let as_document = Request::document(url);
    assert_eq!(as_other.cache_key(), as_document.cache_key());
  }

  #[test]
  fn test_cache_key_distinguishes_method_and_url() {
    let url = Url::parse("https://breath.example.com/").unwrap();
    let get = Request::get(url.clone());
    let head = Request::new("HEAD", url, Destination::Other);
    assert_ne!(get.cache_key(), head.cache_key());

    let other = Request::get(Url::parse("https://breath.example.com/index.html").unwrap());
    assert_ne!(get.cache_key(), other.cache_key());
  }

  #[test]
  fn test_method_is_normalized() {
    let url = Url::parse("https://breath.example.com/").unwrap();
    let lower = Request::new("get", url.clone(), Destination::Other);
    let upper = Request::get(url);
    assert_eq!(lower.cache_key(), upper.cache_key());
  }

  #[test]
  fn test_cacheable_requires_basic_200() {
    assert!(response(200, ResponseKind::Basic).is_cacheable());
    assert!(!response(404, ResponseKind::Basic).is_cacheable());
    assert!(!response(200, ResponseKind::Cors).is_cacheable());
    assert!(!response(200, ResponseKind::Opaque).is_cacheable());
  }

  #[test]
  fn test_response_kind_round_trip() {
    for kind in [ResponseKind::Basic, ResponseKind::Cors, ResponseKind::Opaque] {
      assert_eq!(ResponseKind::parse(kind.as_str()), Some(kind));
    }
    assert_eq!(ResponseKind::parse("weird"), None);
  }
}
