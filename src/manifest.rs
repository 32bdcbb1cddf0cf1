//! Build-time constants describing what the worker caches.

/// Name of the current cache generation.
///
/// Bump this whenever [`PRECACHE_PATHS`] changes so activation evicts the
/// previous generation.
pub const CACHE_NAME: &str = "breath-trainer-v1.0.0";

/// Root-relative assets pre-cached at install time.
pub const PRECACHE_PATHS: &[&str] = &[
  "/",
  "/index.html",
  "/manifest.json",
  "/icons/icon-192x192.png",
  "/icons/icon-512x512.png",
];

/// URL substrings that must never be cached.
///
/// Third-party dynamic endpoints; requests matching these pass through
/// the interceptor untouched.
pub const BYPASS_HOSTS: &[&str] = &["script.google.com", "googleapis.com"];

/// Tag that triggers the background sync task.
pub const SYNC_TAG: &str = "background-sync";

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_root_is_precached() {
    // The offline document fallback depends on "/" being in the manifest.
    assert!(PRECACHE_PATHS.contains(&"/"));
  }

  #[test]
  fn test_cache_name_is_versioned() {
    assert!(CACHE_NAME.starts_with("breath-trainer-v"));
  }
}
