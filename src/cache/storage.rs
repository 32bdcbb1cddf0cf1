//! Cache storage trait and SQLite implementation.
//!
//! Entries live in named buckets; one bucket per cache generation. Lookups
//! search every bucket (matching the platform primitive the app shell relies
//! on), writes always target a named bucket.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::types::{Request, ResponseKind, StoredResponse};

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Create the bucket if it does not already exist.
  fn open_bucket(&self, name: &str) -> Result<()>;

  /// Store a response under the request's key, overwriting any previous
  /// entry for the same key in the same bucket.
  fn put(&self, bucket: &str, request: &Request, response: &StoredResponse) -> Result<()>;

  /// Look up a request in one specific bucket.
  fn match_in_bucket(&self, bucket: &str, request: &Request) -> Result<Option<StoredResponse>>;

  /// Look up a request across every bucket, oldest bucket first.
  fn match_any(&self, request: &Request) -> Result<Option<StoredResponse>>;

  /// Names of all existing buckets, in creation order.
  fn bucket_names(&self) -> Result<Vec<String>>;

  /// Delete a bucket and everything in it. Returns whether it existed.
  fn delete_bucket(&self, name: &str) -> Result<bool>;
}

/// SQLite-based cache storage.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
-- One row per cache generation
CREATE TABLE IF NOT EXISTS buckets (
    name TEXT PRIMARY KEY,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Response snapshots keyed by request (method + URL, hashed)
CREATE TABLE IF NOT EXISTS entries (
    bucket TEXT NOT NULL,
    request_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    kind TEXT NOT NULL,
    headers TEXT NOT NULL,
    body BLOB NOT NULL,
    fetched_at TEXT NOT NULL,
    PRIMARY KEY (bucket, request_key)
);

CREATE INDEX IF NOT EXISTS idx_entries_request_key ON entries(request_key);
"#;

impl SqliteStorage {
  /// Open storage at `path`, or at the default location when `None`.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("breath-worker").join("cache.db"))
  }

  #[cfg(test)]
  fn open_in_memory() -> Result<Self> {
    let conn =
      Connection::open_in_memory().map_err(|e| eyre!("Failed to open in-memory db: {}", e))?;
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }

  fn row_to_response(
    status: u16,
    kind: String,
    headers: String,
    body: Vec<u8>,
    fetched_at: String,
  ) -> Result<StoredResponse> {
    let kind =
      ResponseKind::parse(&kind).ok_or_else(|| eyre!("Unknown response kind '{}'", kind))?;
    let headers: Vec<(String, String)> = serde_json::from_str(&headers)
      .map_err(|e| eyre!("Failed to deserialize headers: {}", e))?;
    let fetched_at = parse_datetime(&fetched_at)?;

    Ok(StoredResponse {
      status,
      headers,
      body,
      kind,
      fetched_at,
    })
  }
}

impl CacheStorage for SqliteStorage {
  fn open_bucket(&self, name: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("INSERT OR IGNORE INTO buckets (name) VALUES (?)", params![name])
      .map_err(|e| eyre!("Failed to open bucket '{}': {}", name, e))?;

    Ok(())
  }

  fn put(&self, bucket: &str, request: &Request, response: &StoredResponse) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let headers = serde_json::to_string(&response.headers)
      .map_err(|e| eyre!("Failed to serialize headers: {}", e))?;

    // Create-if-absent, same as opening the bucket first
    conn
      .execute("INSERT OR IGNORE INTO buckets (name) VALUES (?)", params![bucket])
      .map_err(|e| eyre!("Failed to open bucket '{}': {}", bucket, e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO entries
           (bucket, request_key, method, url, status, kind, headers, body, fetched_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
          bucket,
          request.cache_key(),
          request.method,
          request.url.as_str(),
          response.status,
          response.kind.as_str(),
          headers,
          response.body,
          response.fetched_at.to_rfc3339(),
        ],
      )
      .map_err(|e| eyre!("Failed to store entry for {}: {}", request.url, e))?;

    Ok(())
  }

  fn match_in_bucket(&self, bucket: &str, request: &Request) -> Result<Option<StoredResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row = conn
      .query_row(
        "SELECT status, kind, headers, body, fetched_at FROM entries
         WHERE bucket = ? AND request_key = ?",
        params![bucket, request.cache_key()],
        |row| {
          Ok((
            row.get::<_, u16>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Vec<u8>>(3)?,
            row.get::<_, String>(4)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to query entry for {}: {}", request.url, e))?;

    match row {
      Some((status, kind, headers, body, fetched_at)) => {
        Ok(Some(Self::row_to_response(status, kind, headers, body, fetched_at)?))
      }
      None => Ok(None),
    }
  }

  fn match_any(&self, request: &Request) -> Result<Option<StoredResponse>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row = conn
      .query_row(
        "SELECT e.status, e.kind, e.headers, e.body, e.fetched_at FROM entries e
         INNER JOIN buckets b ON b.name = e.bucket
         WHERE e.request_key = ?
         ORDER BY b.created_at, b.rowid
         LIMIT 1",
        params![request.cache_key()],
        |row| {
          Ok((
            row.get::<_, u16>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
            row.get::<_, Vec<u8>>(3)?,
            row.get::<_, String>(4)?,
          ))
        },
      )
      .optional()
      .map_err(|e| eyre!("Failed to query entry for {}: {}", request.url, e))?;

    match row {
      Some((status, kind, headers, body, fetched_at)) => {
        Ok(Some(Self::row_to_response(status, kind, headers, body, fetched_at)?))
      }
      None => Ok(None),
    }
  }

  fn bucket_names(&self) -> Result<Vec<String>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT name FROM buckets ORDER BY created_at, rowid")
      .map_err(|e| eyre!("Failed to prepare bucket query: {}", e))?;

    let names = stmt
      .query_map([], |row| row.get::<_, String>(0))
      .map_err(|e| eyre!("Failed to list buckets: {}", e))?
      .filter_map(|r| r.ok())
      .collect();

    Ok(names)
  }

  fn delete_bucket(&self, name: &str) -> Result<bool> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute("DELETE FROM entries WHERE bucket = ?", params![name])
      .map_err(|e| eyre!("Failed to delete entries of bucket '{}': {}", name, e))?;

    let deleted = conn
      .execute("DELETE FROM buckets WHERE name = ?", params![name])
      .map_err(|e| eyre!("Failed to delete bucket '{}': {}", name, e))?;

    Ok(deleted > 0)
  }
}

/// In-memory cache storage for tests and ephemeral runs.
pub struct MemoryStorage {
  // Vec keeps bucket creation order for match_any
  buckets: Mutex<Vec<(String, HashMap<String, StoredResponse>)>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self {
      buckets: Mutex::new(Vec::new()),
    }
  }
}

impl Default for MemoryStorage {
  fn default() -> Self {
    Self::new()
  }
}

impl CacheStorage for MemoryStorage {
  fn open_bucket(&self, name: &str) -> Result<()> {
    let mut buckets = self
      .buckets
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    if !buckets.iter().any(|(n, _)| n == name) {
      buckets.push((name.to_string(), HashMap::new()));
    }
    Ok(())
  }

  fn put(&self, bucket: &str, request: &Request, response: &StoredResponse) -> Result<()> {
    let mut buckets = self
      .buckets
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    match buckets.iter_mut().find(|(n, _)| n == bucket) {
      Some((_, entries)) => {
        entries.insert(request.cache_key(), response.clone());
      }
      None => {
        let mut entries = HashMap::new();
        entries.insert(request.cache_key(), response.clone());
        buckets.push((bucket.to_string(), entries));
      }
    }
    Ok(())
  }

  fn match_in_bucket(&self, bucket: &str, request: &Request) -> Result<Option<StoredResponse>> {
    let buckets = self
      .buckets
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(
      buckets
        .iter()
        .find(|(n, _)| n == bucket)
        .and_then(|(_, entries)| entries.get(&request.cache_key()).cloned()),
    )
  }

  fn match_any(&self, request: &Request) -> Result<Option<StoredResponse>> {
    let buckets = self
      .buckets
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let key = request.cache_key();
    Ok(
      buckets
        .iter()
        .find_map(|(_, entries)| entries.get(&key).cloned()),
    )
  }

  fn bucket_names(&self) -> Result<Vec<String>> {
    let buckets = self
      .buckets
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    Ok(buckets.iter().map(|(n, _)| n.clone()).collect())
  }

  fn delete_bucket(&self, name: &str) -> Result<bool> {
    let mut buckets = self
      .buckets
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let before = buckets.len();
    buckets.retain(|(n, _)| n != name);
    Ok(buckets.len() < before)
  }
}

/// Parse an RFC 3339 datetime string back into UTC.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::types::Destination;
  use url::Url;

  fn request(url: &str) -> Request {
    Request::get(Url::parse(url).unwrap())
  }

  fn response(status: u16, body: &[u8]) -> StoredResponse {
    StoredResponse {
      status,
      headers: vec![("content-type".to_string(), "text/html".to_string())],
      body: body.to_vec(),
      kind: ResponseKind::Basic,
      fetched_at: Utc::now(),
    }
  }

  fn exercise_put_and_match(storage: &dyn CacheStorage) {
    let req = request("https://breath.example.com/index.html");
    let resp = response(200, b"<html>ok</html>");

    storage.open_bucket("v1").unwrap();
    storage.put("v1", &req, &resp).unwrap();

    let hit = storage.match_in_bucket("v1", &req).unwrap().unwrap();
    assert_eq!(hit.status, 200);
    assert_eq!(hit.body, b"<html>ok</html>");
    assert_eq!(hit.kind, ResponseKind::Basic);
    assert_eq!(hit.headers, resp.headers);

    let miss = request("https://breath.example.com/missing.html");
    assert!(storage.match_in_bucket("v1", &miss).unwrap().is_none());
    assert!(storage.match_any(&miss).unwrap().is_none());
  }

  fn exercise_buckets(storage: &dyn CacheStorage) {
    storage.open_bucket("v1").unwrap();
    storage.open_bucket("v2").unwrap();
    // Opening twice is a no-op
    storage.open_bucket("v1").unwrap();

    assert_eq!(storage.bucket_names().unwrap(), vec!["v1", "v2"]);

    let req = request("https://breath.example.com/");
    storage.put("v1", &req, &response(200, b"old")).unwrap();

    assert!(storage.delete_bucket("v1").unwrap());
    assert!(!storage.delete_bucket("v1").unwrap());
    assert_eq!(storage.bucket_names().unwrap(), vec!["v2"]);
    assert!(storage.match_any(&req).unwrap().is_none());
  }

  fn exercise_match_any_prefers_oldest_bucket(storage: &dyn CacheStorage) {
    let req = request("https://breath.example.com/app.js");
    storage.put("v1", &req, &response(200, b"one")).unwrap();
    storage.put("v2", &req, &response(200, b"two")).unwrap();

    let hit = storage.match_any(&req).unwrap().unwrap();
    assert_eq!(hit.body, b"one");
  }

  fn exercise_overwrite(storage: &dyn CacheStorage) {
    let req = request("https://breath.example.com/style.css");
    storage.put("v1", &req, &response(200, b"first")).unwrap();
    storage.put("v1", &req, &response(200, b"second")).unwrap();

    let hit = storage.match_in_bucket("v1", &req).unwrap().unwrap();
    assert_eq!(hit.body, b"second");
  }

  #[test]
  fn test_sqlite_put_and_match() {
    exercise_put_and_match(&SqliteStorage::open_in_memory().unwrap());
  }

  #[test]
  fn test_sqlite_buckets() {
    exercise_buckets(&SqliteStorage::open_in_memory().unwrap());
  }

  #[test]
  fn test_sqlite_match_any_prefers_oldest_bucket() {
    exercise_match_any_prefers_oldest_bucket(&SqliteStorage::open_in_memory().unwrap());
  }

  #[test]
  fn test_sqlite_overwrite() {
    exercise_overwrite(&SqliteStorage::open_in_memory().unwrap());
  }

  #[test]
  fn test_memory_put_and_match() {
    exercise_put_and_match(&MemoryStorage::new());
  }

  #[test]
  fn test_memory_buckets() {
    exercise_buckets(&MemoryStorage::new());
  }

  #[test]
  fn test_memory_match_any_prefers_oldest_bucket() {
    exercise_match_any_prefers_oldest_bucket(&MemoryStorage::new());
  }

  #[test]
  fn test_memory_overwrite() {
    exercise_overwrite(&MemoryStorage::new());
  }

  #[test]
  fn test_key_matches_across_destinations() {
    let storage = SqliteStorage::open_in_memory().unwrap();
    let url = Url::parse("https://breath.example.com/").unwrap();

    // Pre-cached as a plain asset, later requested as a navigation
    storage
      .put("v1", &Request::get(url.clone()), &response(200, b"root"))
      .unwrap();

    let navigation = Request::new("GET", url, Destination::Document);
    let hit = storage.match_any(&navigation).unwrap().unwrap();
    assert_eq!(hit.body, b"root");
  }
}
