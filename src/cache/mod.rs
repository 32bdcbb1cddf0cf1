//! Request/response cache: generation buckets and cache-first interception.
//!
//! This module provides:
//! - A storage seam ([`CacheStorage`]) with SQLite and in-memory backends,
//!   organized as named buckets (one per cache generation)
//! - The cache-first fetch policy ([`CacheFirst`]): serve hits locally,
//!   store fresh same-origin responses, fall back to the cached root
//!   document for offline navigations

mod layer;
mod storage;
mod types;

pub use layer::CacheFirst;
pub use storage::{CacheStorage, MemoryStorage, SqliteStorage};
pub use types::{Destination, FetchReply, FetchSource, Request, ResponseKind, StoredResponse};
