//! Cache store — generation-scoped persistence for response snapshots.
//!
//! The store is a two-level map: named *generations* (one per deployed asset
//! set) each hold entries keyed by request identity. Swapping the configured
//! generation name and re-activating retires every older generation wholesale,
//! which is how stale assets are evicted without per-entry bookkeeping.
//!
//! ## Core types
//!
//! - [`CacheStore`] — trait implemented by all storage backends.
//! - [`Generation`] — cheap, cloneable handle to one named generation.
//! - [`RequestKey`] — the request identity entries are stored under.
//! - [`StoredResponse`] — a response snapshot safe to replay later.
//! - [`StoreError`] — what a backend reports when an operation fails.
//!
//! ## Backends
//!
//! - [`MemoryStore`](memory::MemoryStore) — process-local hash maps.
//! - [`DiskStore`](disk::DiskStore) — one directory per generation on disk.

use std::{future::Future, pin::Pin, sync::Arc};

use bytes::Bytes;
use thiserror::Error;

use crate::http::{Request, Response, StatusCode};

pub mod disk;
pub mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

/// Errors reported by cache store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The targeted generation does not exist (it may have been retired by a
    /// concurrent activation).
    #[error("unknown cache generation: {name}")]
    UnknownGeneration { name: String },

    /// The generation name cannot be represented by this backend.
    #[error("invalid generation name: {name:?}")]
    InvalidName { name: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted entry could not be decoded.
    #[error("corrupt cache entry: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// The boxed future returned by every [`CacheStore`] operation.
///
/// Futures are `'static`: implementations clone their shared state into the
/// future rather than borrowing from `&self`, so callers can detach them onto
/// background tasks.
pub type StoreFuture<T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send>>;

/// The storage backend trait.
///
/// Implementors provide atomic per-key reads and writes; no operation ever
/// observes a half-written entry. There is no cross-key transaction — the
/// eviction model works on whole generations instead.
///
/// # Contract
///
/// - Implementations **must** be `Send + Sync`; one store instance is shared
///   across every request task.
/// - [`open`](Self::open) **must** be idempotent: opening an existing
///   generation returns a handle to it unchanged.
/// - [`get`](Self::get) against a retired generation **must** report a miss
///   (`Ok(None)`), not an error — a replayed lookup racing an activation is
///   an ordinary miss.
/// - [`put`](Self::put) against a retired generation **must** fail with
///   [`StoreError::UnknownGeneration`] so detached writes surface in logs
///   instead of resurrecting deleted state.
pub trait CacheStore: Send + Sync {
    /// Opens the named generation, creating it when absent.
    fn open(&self, name: &str) -> StoreFuture<Generation>;

    /// Looks up the entry stored under `key` in `generation`.
    fn get(
        &self,
        generation: &Generation,
        key: &RequestKey,
    ) -> StoreFuture<Option<StoredResponse>>;

    /// Stores `response` under `key` in `generation`, replacing any previous
    /// entry for that key.
    fn put(
        &self,
        generation: &Generation,
        key: RequestKey,
        response: StoredResponse,
    ) -> StoreFuture<()>;

    /// Lists every generation currently present, in no particular order.
    fn list(&self) -> StoreFuture<Vec<Generation>>;

    /// Deletes a generation and all of its entries.
    ///
    /// Returns `true` when the generation existed, `false` when there was
    /// nothing to delete.
    fn delete(&self, generation: &Generation) -> StoreFuture<bool>;
}

/// Handle to one named cache generation.
///
/// Cloning is cheap; the strategy engine clones a handle into every detached
/// write task.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Generation {
    name: Arc<str>,
}

impl Generation {
    /// Creates a handle for the given generation name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Arc::from(name.into()),
        }
    }

    /// Returns the generation name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// The identity a response is cached under: method plus full request target.
///
/// The query string participates in the target, so `/search?q=a` and
/// `/search?q=b` are distinct entries. Request headers and body do not
/// participate — the cache serves one representation per resource.
///
/// # Examples
///
/// ```
/// use offcache::http::Request;
/// use offcache::store::RequestKey;
///
/// let a = RequestKey::of(&Request::get("/app.js?v=1"));
/// let b = RequestKey::of(&Request::get("/app.js?v=2"));
/// assert_ne!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct RequestKey {
    method: String,
    target: String,
}

impl RequestKey {
    /// Derives the cache key for a request.
    pub fn of(request: &Request) -> Self {
        Self {
            method: request.method().as_str().to_owned(),
            target: request.target(),
        }
    }

    /// Returns the method half of the key.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Returns the target (path plus query) half of the key.
    pub fn target(&self) -> &str {
        &self.target
    }
}

impl std::fmt::Display for RequestKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.method, self.target)
    }
}

/// Headers that describe the connection a response arrived on rather than the
/// response itself. Replaying them later would corrupt framing on a different
/// connection, so snapshots drop them.
const HOP_BY_HOP: [&str; 9] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
    "content-length",
];

/// A frozen copy of a response, detached from the connection it arrived on.
///
/// Snapshots keep the status, the end-to-end headers, and the full body.
/// Hop-by-hop and framing headers are stripped at capture time; the
/// serializer recomputes framing when the snapshot is replayed.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredResponse {
    status: StatusCode,
    headers: Vec<(String, String)>,
    body: Bytes,
}

impl StoredResponse {
    /// Captures a replayable snapshot of `response`.
    pub fn snapshot(response: &Response) -> Self {
        let headers = response
            .headers()
            .iter()
            .filter(|(name, _)| !HOP_BY_HOP.iter().any(|h| name.eq_ignore_ascii_case(h)))
            .map(|(name, value)| (name.to_owned(), value.to_owned()))
            .collect();

        Self {
            status: response.status(),
            headers,
            body: response.body().clone(),
        }
    }

    /// Reassembles a snapshot from persisted parts. The parts are trusted to
    /// have been produced by [`snapshot`](Self::snapshot).
    pub fn from_parts(status: StatusCode, headers: Vec<(String, String)>, body: Bytes) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    /// Returns the snapshotted status code.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Returns the snapshotted headers in arrival order.
    pub fn headers(&self) -> &[(String, String)] {
        &self.headers
    }

    /// Returns the snapshotted body.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Rebuilds a live [`Response`] from this snapshot.
    pub fn into_response(self) -> Response {
        let mut response = Response::new(self.status);
        for (name, value) in self.headers {
            response.add_header(name, value);
        }
        response.body_bytes(self.body)
    }
}
