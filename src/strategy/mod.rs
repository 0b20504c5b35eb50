//! Caching strategy — network first, cache fallback, offline fallback last.
//!
//! Every intercepted request runs the same three-step ladder:
//!
//! 1. Try the origin. A response — any status — wins and is returned as-is.
//! 2. On network failure, replay the entry stored under the request's key in
//!    the active generation, if one exists.
//! 3. Otherwise render an offline fallback: a full HTML page for navigations,
//!    a bare `503` for sub-resources.
//!
//! Successful, cacheable responses from step 1 are snapshotted into the store
//! on a detached task. The client never waits on a cache write, and a failed
//! write is logged and forgotten — the response already left.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::fallback;
use crate::http::{Request, Response};
use crate::store::{CacheStore, Generation, RequestKey, StoredResponse};
use crate::transport::Transport;

/// The network-first strategy, bound to one store generation.
///
/// Cheap to clone; clones share the same transport and store.
#[derive(Clone)]
pub struct NetworkFirst {
    transport: Arc<dyn Transport>,
    store: Arc<dyn CacheStore>,
    generation: Generation,
    cacheable_extensions: Vec<String>,
    cacheable_content_types: Vec<String>,
}

impl NetworkFirst {
    /// Creates a strategy writing to (and falling back on) `generation`.
    ///
    /// `cacheable_extensions` are matched against the end of the request
    /// path; `cacheable_content_types` are prefix-matched against the
    /// response's `Content-Type`. Either match makes a response storable.
    pub fn new(
        transport: Arc<dyn Transport>,
        store: Arc<dyn CacheStore>,
        generation: Generation,
        cacheable_extensions: Vec<String>,
        cacheable_content_types: Vec<String>,
    ) -> Self {
        Self {
            transport,
            store,
            generation,
            cacheable_extensions,
            cacheable_content_types,
        }
    }

    /// Returns the generation this strategy reads and writes.
    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    /// Runs the ladder for one intercepted request.
    pub async fn execute(&self, request: Request) -> Response {
        let key = RequestKey::of(&request);
        let path = request.path().to_owned();
        let safe_method = request.method().is_safe();
        let is_navigation = request.is_navigation();

        match self.transport.fetch(request).await {
            Ok(response) => {
                if safe_method
                    && response.status().is_success()
                    && self.is_cacheable(&path, &response)
                {
                    self.store_detached(key, &response);
                }
                response
            }
            Err(error) => {
                warn!(key = %key, error = %error, "origin fetch failed, trying cache");
                match self.store.get(&self.generation, &key).await {
                    Ok(Some(entry)) => {
                        debug!(key = %key, generation = %self.generation, "serving cached response");
                        entry.into_response()
                    }
                    Ok(None) => Self::offline_fallback(is_navigation),
                    Err(store_error) => {
                        warn!(key = %key, error = %store_error, "cache lookup failed");
                        Self::offline_fallback(is_navigation)
                    }
                }
            }
        }
    }

    fn offline_fallback(is_navigation: bool) -> Response {
        if is_navigation {
            fallback::offline_page()
        } else {
            fallback::unavailable()
        }
    }

    fn is_cacheable(&self, path: &str, response: &Response) -> bool {
        if self
            .cacheable_extensions
            .iter()
            .any(|ext| path.ends_with(ext.as_str()))
        {
            return true;
        }
        response.headers().get("content-type").is_some_and(|value| {
            let content_type = value.to_ascii_lowercase();
            self.cacheable_content_types
                .iter()
                .any(|allowed| content_type.starts_with(allowed.as_str()))
        })
    }

    /// Snapshots `response` and hands the write to a detached task.
    fn store_detached(&self, key: RequestKey, response: &Response) {
        let snapshot = StoredResponse::snapshot(response);
        let store = Arc::clone(&self.store);
        let generation = self.generation.clone();
        tokio::spawn(async move {
            if let Err(error) = store.put(&generation, key.clone(), snapshot).await {
                warn!(
                    key = %key,
                    generation = %generation,
                    error = %error,
                    "background cache write failed"
                );
            }
        });
    }
}
