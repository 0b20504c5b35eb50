//! The cache manager facade tying classification, lifecycle and strategy together.
//!
//! [`OfflineCache`] is the one type most applications need. It owns the
//! request [`Classifier`], the generation [`Lifecycle`] and, once installed,
//! a [`NetworkFirst`] strategy bound to the active generation. Every inbound
//! request goes through [`OfflineCache::handle`], which routes it down one of
//! two paths:
//!
//! | Classification | Path |
//! |----------------|------|
//! | Bypass         | forwarded to the origin untouched, never cached |
//! | Intercept      | network-first strategy against the active generation |
//!
//! Before [`OfflineCache::install`] has run there is no generation to serve
//! from, so intercepted requests are forwarded transparently as well.
//!
//! # Examples
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use offcache::config::CacheConfig;
//! use offcache::manager::OfflineCache;
//! use offcache::store::MemoryStore;
//! use offcache::transport::HttpTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = OfflineCache::new(
//!         CacheConfig::default(),
//!         Arc::new(MemoryStore::new()),
//!         Arc::new(HttpTransport::new("127.0.0.1:3000")),
//!     );
//!     cache.install().await?;
//!     cache.activate().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::http::{Request, Response, StatusCode};
use crate::lifecycle::{Lifecycle, LifecycleError};
use crate::policy::{Classifier, InterceptPolicy};
use crate::store::{CacheStore, Generation};
use crate::strategy::NetworkFirst;
use crate::transport::Transport;

/// Offline-capable request cache manager.
///
/// Construct one per upstream, [`install`](Self::install) it to pre-load the
/// configured assets, [`activate`](Self::activate) it to retire older
/// generations, then feed it requests through [`handle`](Self::handle).
pub struct OfflineCache {
    classifier: Classifier,
    lifecycle: Lifecycle,
    transport: Arc<dyn Transport>,
    store: Arc<dyn CacheStore>,
    config: CacheConfig,
    strategy: RwLock<Option<NetworkFirst>>,
}

impl OfflineCache {
    /// Wires a manager from its three collaborators.
    ///
    /// The manager starts uninstalled: requests are forwarded transparently
    /// until [`install`](Self::install) succeeds.
    pub fn new(
        config: CacheConfig,
        store: Arc<dyn CacheStore>,
        transport: Arc<dyn Transport>,
    ) -> Self {
        let classifier = Classifier::new(config.bypass_prefixes.clone());
        let lifecycle = Lifecycle::new(
            Arc::clone(&store),
            Arc::clone(&transport),
            config.generation_name.clone(),
            config.precache_list.clone(),
        );
        Self {
            classifier,
            lifecycle,
            transport,
            store,
            config,
            strategy: RwLock::new(None),
        }
    }

    /// Opens the configured generation, pre-loads its assets and arms the
    /// caching strategy.
    ///
    /// Idempotent. Intercepted requests hit the strategy only after this
    /// returns `Ok`.
    ///
    /// # Errors
    ///
    /// Fails when the generation cannot be opened; pre-load failures are
    /// logged and skipped.
    pub async fn install(&self) -> Result<Generation, LifecycleError> {
        let generation = self.lifecycle.install().await?;
        let strategy = NetworkFirst::new(
            Arc::clone(&self.transport),
            Arc::clone(&self.store),
            generation.clone(),
            self.config.cacheable_extensions.clone(),
            self.config.cacheable_content_types.clone(),
        );
        *self.strategy.write().await = Some(strategy);
        Ok(generation)
    }

    /// Retires every stored generation except the active one.
    ///
    /// # Errors
    ///
    /// Fails with [`LifecycleError::NotInstalled`] before a successful
    /// [`install`](Self::install), or when the store cannot be listed.
    pub async fn activate(&self) -> Result<Generation, LifecycleError> {
        self.lifecycle.activate().await
    }

    /// The active generation, if installed.
    pub async fn generation(&self) -> Option<Generation> {
        self.lifecycle.current().await
    }

    /// Routes one request and always produces a response.
    ///
    /// Bypassed requests (and all requests before install) go straight to
    /// the origin; an unreachable origin turns into a plain `502`.
    /// Intercepted requests run the network-first ladder and fall back to
    /// the cache or an offline page instead.
    pub async fn handle(&self, request: Request) -> Response {
        match self.classifier.classify(&request) {
            InterceptPolicy::Bypass => self.forward(request).await,
            InterceptPolicy::Intercept => {
                let strategy = self.strategy.read().await.clone();
                match strategy {
                    Some(strategy) => strategy.execute(request).await,
                    None => {
                        debug!(target = %request.target(), "not installed, forwarding");
                        self.forward(request).await
                    }
                }
            }
        }
    }

    /// Forwards a request to the origin without touching the cache.
    async fn forward(&self, request: Request) -> Response {
        let target = request.target();
        match self.transport.fetch(request).await {
            Ok(response) => response,
            Err(error) => {
                warn!(target = %target, error = %error, "forwarded fetch failed");
                Response::new(StatusCode::BAD_GATEWAY)
                    .header("Content-Type", "text/plain; charset=utf-8")
                    .body_text("upstream unreachable\n")
            }
        }
    }
}
