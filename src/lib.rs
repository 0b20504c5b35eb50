//! # offcache
//!
//! An offline-first request cache manager for HTTP/1.1 services.
//!
//! offcache sits between clients and an origin, snapshots the responses the
//! origin serves while it is up, and replays them when it is not. Requests
//! are classified first (API, auth and upgrade traffic always bypasses the
//! cache), intercepted requests run a network-first strategy against a named
//! cache generation, and a request that can be answered neither live nor from
//! the cache gets a self-contained offline page instead of a connection
//! error.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use offcache::config::CacheConfig;
//! use offcache::manager::OfflineCache;
//! use offcache::proxy::Proxy;
//! use offcache::store::DiskStore;
//! use offcache::transport::HttpTransport;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cache = OfflineCache::new(
//!         CacheConfig::default(),
//!         Arc::new(DiskStore::new("./cache")),
//!         Arc::new(HttpTransport::new("127.0.0.1:3000")),
//!     );
//!     cache.install().await?;
//!     cache.activate().await?;
//!
//!     let proxy = Proxy::bind("127.0.0.1:8080").await?;
//!     proxy.run(Arc::new(cache)).await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod fallback;
pub mod http;
pub mod lifecycle;
pub mod manager;
pub mod policy;
pub mod proxy;
pub mod store;
pub mod strategy;
pub mod transport;

#[cfg(test)]
mod testutil;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use config::CacheConfig;
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use manager::OfflineCache;
pub use proxy::{Proxy, ProxyError};
pub use store::{CacheStore, DiskStore, Generation, MemoryStore, RequestKey, StoredResponse};
pub use strategy::NetworkFirst;
pub use transport::{HttpTransport, Transport};
