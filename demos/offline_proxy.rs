//! Offline-caching proxy in front of a local origin.
//!
//! Run any HTTP/1.1 origin on 127.0.0.1:3000, then:
//!
//! ```text
//! cargo run --example offline_proxy
//! curl http://127.0.0.1:8080/
//! ```
//!
//! Stop the origin and curl again: precached and runtime-cached responses
//! keep coming back, everything else gets the offline page.
//!
//! An optional first argument points at a JSON config file:
//!
//! ```json
//! {
//!   "generationName": "demo-v1",
//!   "precacheList": ["/", "/manifest.json"],
//!   "bypassPrefixes": ["/api/"]
//! }
//! ```

use std::sync::Arc;
use std::time::Duration;

use offcache::config::CacheConfig;
use offcache::manager::OfflineCache;
use offcache::proxy::Proxy;
use offcache::store::DiskStore;
use offcache::transport::HttpTransport;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("offcache=debug,info")),
        )
        .init();

    let config = match std::env::args().nth(1) {
        Some(path) => CacheConfig::from_json_file(&path)?,
        None => CacheConfig::default(),
    };

    let store = Arc::new(DiskStore::new("./offcache-data"));
    let transport =
        Arc::new(HttpTransport::new("127.0.0.1:3000").with_timeout(Duration::from_secs(30)));
    let cache = OfflineCache::new(config, store, transport);

    // A dead origin only costs us the pre-load; the proxy still serves.
    match cache.install().await {
        Ok(generation) => info!(generation = %generation, "cache installed"),
        Err(error) => warn!(error = %error, "install failed, passthrough only"),
    }
    if let Err(error) = cache.activate().await {
        warn!(error = %error, "activation skipped");
    }

    let proxy = Proxy::bind("127.0.0.1:8080").await?;
    info!("proxying http://127.0.0.1:8080 -> http://127.0.0.1:3000");
    proxy.run(Arc::new(cache)).await?;
    Ok(())
}
