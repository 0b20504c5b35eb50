//! Async TCP front door for the cache manager.
//!
//! Accepts HTTP/1.1 connections and funnels every request through
//! [`OfflineCache::handle`], so clients keep getting answers while the origin
//! is down. Persistent connections are supported; pipelined requests are
//! served in order from the same buffer.

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};
use crate::manager::OfflineCache;

/// Errors produced by the proxy.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Maximum size of a complete HTTP request we will buffer before rejecting it (8 MiB).
const MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The offline-cache proxy.
///
/// Binds to a TCP address and routes every incoming HTTP/1.1 request through
/// a shared [`OfflineCache`].
///
/// # Examples
///
/// ```rust,no_run
/// use std::sync::Arc;
///
/// use offcache::config::CacheConfig;
/// use offcache::manager::OfflineCache;
/// use offcache::proxy::Proxy;
/// use offcache::store::MemoryStore;
/// use offcache::transport::HttpTransport;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let cache = OfflineCache::new(
///         CacheConfig::default(),
///         Arc::new(MemoryStore::new()),
///         Arc::new(HttpTransport::new("127.0.0.1:3000")),
///     );
///     cache.install().await?;
///     cache.activate().await?;
///
///     let proxy = Proxy::bind("127.0.0.1:8080").await?;
///     proxy.run(Arc::new(cache)).await?;
///     Ok(())
/// }
/// ```
pub struct Proxy {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Proxy {
    /// Binds the proxy to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ProxyError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ProxyError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
        })
    }

    /// Returns the local address the proxy is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Starts accepting connections and routing requests through `cache`.
    ///
    /// This method runs until the process is terminated or an unrecoverable
    /// listener error occurs.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Io`] if the TCP listener itself fails.
    pub async fn run(self, cache: Arc<OfflineCache>) -> Result<(), ProxyError> {
        info!(address = %self.local_addr, "offcache proxy listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let cache = Arc::clone(&cache);

            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, peer_addr, cache).await {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Handles a single TCP connection over its lifetime.
///
/// HTTP/1.1 connections are persistent by default: we loop, serving one
/// request per iteration, until the peer closes the connection or signals
/// `Connection: close`. Buffered bytes are drained before reading again, so
/// pipelined requests never stall.
async fn handle_connection(
    mut stream: TcpStream,
    peer_addr: SocketAddr,
    cache: Arc<OfflineCache>,
) -> Result<(), std::io::Error> {
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);

    loop {
        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => {
                // Guard against excessively large requests.
                if buf.len() > MAX_REQUEST_SIZE {
                    warn!(peer = %peer_addr, "request too large, sending 413");
                    let response = Response::new(StatusCode::PAYLOAD_TOO_LARGE)
                        .body_text("Request entity too large")
                        .keep_alive(false);
                    stream.write_all(&response.into_bytes()).await?;
                    break;
                }
                if stream.read_buf(&mut buf).await? == 0 {
                    debug!(peer = %peer_addr, "connection closed by peer");
                    break;
                }
                continue;
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                let response = Response::new(StatusCode::BAD_REQUEST)
                    .body_text(format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        // Wait for the full body to arrive if Content-Length is set. A
        // declared length the buffer index cannot hold is oversize too.
        let content_length = request.content_length().unwrap_or(0);
        let total_needed = match body_offset.checked_add(content_length) {
            Some(total) if total <= MAX_REQUEST_SIZE => total,
            _ => {
                warn!(peer = %peer_addr, "request body too large, sending 413");
                let response = Response::new(StatusCode::PAYLOAD_TOO_LARGE)
                    .body_text("Request entity too large")
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };
        if buf.len() < total_needed {
            if stream.read_buf(&mut buf).await? == 0 {
                debug!(peer = %peer_addr, "connection closed mid-request");
                break;
            }
            continue;
        }

        // Parsing grabs every buffered byte after the head; trim the body to
        // its declared length so pipelined frames stay out of it.
        let body = request.body().slice(..content_length);
        let request = request.body_bytes(body);
        let keep_alive = request.is_keep_alive();

        debug!(
            peer = %peer_addr,
            method = %request.method(),
            path = %request.path(),
            "dispatching request"
        );

        let response = cache.handle(request).await.keep_alive(keep_alive);
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        // Drop the consumed request bytes from the buffer.
        let _ = buf.split_to(total_needed);

        if !keep_alive {
            debug!(peer = %peer_addr, "Connection: close, shutting down");
            break;
        }
    }

    Ok(())
}
