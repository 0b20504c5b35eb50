//! Origin transport — one-shot HTTP/1.1 exchanges over TCP.
//!
//! The cache never reuses origin connections: each fetch opens a TCP
//! connection, sends one request with `Connection: close`, reads one
//! response, and lets the connection drop. Forcing `close` means a response
//! with no framing headers is still readable (the body simply runs to EOF).
//!
//! Body framing is resolved in this order:
//!
//! | Body framing    | Detection                    | Read strategy             |
//! |-----------------|------------------------------|---------------------------|
//! | none            | `HEAD`, `1xx`, `204`, `304`  | return immediately        |
//! | chunked         | `Transfer-Encoding: chunked` | decode until last chunk   |
//! | sized           | `Content-Length: n`          | read exactly `n` bytes    |
//! | close-delimited | neither header present       | read until EOF            |
//!
//! Framing and connection headers are consumed here and removed from the
//! returned [`Response`]; the body it carries is always the full decoded
//! payload, and serialization recomputes framing for whoever sends it next.

use std::{future::Future, pin::Pin, time::Duration};

use bytes::{Bytes, BytesMut};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::http::{Method, Request, Response, response::ResponseError};

/// Errors produced while exchanging a request with the origin.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to {authority}: {source}")]
    Connect {
        authority: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error while talking to origin: {0}")]
    Io(#[from] std::io::Error),

    #[error("origin did not respond within {0:?}")]
    Timeout(Duration),

    #[error("malformed origin response: {0}")]
    Malformed(#[from] ResponseError),

    #[error("origin violated HTTP framing: {0}")]
    Protocol(&'static str),
}

/// The boxed future returned by [`Transport::fetch`].
pub type FetchFuture = Pin<Box<dyn Future<Output = Result<Response, TransportError>> + Send>>;

/// The network seam.
///
/// Everything above this trait treats "the network" as a single async call
/// that either yields a complete [`Response`] or fails. Tests substitute
/// scripted implementations; production uses [`HttpTransport`].
pub trait Transport: Send + Sync {
    /// Sends `request` to the origin and reads back the full response.
    fn fetch(&self, request: Request) -> FetchFuture;
}

/// Initial read buffer capacity per exchange.
const INITIAL_BUF_SIZE: usize = 4096;

/// Maximum origin response we will buffer (64 MiB).
const MAX_RESPONSE_SIZE: usize = 64 * 1024 * 1024;

/// TCP transport that forwards every fetch to a fixed origin authority.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
/// use offcache::transport::HttpTransport;
///
/// let transport = HttpTransport::new("127.0.0.1:7860")
///     .with_timeout(Duration::from_secs(30));
/// ```
#[derive(Debug, Clone)]
pub struct HttpTransport {
    authority: String,
    timeout: Option<Duration>,
}

impl HttpTransport {
    /// Creates a transport targeting `authority` (`host:port`).
    ///
    /// No timeout is applied by default; an exchange runs as long as the
    /// origin keeps the connection alive. Use
    /// [`with_timeout`](Self::with_timeout) to bound it.
    pub fn new(authority: impl Into<String>) -> Self {
        Self {
            authority: authority.into(),
            timeout: None,
        }
    }

    /// Bounds every exchange to `timeout`, connection included.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, request: Request) -> FetchFuture {
        let authority = self.authority.clone();
        let timeout = self.timeout;
        Box::pin(async move {
            match timeout {
                Some(limit) => {
                    match tokio::time::timeout(limit, exchange(&authority, request)).await {
                        Ok(result) => result,
                        Err(_) => Err(TransportError::Timeout(limit)),
                    }
                }
                None => exchange(&authority, request).await,
            }
        })
    }
}

/// Runs one request/response exchange against `authority`.
async fn exchange(authority: &str, mut request: Request) -> Result<Response, TransportError> {
    let mut stream =
        TcpStream::connect(authority)
            .await
            .map_err(|source| TransportError::Connect {
                authority: authority.to_owned(),
                source,
            })?;

    // One exchange per connection: pin Host to the origin we dialed and force
    // close so an unframed body is delimited by EOF.
    request.headers_mut().set("Host", authority);
    request.headers_mut().set("Connection", "close");

    let is_head = request.method() == &Method::Head;

    stream.write_all(&request.into_bytes()).await?;
    stream.flush().await?;

    // Read until the response head parses.
    let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
    let (mut response, body_offset) = loop {
        let bytes_read = stream.read_buf(&mut buf).await?;
        match Response::parse(&buf) {
            Ok(pair) => break pair,
            Err(ResponseError::Incomplete) => {
                if bytes_read == 0 {
                    return Err(TransportError::Protocol(
                        "connection closed before response head",
                    ));
                }
                if buf.len() > MAX_RESPONSE_SIZE {
                    return Err(TransportError::Protocol("response head exceeds size limit"));
                }
            }
            Err(error) => return Err(error.into()),
        }
    };

    let status = response.status().as_u16();
    let body_forbidden = is_head || (100..200).contains(&status) || status == 204 || status == 304;

    let body = if body_forbidden {
        Bytes::new()
    } else {
        let remainder = buf.split_off(body_offset);
        read_body(&mut stream, &response, remainder).await?
    };

    // Framing belongs to the connection the response arrived on.
    for name in [
        "content-length",
        "transfer-encoding",
        "connection",
        "keep-alive",
        "trailer",
    ] {
        response.headers_mut().remove(name);
    }

    Ok(response.body_bytes(body))
}

/// Reads the response body according to its framing headers. `remainder` is
/// whatever arrived in the same reads as the head.
async fn read_body(
    stream: &mut TcpStream,
    response: &Response,
    mut remainder: BytesMut,
) -> Result<Bytes, TransportError> {
    let chunked = response
        .headers()
        .get("transfer-encoding")
        .is_some_and(|te| te.to_ascii_lowercase().contains("chunked"));

    if chunked {
        loop {
            if let Some((decoded, _consumed)) = decode_chunked(&remainder)? {
                return Ok(Bytes::from(decoded));
            }
            if remainder.len() > MAX_RESPONSE_SIZE {
                return Err(TransportError::Protocol("response exceeds size limit"));
            }
            let bytes_read = stream.read_buf(&mut remainder).await?;
            if bytes_read == 0 {
                return Err(TransportError::Protocol("connection closed mid-chunk"));
            }
        }
    }

    if let Some(value) = response.headers().get("content-length") {
        let length: usize = value
            .trim()
            .parse()
            .map_err(|_| TransportError::Protocol("invalid Content-Length header"))?;
        if length > MAX_RESPONSE_SIZE {
            return Err(TransportError::Protocol("response exceeds size limit"));
        }
        while remainder.len() < length {
            let bytes_read = stream.read_buf(&mut remainder).await?;
            if bytes_read == 0 {
                return Err(TransportError::Protocol("connection closed mid-body"));
            }
        }
        remainder.truncate(length);
        return Ok(remainder.freeze());
    }

    // Close-delimited: the body is everything until EOF.
    loop {
        if remainder.len() > MAX_RESPONSE_SIZE {
            return Err(TransportError::Protocol("response exceeds size limit"));
        }
        let bytes_read = stream.read_buf(&mut remainder).await?;
        if bytes_read == 0 {
            return Ok(remainder.freeze());
        }
    }
}

/// Decodes a chunked transfer coding body.
///
/// Returns `Ok(None)` when `input` does not yet contain the terminal chunk,
/// and `Ok(Some((decoded, consumed)))` once it does. Chunk extensions are
/// ignored; trailer fields are skipped.
fn decode_chunked(input: &[u8]) -> Result<Option<(Vec<u8>, usize)>, TransportError> {
    fn find_crlf(input: &[u8]) -> Option<usize> {
        input.windows(2).position(|window| window == b"\r\n")
    }

    let mut decoded = Vec::new();
    let mut pos = 0;

    loop {
        let line_end = match find_crlf(&input[pos..]) {
            Some(i) => pos + i,
            None => return Ok(None),
        };

        let size_line = std::str::from_utf8(&input[pos..line_end])
            .map_err(|_| TransportError::Protocol("invalid chunk size line"))?;
        let size_text = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_text, 16)
            .map_err(|_| TransportError::Protocol("invalid chunk size"))?;
        // Capping the size here keeps every later index sum in range.
        if size > MAX_RESPONSE_SIZE {
            return Err(TransportError::Protocol("chunk exceeds size limit"));
        }

        let data_start = line_end + 2;

        if size == 0 {
            // Terminal chunk: skip trailer fields up to the empty line.
            let mut cursor = data_start;
            loop {
                let trailer_end = match find_crlf(&input[cursor..]) {
                    Some(i) => cursor + i,
                    None => return Ok(None),
                };
                if trailer_end == cursor {
                    return Ok(Some((decoded, trailer_end + 2)));
                }
                cursor = trailer_end + 2;
            }
        }

        let data_end = data_start + size;
        if input.len() < data_end + 2 {
            return Ok(None);
        }
        decoded.extend_from_slice(&input[data_start..data_end]);
        if &input[data_end..data_end + 2] != b"\r\n" {
            return Err(TransportError::Protocol("chunk data missing terminator"));
        }
        pos = data_end + 2;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::net::TcpListener;

    /// Serves one connection: reads the request head, writes `raw`, closes.
    async fn upstream(raw: &'static [u8]) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_head(&mut stream).await;
            stream.write_all(raw).await.unwrap();
            stream.shutdown().await.unwrap();
        });
        addr
    }

    /// Serves one connection: echoes the received request head back as the
    /// body of a 200 response.
    async fn echo_upstream() -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let head = read_head(&mut stream).await;
            let reply = format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n\r\n",
                head.len()
            );
            stream.write_all(reply.as_bytes()).await.unwrap();
            stream.write_all(&head).await.unwrap();
            stream.shutdown().await.unwrap();
        });
        addr
    }

    async fn read_head(stream: &mut TcpStream) -> Vec<u8> {
        let mut seen = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            seen.extend_from_slice(&buf[..n]);
            if seen.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
        seen
    }

    // ── body framing ──────────────────────────────────────────────────────────

    #[tokio::test]
    async fn reads_content_length_body() {
        let addr = upstream(b"HTTP/1.1 200 OK\r\nContent-Type: text/css\r\nContent-Length: 5\r\n\r\na { }").await;
        let transport = HttpTransport::new(addr.to_string());

        let response = transport.fetch(Request::get("/app.css")).await.unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(response.body().as_ref(), b"a { }");
        assert_eq!(response.headers().get("content-type"), Some("text/css"));
    }

    #[tokio::test]
    async fn reads_chunked_body_and_strips_framing() {
        let addr = upstream(
            b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n5\r\nhello\r\n6\r\n world\r\n0\r\n\r\n",
        )
        .await;
        let transport = HttpTransport::new(addr.to_string());

        let response = transport.fetch(Request::get("/")).await.unwrap();
        assert_eq!(response.body().as_ref(), b"hello world");
        assert!(!response.headers().contains("transfer-encoding"));
        assert!(!response.headers().contains("content-length"));
        assert!(!response.headers().contains("connection"));
    }

    #[tokio::test]
    async fn reads_close_delimited_body() {
        let addr = upstream(b"HTTP/1.1 200 OK\r\n\r\nunframed body until close").await;
        let transport = HttpTransport::new(addr.to_string());

        let response = transport.fetch(Request::get("/")).await.unwrap();
        assert_eq!(response.body().as_ref(), b"unframed body until close");
    }

    #[tokio::test]
    async fn head_response_carries_no_body() {
        // A HEAD response advertises a length but sends no body; the
        // transport must not wait for bytes that will never arrive.
        let addr = upstream(b"HTTP/1.1 200 OK\r\nContent-Length: 1000\r\n\r\n").await;
        let transport = HttpTransport::new(addr.to_string());

        let response = transport
            .fetch(Request::new(Method::Head, "/big.bin"))
            .await
            .unwrap();
        assert!(response.body().is_empty());
    }

    #[tokio::test]
    async fn no_content_status_carries_no_body() {
        let addr = upstream(b"HTTP/1.1 204 No Content\r\n\r\n").await;
        let transport = HttpTransport::new(addr.to_string());

        let response = transport.fetch(Request::get("/ping")).await.unwrap();
        assert_eq!(response.status().as_u16(), 204);
        assert!(response.body().is_empty());
    }

    // ── request rewriting ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn forces_host_and_connection_close() {
        let addr = echo_upstream().await;
        let transport = HttpTransport::new(addr.to_string());

        let request = Request::get("/x")
            .header("Host", "client-supplied")
            .header("Connection", "keep-alive");
        let response = transport.fetch(request).await.unwrap();

        let sent = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(sent.contains(&format!("Host: {addr}")));
        assert!(sent.contains("Connection: close"));
        assert!(!sent.contains("client-supplied"));
        assert!(!sent.contains("keep-alive"));
    }

    // ── failures ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn refused_connection_reports_connect_error() {
        // Bind then drop to obtain a port nothing is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = HttpTransport::new(addr.to_string());
        let result = transport.fetch(Request::get("/")).await;
        assert!(matches!(result, Err(TransportError::Connect { .. })));
    }

    #[tokio::test]
    async fn silent_origin_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the connection open without responding.
            let _held = listener.accept().await;
            tokio::time::sleep(Duration::from_secs(60)).await;
        });

        let transport =
            HttpTransport::new(addr.to_string()).with_timeout(Duration::from_millis(50));
        let result = transport.fetch(Request::get("/")).await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));
    }

    #[tokio::test]
    async fn garbage_response_is_malformed() {
        let addr = upstream(b"ICANHAZ 200\r\n\r\n").await;
        let transport = HttpTransport::new(addr.to_string());

        let result = transport.fetch(Request::get("/")).await;
        assert!(matches!(result, Err(TransportError::Malformed(_))));
    }

    #[tokio::test]
    async fn truncated_sized_body_is_a_protocol_error() {
        let addr = upstream(b"HTTP/1.1 200 OK\r\nContent-Length: 50\r\n\r\nshort").await;
        let transport = HttpTransport::new(addr.to_string());

        let result = transport.fetch(Request::get("/")).await;
        assert!(matches!(result, Err(TransportError::Protocol(_))));
    }

    // ── chunked decoding ──────────────────────────────────────────────────────

    #[test]
    fn decode_single_chunk() {
        let input = b"b\r\nhello world\r\n0\r\n\r\n";
        let (decoded, consumed) = decode_chunked(input).unwrap().unwrap();
        assert_eq!(decoded, b"hello world");
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn decode_needs_more_input() {
        assert!(decode_chunked(b"").unwrap().is_none());
        assert!(decode_chunked(b"5\r\nhel").unwrap().is_none());
        assert!(decode_chunked(b"5\r\nhello\r\n").unwrap().is_none());
        assert!(decode_chunked(b"5\r\nhello\r\n0\r\n").unwrap().is_none());
    }

    #[test]
    fn decode_ignores_chunk_extensions() {
        let input = b"4;name=value\r\ndata\r\n0\r\n\r\n";
        let (decoded, _) = decode_chunked(input).unwrap().unwrap();
        assert_eq!(decoded, b"data");
    }

    #[test]
    fn decode_skips_trailers() {
        let input = b"2\r\nok\r\n0\r\nX-Checksum: abc\r\n\r\n";
        let (decoded, consumed) = decode_chunked(input).unwrap().unwrap();
        assert_eq!(decoded, b"ok");
        assert_eq!(consumed, input.len());
    }

    #[test]
    fn decode_rejects_bad_size() {
        assert!(decode_chunked(b"zz\r\ndata\r\n").is_err());
    }

    #[test]
    fn decode_rejects_oversize_chunk() {
        // A size line near usize::MAX must fail cleanly, not wrap the index
        // arithmetic.
        assert!(decode_chunked(b"ffffffffffffffff\r\nxx").is_err());
        assert!(decode_chunked(b"fffffffffffffff0\r\n").is_err());
    }

    #[test]
    fn decode_rejects_missing_chunk_terminator() {
        assert!(decode_chunked(b"4\r\ndataXX0\r\n\r\n").is_err());
    }
}
