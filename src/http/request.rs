//! HTTP/1.1 requests — outbound construction and inbound parsing.
//!
//! A [`Request`] flows through the cache in two directions. The adapter layer
//! parses inbound requests off the wire with [`Request::parse`] (via the
//! [`httparse`] crate), and the lifecycle manager builds outbound pre-load
//! requests with the [`Request::get`] builder. Both forms serialize back to
//! wire format with [`Request::into_bytes`] when handed to the transport.

use bytes::{BufMut, Bytes, BytesMut};
use thiserror::Error;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete — more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },
}

/// An HTTP/1.1 request.
///
/// Created either by [`Request::parse`] from a raw byte buffer (the adapter
/// path) or by the builder methods (the pre-load path). The body is stored
/// as a [`Bytes`] buffer.
///
/// # Examples
///
/// ```
/// use offcache::http::Request;
///
/// let raw = b"GET /assets/app.css?v=3 HTTP/1.1\r\nHost: localhost\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert_eq!(request.path(), "/assets/app.css");
/// assert_eq!(request.query_string(), Some("v=3"));
/// assert_eq!(request.headers().get("host"), Some("localhost"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Creates a request for the given method and target.
    ///
    /// The target is split into path and query at the first `?`.
    pub fn new(method: Method, target: impl AsRef<str>) -> Self {
        let raw = target.as_ref();
        let (path, query) = match raw.find('?') {
            Some(pos) => (raw[..pos].to_owned(), Some(raw[pos + 1..].to_owned())),
            None => (raw.to_owned(), None),
        };
        Self {
            method,
            path,
            query,
            version: 1,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a `GET` request for the given target — the shape every
    /// pre-load fetch takes.
    pub fn get(target: impl AsRef<str>) -> Self {
        Self::new(Method::Get, target)
    }

    /// Appends a request header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Sets the request body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Parse a raw HTTP/1.1 request from a byte slice.
    ///
    /// Returns the parsed `Request` and the byte offset at which the body
    /// begins in `buf` (immediately after the `\r\n\r\n` header terminator).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`] — more data is needed to complete the request headers.
    /// - [`RequestError::Parse`] — the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`] — a required field (method, path, version) is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method: Method = raw_req
            .method
            .ok_or(RequestError::MissingField { field: "method" })?
            .parse()
            .unwrap(); // Infallible

        let raw_path = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?;

        let (path, query) = match raw_path.find('?') {
            Some(pos) => (
                raw_path[..pos].to_owned(),
                Some(raw_path[pos + 1..].to_owned()),
            ),
            None => (raw_path.to_owned(), None),
        };

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        let body = Bytes::copy_from_slice(&buf[body_offset..]);

        Ok((
            Self {
                method,
                path,
                query,
                version,
                headers: header_map,
                body,
            },
            body_offset,
        ))
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request path (without the query string).
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Returns the raw query string (without the leading `?`), if any.
    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// Returns the full request target: path plus `?query` when present.
    ///
    /// This is the URL half of the request identity the store keys on, so
    /// two requests for the same resource must produce equal targets.
    pub fn target(&self) -> String {
        match &self.query {
            Some(q) => format!("{}?{}", self.path, q),
            None => self.path.clone(),
        }
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns a mutable reference to the request headers.
    ///
    /// The transport uses this to pin `Host` and `Connection` before
    /// serializing.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if this is a top-level navigation — a full-page
    /// document load rather than a sub-resource fetch.
    ///
    /// Honors `Sec-Fetch-Mode` when the caller sent it; otherwise falls back
    /// to the classic heuristic of a `GET` whose `Accept` lists `text/html`.
    pub fn is_navigation(&self) -> bool {
        if let Some(mode) = self.headers.get("sec-fetch-mode") {
            return mode.eq_ignore_ascii_case("navigate");
        }
        self.method == Method::Get
            && self
                .headers
                .get("accept")
                .is_some_and(|accept| accept.contains("text/html"))
    }

    /// Returns `true` if this request asks to switch protocols — an
    /// `Upgrade` header, or an `upgrade` token in `Connection`.
    ///
    /// Upgrade handshakes open long-lived duplex streams; caching one would
    /// break the connection it was supposed to establish.
    pub fn is_upgrade(&self) -> bool {
        if self.headers.contains("upgrade") {
            return true;
        }
        self.headers
            .get_all("connection")
            .any(|value| value.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade")))
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1, // HTTP/1.1 default: keep-alive
        }
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.parse().ok()
    }

    /// Serializes the request into a `BytesMut` buffer using HTTP/1.1 wire format.
    ///
    /// Headers are emitted verbatim; a `Content-Length` is appended only when
    /// the body is non-empty and no such header is already present, so a
    /// parsed request re-serializes without duplicating its framing.
    pub fn into_bytes(self) -> BytesMut {
        let target = self.target();
        let estimated_size = 64 + self.headers.len() * 48 + self.body.len();
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(format!("{} {} HTTP/1.1\r\n", self.method, target).as_bytes());

        for (name, value) in self.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        if !self.body.is_empty() && !self.headers.contains("content-length") {
            buf.put(format!("Content-Length: {}\r\n", self.body.len()).as_bytes());
        }

        buf.put(&b"\r\n"[..]);

        if !self.body.is_empty() {
            buf.put(self.body.as_ref());
        }

        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── parsing ───────────────────────────────────────────────────────────────

    #[test]
    fn parse_simple_get() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, offset) = Request::parse(raw).unwrap();
        assert_eq!(req.method().as_str(), "GET");
        assert_eq!(req.path(), "/");
        assert_eq!(req.version(), 1);
        assert_eq!(req.headers().get("host"), Some("localhost"));
        assert_eq!(offset, raw.len()); // no body
    }

    #[test]
    fn parse_query_is_preserved_raw() {
        let raw = b"GET /search?q=offline&page=2 HTTP/1.1\r\nHost: x\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert_eq!(req.path(), "/search");
        assert_eq!(req.query_string(), Some("q=offline&page=2"));
        assert_eq!(req.target(), "/search?q=offline&page=2");
    }

    #[test]
    fn parse_incomplete() {
        let raw = b"GET / HTTP/1.1\r\nHost:";
        assert!(matches!(Request::parse(raw), Err(RequestError::Incomplete)));
    }

    #[test]
    fn parse_body_offset() {
        let raw = b"POST /submit HTTP/1.1\r\nHost: x\r\nContent-Length: 5\r\n\r\nhello";
        let (req, body_offset) = Request::parse(raw).unwrap();
        assert_eq!(req.content_length(), Some(5));
        assert_eq!(&raw[body_offset..], b"hello");
    }

    #[test]
    fn keep_alive_http11_default() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert!(req.is_keep_alive());
    }

    #[test]
    fn connection_close_honored() {
        let raw = b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert!(!req.is_keep_alive());
    }

    // ── builder ───────────────────────────────────────────────────────────────

    #[test]
    fn builder_splits_target() {
        let req = Request::get("/manifest.json?v=2");
        assert_eq!(req.method(), &Method::Get);
        assert_eq!(req.path(), "/manifest.json");
        assert_eq!(req.query_string(), Some("v=2"));
    }

    #[test]
    fn builder_headers_and_body() {
        let req = Request::new(Method::Post, "/ingest")
            .header("Content-Type", "application/json")
            .body_bytes(&b"{}"[..]);
        assert_eq!(req.headers().get("content-type"), Some("application/json"));
        assert_eq!(req.body().as_ref(), b"{}");
    }

    // ── navigation & upgrade classification inputs ────────────────────────────

    #[test]
    fn navigation_via_sec_fetch_mode() {
        let req = Request::get("/").header("Sec-Fetch-Mode", "navigate");
        assert!(req.is_navigation());
    }

    #[test]
    fn sec_fetch_mode_overrides_accept() {
        let req = Request::get("/")
            .header("Sec-Fetch-Mode", "no-cors")
            .header("Accept", "text/html");
        assert!(!req.is_navigation());
    }

    #[test]
    fn navigation_via_accept_fallback() {
        let req = Request::get("/docs").header(
            "Accept",
            "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8",
        );
        assert!(req.is_navigation());
    }

    #[test]
    fn post_is_never_navigation_by_accept() {
        let req = Request::new(Method::Post, "/form").header("Accept", "text/html");
        assert!(!req.is_navigation());
    }

    #[test]
    fn subresource_accept_is_not_navigation() {
        let req = Request::get("/logo.png").header("Accept", "image/avif,image/webp");
        assert!(!req.is_navigation());
    }

    #[test]
    fn upgrade_header_detected() {
        let req = Request::get("/stream").header("Upgrade", "websocket");
        assert!(req.is_upgrade());
    }

    #[test]
    fn connection_upgrade_token_detected() {
        let raw = b"GET /live HTTP/1.1\r\nHost: x\r\nConnection: keep-alive, Upgrade\r\n\r\n";
        let (req, _) = Request::parse(raw).unwrap();
        assert!(req.is_upgrade());
    }

    #[test]
    fn ordinary_get_is_not_upgrade() {
        let req = Request::get("/").header("Connection", "keep-alive");
        assert!(!req.is_upgrade());
    }

    // ── serialization ─────────────────────────────────────────────────────────

    #[test]
    fn into_bytes_round_trips() {
        let original = Request::new(Method::Post, "/data?kind=a")
            .header("Host", "upstream")
            .body_bytes(&b"payload"[..]);
        let wire = original.into_bytes();

        let (parsed, offset) = Request::parse(&wire).unwrap();
        assert_eq!(parsed.method().as_str(), "POST");
        assert_eq!(parsed.target(), "/data?kind=a");
        assert_eq!(parsed.headers().get("host"), Some("upstream"));
        assert_eq!(parsed.content_length(), Some(7));
        assert_eq!(&wire[offset..], b"payload");
    }

    #[test]
    fn into_bytes_does_not_duplicate_content_length() {
        let raw = b"POST /x HTTP/1.1\r\nHost: h\r\nContent-Length: 2\r\n\r\nok";
        let (req, _) = Request::parse(raw).unwrap();
        let wire = req.into_bytes();
        let text = String::from_utf8(wire.to_vec()).unwrap();
        assert_eq!(text.matches("Content-Length").count(), 1);
    }

    #[test]
    fn into_bytes_no_body_no_content_length() {
        let wire = Request::get("/").header("Host", "h").into_bytes();
        let text = String::from_utf8(wire.to_vec()).unwrap();
        assert!(text.starts_with("GET / HTTP/1.1\r\n"));
        assert!(!text.contains("Content-Length"));
        assert!(text.ends_with("\r\n\r\n"));
    }
}
