//! Request classification — which requests the cache engine may touch.
//!
//! Every inbound request is classified exactly once, before any cache or
//! network work happens:
//!
//! | Decision    | Trigger                                        | Effect                              |
//! |-------------|------------------------------------------------|-------------------------------------|
//! | `Bypass`    | path starts with a configured bypass prefix    | forwarded untouched, never cached   |
//! | `Bypass`    | request carries a protocol upgrade handshake   | forwarded untouched, never cached   |
//! | `Intercept` | everything else                                | handled by the caching strategy     |
//!
//! Classification is a pure function of the request line and headers. It
//! performs no I/O and never consults cache contents, so the same request
//! always classifies the same way regardless of what is stored.

use crate::http::Request;

/// The interception decision for one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterceptPolicy {
    /// The request enters the caching strategy engine.
    Intercept,
    /// The request is forwarded to the origin untouched. Its response is never
    /// cached, and a network failure is reported as-is rather than answered
    /// from the cache.
    Bypass,
}

/// Classifies requests against a configured set of bypass path prefixes.
///
/// Prefixes match the path component only — the query string never
/// participates — and matching is plain case-sensitive `starts_with`, so
/// `/api/` excludes the whole API subtree while `/login` excludes `/login`
/// itself along with `/login/callback`.
///
/// # Examples
///
/// ```
/// use offcache::http::Request;
/// use offcache::policy::{Classifier, InterceptPolicy};
///
/// let classifier = Classifier::new(vec!["/api/".into(), "/login".into()]);
///
/// let page = Request::get("/index.html");
/// assert_eq!(classifier.classify(&page), InterceptPolicy::Intercept);
///
/// let api = Request::get("/api/v1/chat");
/// assert_eq!(classifier.classify(&api), InterceptPolicy::Bypass);
/// ```
#[derive(Debug, Clone)]
pub struct Classifier {
    bypass_prefixes: Vec<String>,
}

impl Classifier {
    /// Creates a classifier with the given bypass prefixes.
    pub fn new(bypass_prefixes: Vec<String>) -> Self {
        Self { bypass_prefixes }
    }

    /// Decides whether `request` is intercepted or bypassed.
    pub fn classify(&self, request: &Request) -> InterceptPolicy {
        // Upgrade handshakes establish long-lived duplex streams; the cache
        // must never sit between the peers.
        if request.is_upgrade() {
            return InterceptPolicy::Bypass;
        }

        let path = request.path();
        if self
            .bypass_prefixes
            .iter()
            .any(|prefix| path.starts_with(prefix.as_str()))
        {
            return InterceptPolicy::Bypass;
        }

        InterceptPolicy::Intercept
    }
}
