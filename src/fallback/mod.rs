//! Offline fallbacks — what interception serves when both the network and the
//! cache come up empty.
//!
//! Two renderers, chosen by whether the failing request was a top-level
//! navigation:
//!
//! - [`offline_page`] — a complete HTML document for navigations, so the user
//!   sees an explanation instead of a browser error page.
//! - [`unavailable`] — a bare `503` for sub-resources, where an HTML body
//!   would only confuse the asset's consumer.
//!
//! Both are pure: no I/O, no state, and byte-identical output on every call.
//! The HTML references nothing external, because by definition nothing
//! external is reachable when it renders.

use crate::http::{Response, StatusCode};

const OFFLINE_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>Offline</title>
<style>
  body { margin: 0; min-height: 100vh; display: flex; align-items: center;
         justify-content: center; font-family: system-ui, sans-serif;
         background: #1a1a2e; color: #e8e8f0; }
  main { max-width: 26rem; text-align: center; padding: 2rem; }
  h1 { color: #6c63ff; margin-bottom: 0.5rem; }
  p { line-height: 1.5; color: #b8b8c8; }
  button { margin-top: 1rem; padding: 0.6rem 1.6rem; font-size: 1rem;
           color: #fff; background: #6c63ff; border: 0; border-radius: 6px;
           cursor: pointer; }
  button:hover { background: #5a51e8; }
</style>
</head>
<body>
<main>
  <h1>You&rsquo;re offline</h1>
  <p>This page hasn&rsquo;t been saved for offline use yet.
     Check your connection and try again.</p>
  <button onclick="location.reload()">Retry</button>
</main>
</body>
</html>
"#;

/// Renders the navigation fallback: a self-contained offline page.
///
/// Served with `503 Service Unavailable` and `Cache-Control: no-store` so the
/// placeholder is never mistaken for, or stored as, the real document.
pub fn offline_page() -> Response {
    Response::new(StatusCode::SERVICE_UNAVAILABLE)
        .header("Content-Type", "text/html; charset=utf-8")
        .header("Cache-Control", "no-store")
        .body_text(OFFLINE_PAGE)
}

/// Renders the sub-resource fallback: a plain-text `503`.
pub fn unavailable() -> Response {
    Response::new(StatusCode::SERVICE_UNAVAILABLE)
        .header("Content-Type", "text/plain; charset=utf-8")
        .header("Cache-Control", "no-store")
        .body_text("offline: resource unavailable\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offline_page_is_a_503_html_document() {
        let response = offline_page();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get("content-type"),
            Some("text/html; charset=utf-8")
        );
        let body = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(body.starts_with("<!doctype html>"));
        assert!(body.contains("offline"));
    }

    #[test]
    fn offline_page_references_nothing_external() {
        let body = String::from_utf8(offline_page().body().to_vec()).unwrap();
        for needle in ["http://", "https://", "src=", "href=", "url(", "@import"] {
            assert!(!body.contains(needle), "found {needle:?} in offline page");
        }
    }

    #[test]
    fn offline_page_is_deterministic() {
        assert_eq!(offline_page().into_bytes(), offline_page().into_bytes());
    }

    #[test]
    fn subresource_fallback_is_plain_503() {
        let response = unavailable();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(
            response.headers().get("content-type"),
            Some("text/plain; charset=utf-8")
        );
    }

    #[test]
    fn fallbacks_forbid_downstream_storage() {
        assert_eq!(offline_page().headers().get("cache-control"), Some("no-store"));
        assert_eq!(unavailable().headers().get("cache-control"), Some("no-store"));
    }
}
