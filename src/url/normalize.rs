use crate::{UrlError, UrlResult};
use url::Url;

/// Normalizes a URL into the form used as the frontier's dedup key
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed
/// 2. Only `http` and `https` are accepted
/// 3. Host is lowercased and default ports dropped (done by the parser)
/// 4. Dot segments are resolved; an empty path becomes `/`
/// 5. The fragment is removed
/// 6. An empty query string (trailing `?`) is removed
///
/// Path case, trailing slashes and query parameters are preserved: two
/// URLs that differ only there may serve different documents.
///
/// # Examples
///
/// ```
/// use pdf_audit::url::normalize_url;
///
/// let url = normalize_url("https://EXAMPLE.com/Docs/report.pdf?v=2#page=3").unwrap();
/// assert_eq!(url.as_str(), "https://example.com/Docs/report.pdf?v=2");
/// ```
pub fn normalize_url(url_str: &str) -> UrlResult<Url> {
    let url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;
    normalize_parsed(url)
}

/// Normalizes an already parsed URL (see [`normalize_url`])
pub fn normalize_parsed(mut url: Url) -> UrlResult<Url> {
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(UrlError::InvalidScheme(format!(
            "Only HTTP and HTTPS schemes are supported, got: {}",
            url.scheme()
        )));
    }

    match url.host_str() {
        Some(host) if !host.is_empty() => {}
        _ => return Err(UrlError::MissingHost),
    }

    if url.cannot_be_a_base() {
        return Err(UrlError::Malformed(url.to_string()));
    }

    if url.path().is_empty() {
        url.set_path("/");
    }

    url.set_fragment(None);

    if url.query() == Some("") {
        url.set_query(None);
    }

    Ok(url)
}
