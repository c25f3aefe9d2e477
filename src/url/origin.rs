use url::Url;

/// Extracts the origin key of a URL: lowercase host without a leading
/// `www.`, followed by `:port` when the port is not the scheme default
///
/// `www.example.com` and `example.com` are treated as one site.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use pdf_audit::url::origin_key;
///
/// let url = Url::parse("https://WWW.Example.com/path").unwrap();
/// assert_eq!(origin_key(&url), Some("example.com".to_string()));
///
/// let url = Url::parse("http://127.0.0.1:8080/").unwrap();
/// assert_eq!(origin_key(&url), Some("127.0.0.1:8080".to_string()));
/// ```
pub fn origin_key(url: &Url) -> Option<String> {
    let host = url.host_str()?.to_lowercase();
    let host = host.strip_prefix("www.").map(str::to_string).unwrap_or(host);

    match url.port() {
        Some(port) => Some(format!("{}:{}", host, port)),
        None => Some(host),
    }
}

/// Extracts the lowercase host of a URL (no port, `www.` kept)
pub fn extract_host(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}
