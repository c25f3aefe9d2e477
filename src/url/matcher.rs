/// Checks a lowercase host against one `allowed-hosts` entry
///
/// A plain entry must equal the host. An entry of the form `*.example.com`
/// also admits the bare `example.com` and hosts at any subdomain depth.
///
/// ```
/// use pdf_audit::url::matches_wildcard;
///
/// assert!(matches_wildcard("files.example.com", "files.example.com"));
/// assert!(matches_wildcard("*.example.com", "cdn.eu.example.com"));
/// assert!(!matches_wildcard("*.example.com", "example.org"));
/// ```
pub fn matches_wildcard(pattern: &str, candidate: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(base) => candidate
            .strip_suffix(base)
            .is_some_and(|prefix| prefix.is_empty() || prefix.ends_with('.')),
        None => candidate == pattern,
    }
}
