//! URL canonicalization and cache-key derivation.
//!
//! Two requests share a recorded stream exactly when their cache keys are
//! equal. Under the default policy that is full canonical-URL equality.

use swcache_core::KeyPolicy;

/// Error type for URL canonicalization failures.
#[derive(Debug, Clone, thiserror::Error)]
pub enum UrlError {
    #[error("empty URL")]
    Empty,

    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// Canonicalize a URL string.
///
/// Normalization steps:
/// 1. Trim leading/trailing whitespace
/// 2. Default scheme to https:// if missing
/// 3. Lowercase the host (the parser already does this for http/https)
/// 4. Remove fragment (#...), which never reaches the origin
/// 5. Keep query string intact (do not reorder)
pub fn canonicalize(input: &str) -> Result<url::Url, UrlError> {
    let trimmed = input.trim();

    if trimmed.is_empty() {
        return Err(UrlError::Empty);
    }

    let url_str = if trimmed.contains("://") { trimmed.to_string() } else { format!("https://{trimmed}") };

    let mut parsed = url::Url::parse(&url_str).map_err(|e| UrlError::InvalidUrl(e.to_string()))?;

    match parsed.scheme() {
        "http" | "https" => {}
        scheme => return Err(UrlError::UnsupportedScheme(scheme.to_string())),
    }

    if parsed.host_str().is_none() {
        return Err(UrlError::InvalidUrl(format!("missing host in {trimmed}")));
    }

    parsed.set_fragment(None);

    Ok(parsed)
}

/// Reduce an already-canonical URL to its cache key under `policy`.
pub fn cache_key(url: &url::Url, policy: KeyPolicy) -> String {
    match policy {
        KeyPolicy::FullUrl => url.as_str().to_string(),
        KeyPolicy::IgnoreQuery => {
            let mut stripped = url.clone();
            stripped.set_query(None);
            stripped.set_fragment(None);
            stripped.to_string()
        }
    }
}
