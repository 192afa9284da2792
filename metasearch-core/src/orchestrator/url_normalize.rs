//! URL normalisation for result deduplication.
//!
//! Canonicalises URLs so that equivalent pages (differing only in scheme,
//! query-parameter order, tracking parameters, fragments, default ports,
//! trailing slashes or capitalisation of the host) compare as equal.

use url::Url;

/// Tracking query parameters that are stripped during normalisation.
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "ref",
    "si",
    "feature",
];

/// Normalise a URL into its deduplication key.
///
/// Applies the following transformations:
///
/// 1. Lowercase scheme and host (path is preserved as-is).
/// 2. Remove default ports (`:80` for HTTP, `:443` for HTTPS).
/// 3. Treat `http` as `https`.
/// 4. Remove trailing slash from the path (unless path is exactly `"/"`).
/// 5. Strip known tracking parameters and sort the rest by key.
/// 6. Remove the fragment (`#…`).
///
/// Returns `None` if the input is not an absolute URL.
///
/// # Examples
///
/// ```
/// use metasearch_core::orchestrator::url_normalize::normalize_url;
///
/// let a = normalize_url("http://Example.COM/path/?b=2&a=1#section");
/// let b = normalize_url("https://example.com/path?a=1&b=2");
/// assert_eq!(a, b);
/// ```
pub fn normalize_url(raw: &str) -> Option<String> {
    let mut parsed = Url::parse(raw.trim()).ok()?;
    if parsed.cannot_be_a_base() {
        return None;
    }

    parsed.set_fragment(None);

    if is_default_port(&parsed) {
        let _ = parsed.set_port(None);
    }
    if parsed.scheme() == "http" {
        // Only fails for special/non-special scheme switches.
        let _ = parsed.set_scheme("https");
    }

    let mut params: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| !TRACKING_PARAMS.contains(&key.to_lowercase().as_str()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    params.sort();
    if params.is_empty() {
        parsed.set_query(None);
    } else {
        parsed.query_pairs_mut().clear().extend_pairs(params);
    }

    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        parsed.set_path(path.trim_end_matches('/'));
    }

    Some(parsed.to_string())
}

/// Whether `raw` uses plain `http`.
pub fn is_insecure(raw: &str) -> bool {
    raw.trim_start()
        .get(..7)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("http://"))
}

/// Returns `true` if the URL uses the default port for its scheme.
fn is_default_port(url: &Url) -> bool {
    matches!(
        (url.scheme(), url.port()),
        ("http", Some(80)) | ("https", Some(443))
    )
}
