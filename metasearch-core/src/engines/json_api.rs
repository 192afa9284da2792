//! Adapter for upstreams exposing a SearXNG-compatible JSON API.
//!
//! Sends `GET <base_url>?q=…&format=json&pageno=…&language=…&safesearch=…
//! &categories=…` and maps `results[]` and `infoboxes[]` into result items.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

use crate::engine::EngineAdapter;
use crate::error::{ConfigError, EngineFailure, FailureKind};
use crate::types::{Query, ResultItem};

/// JSON API engine adapter.
///
/// One instance per configured engine; the underlying [`reqwest::Client`]
/// is shared between instances so connections are pooled.
#[derive(Debug, Clone)]
pub struct JsonApiEngine {
    base_url: Url,
    client: reqwest::Client,
}

impl JsonApiEngine {
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] unless `base_url` is an absolute
    /// `http` or `https` URL.
    pub fn new(base_url: &str, client: reqwest::Client) -> Result<Self, ConfigError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| ConfigError::Invalid(format!("invalid base_url {base_url:?}: {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid(format!(
                "base_url must be http or https, got {}",
                base_url.scheme()
            )));
        }
        Ok(Self { base_url, client })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Full request URL for `query`.
    pub fn request_url(&self, query: &Query) -> Url {
        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("q", &query.text)
            .append_pair("format", "json")
            .append_pair("pageno", &query.page.to_string())
            .append_pair("language", &query.language)
            .append_pair("safesearch", &query.safe_search.level().to_string())
            .append_pair("categories", &query.categories.join(","));
        url
    }
}

#[async_trait]
impl EngineAdapter for JsonApiEngine {
    async fn fetch(&self, query: &Query, timeout: Duration) -> Result<Vec<ResultItem>, EngineFailure> {
        let url = self.request_url(query);
        tracing::trace!(url = %url, "json api request");

        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .timeout(timeout)
            .send()
            .await
            .map_err(transport_failure)?;
        let status = response.status();
        let body = response.text().await.map_err(transport_failure)?;
        tracing::trace!(status = status.as_u16(), bytes = body.len(), "json api response received");

        if let Some(failure) = status_failure(status, &body) {
            return Err(failure);
        }
        parse_json_api(&body)
    }
}

fn transport_failure(err: reqwest::Error) -> EngineFailure {
    if err.is_timeout() {
        EngineFailure::timeout(format!("request timed out: {err}"))
    } else {
        EngineFailure::network(format!("request failed: {err}"))
    }
}

/// Classify a non-success response.
pub(crate) fn status_failure(status: StatusCode, body: &str) -> Option<EngineFailure> {
    if status.is_success() {
        return None;
    }
    let failure = match status {
        StatusCode::FORBIDDEN => EngineFailure::new(FailureKind::AccessDenied, "HTTP 403"),
        StatusCode::TOO_MANY_REQUESTS => {
            EngineFailure::new(FailureKind::TooManyRequests, "HTTP 429")
        }
        _ if mentions_captcha(body) => {
            EngineFailure::new(FailureKind::Captcha, format!("captcha page (HTTP {})", status.as_u16()))
        }
        _ => EngineFailure::network(format!("HTTP {}", status.as_u16())),
    };
    Some(failure)
}

fn mentions_captcha(body: &str) -> bool {
    body.to_ascii_lowercase().contains("captcha")
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    results: Vec<ApiResult>,
    #[serde(default)]
    infoboxes: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ApiResult {
    url: Option<String>,
    title: Option<String>,
    content: Option<String>,
    score: Option<f64>,
}

/// Parse a JSON API body into result items.
///
/// Extracted as a separate function for testability with canned bodies.
pub(crate) fn parse_json_api(body: &str) -> Result<Vec<ResultItem>, EngineFailure> {
    let parsed: ApiResponse = serde_json::from_str(body).map_err(|e| {
        if mentions_captcha(body) {
            EngineFailure::new(FailureKind::Captcha, "captcha page instead of results")
        } else {
            EngineFailure::parse(format!("invalid JSON response: {e}"))
        }
    })?;

    let mut items: Vec<ResultItem> = parsed
        .results
        .into_iter()
        .map(|r| ResultItem {
            engine: String::new(),
            url: r.url,
            title: r.title.unwrap_or_default(),
            content: r.content.unwrap_or_default(),
            score: r.score,
            payload: None,
        })
        .collect();

    items.extend(parsed.infoboxes.into_iter().filter_map(infobox_item));
    Ok(items)
}

fn infobox_item(infobox: serde_json::Value) -> Option<ResultItem> {
    let title = infobox.get("infobox")?.as_str()?.to_string();
    let url = infobox
        .get("id")
        .and_then(|id| id.as_str())
        .filter(|id| id.starts_with("http://") || id.starts_with("https://"))
        .map(str::to_string);
    let content = infobox
        .get("content")
        .and_then(|c| c.as_str())
        .unwrap_or_default()
        .to_string();
    Some(ResultItem {
        engine: String::new(),
        url,
        title,
        content,
        score: None,
        payload: Some(infobox),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SafeSearch;

    fn engine() -> JsonApiEngine {
        JsonApiEngine::new("https://search.example.org/search", reqwest::Client::new())
            .expect("engine")
    }

    #[test]
    fn rejects_non_http_base_url() {
        assert!(JsonApiEngine::new("ftp://example.org", reqwest::Client::new()).is_err());
        assert!(JsonApiEngine::new("not a url", reqwest::Client::new()).is_err());
    }

    #[test]
    fn request_url_carries_query_parameters() {
        let query = Query::new("rust lang")
            .with_categories(["news", "general"])
            .with_language("de")
            .with_page(2)
            .with_safe_search(SafeSearch::Strict);
        let url = engine().request_url(&query);
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        assert!(pairs.contains(&("q".into(), "rust lang".into())));
        assert!(pairs.contains(&("format".into(), "json".into())));
        assert!(pairs.contains(&("pageno".into(), "2".into())));
        assert!(pairs.contains(&("language".into(), "de".into())));
        assert!(pairs.contains(&("safesearch".into(), "2".into())));
        assert!(pairs.contains(&("categories".into(), "general,news".into())));
    }

    #[test]
    fn parses_results_and_infoboxes() {
        let body = r#"{
            "query": "rust",
            "results": [
                {"url": "https://www.rust-lang.org/", "title": "Rust", "content": "A language", "score": 2.5},
                {"url": "https://doc.rust-lang.org/book/", "title": "The Book", "content": null}
            ],
            "infoboxes": [
                {"infobox": "Rust", "id": "https://en.wikipedia.org/wiki/Rust_(programming_language)", "content": "Rust is..."},
                {"infobox": "No link", "id": "Q575650"},
                {"noinfobox": true}
            ]
        }"#;
        let items = parse_json_api(body).expect("parse");
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].score, Some(2.5));
        assert_eq!(items[1].content, "");
        assert_eq!(items[1].score, None);
        assert!(items[2].payload.is_some());
        assert_eq!(items[2].content, "Rust is...");
        assert!(items[2].url.as_deref().is_some_and(|u| u.contains("wikipedia")));
        assert_eq!(items[3].url, None);
    }

    #[test]
    fn missing_arrays_yield_no_items() {
        assert!(parse_json_api("{}").expect("parse").is_empty());
    }

    #[test]
    fn undecodable_body_is_parse_error() {
        let err = parse_json_api("<html>oops</html>").unwrap_err();
        assert_eq!(err.kind, FailureKind::ParseError);
    }

    #[test]
    fn captcha_page_is_captcha() {
        let err = parse_json_api("<html>Please solve the CAPTCHA</html>").unwrap_err();
        assert_eq!(err.kind, FailureKind::Captcha);
    }

    #[test]
    fn status_mapping() {
        let kind = |status: u16, body: &str| {
            status_failure(StatusCode::from_u16(status).expect("status"), body).map(|f| f.kind)
        };
        assert_eq!(kind(200, ""), None);
        assert_eq!(kind(403, ""), Some(FailureKind::AccessDenied));
        assert_eq!(kind(429, "captcha"), Some(FailureKind::TooManyRequests));
        assert_eq!(kind(503, "<p>captcha required</p>"), Some(FailureKind::Captcha));
        assert_eq!(kind(500, "boom"), Some(FailureKind::NetworkError));
    }
}
