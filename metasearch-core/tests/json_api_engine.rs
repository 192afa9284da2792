//! JSON API adapter against a mock upstream.

use std::sync::Arc;
use std::time::Duration;

use metasearch_core::http::{build_client, HttpOptions};
use metasearch_core::{
    Engine, EngineAdapter, EngineRegistry, EngineStatus, FailureKind, JsonApiEngine, Metasearch,
    Query, SearchConfig,
};
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn adapter(server: &MockServer) -> JsonApiEngine {
    let client = build_client(&HttpOptions {
        user_agent: Some("metasearch-test/1.0".into()),
        ..Default::default()
    })
    .expect("client");
    JsonApiEngine::new(&format!("{}/search", server.uri()), client).expect("adapter")
}

#[tokio::test]
async fn maps_results_from_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("q", "rust"))
        .and(query_param("format", "json"))
        .and(query_param("pageno", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "query": "rust",
            "results": [
                {"url": "https://www.rust-lang.org/", "title": "Rust", "content": "Fast and safe"},
                {"url": "https://crates.io/", "title": "crates.io", "content": "", "score": 0.5}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let items = adapter(&server)
        .fetch(&Query::new("rust"), Duration::from_secs(2))
        .await
        .expect("fetch");
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].title, "Rust");
    assert_eq!(items[1].score, Some(0.5));
}

#[tokio::test]
async fn maps_status_codes_to_failure_kinds() {
    let cases = [
        (403, "forbidden", FailureKind::AccessDenied),
        (429, "slow down", FailureKind::TooManyRequests),
        (503, "<form id=\"captcha\">", FailureKind::Captcha),
        (502, "bad gateway", FailureKind::NetworkError),
    ];
    for (status, body, expected) in cases {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&server)
            .await;
        let err = adapter(&server)
            .fetch(&Query::new("rust"), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err.kind, expected, "status {status}");
    }
}

#[tokio::test]
async fn invalid_json_is_parse_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;
    let err = adapter(&server)
        .fetch(&Query::new("rust"), Duration::from_secs(2))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::ParseError);
}

#[tokio::test]
async fn slow_upstream_times_out() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"results": []}))
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;
    let err = adapter(&server)
        .fetch(&Query::new("rust"), Duration::from_millis(50))
        .await
        .unwrap_err();
    assert_eq!(err.kind, FailureKind::Timeout);
}

#[tokio::test]
async fn two_upstreams_merge_through_the_pipeline() {
    let first = MockServer::start().await;
    let second = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"url": "https://example.org/a", "title": "A", "content": "short"}]
        })))
        .mount(&first)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"url": "http://example.org/a/", "title": "A", "content": "a longer snippet"}]
        })))
        .mount(&second)
        .await;

    let registry = EngineRegistry::builder()
        .category("general")
        .register(
            Engine::new("first", "f").with_categories(["general"]),
            Arc::new(adapter(&first)),
        )
        .register(
            Engine::new("second", "s").with_categories(["general"]),
            Arc::new(adapter(&second)),
        )
        .build()
        .expect("registry");
    let ms = Metasearch::new(registry, SearchConfig::default()).expect("pipeline");

    let response = ms.search(&Query::new("a")).await;
    assert_eq!(response.results.len(), 1);
    let merged = &response.results[0];
    assert_eq!(merged.engines, vec!["first", "second"]);
    assert_eq!(merged.url.as_deref(), Some("https://example.org/a"));
    assert_eq!(merged.content, "a longer snippet");
    assert!(response.engines.iter().all(|r| r.status == EngineStatus::Ok));
}
