use super::*;
use crate::database::{LexicalMatches, LexicalQuery, MemoryProductStore, ProductRow, ScoredProduct, SemanticQuery};
use crate::ml::HashingEmbedder;
use async_trait::async_trait;
use axum::http::header::{
    ACCESS_CONTROL_ALLOW_ORIGIN, ACCESS_CONTROL_REQUEST_METHOD, AUTHORIZATION, IF_NONE_MATCH, ORIGIN,
};
use axum_test::TestServer;
use serde_json::Value;

const API_KEY: &str = "test-key";

/// Store that outlives any handler deadline
struct SlowStore;

#[async_trait]
impl ProductStore for SlowStore {
    async fn search_text(&self, _query: &LexicalQuery) -> SearchResult<LexicalMatches> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(LexicalMatches { rows: Vec::new(), total: 0 })
    }

    async fn search_similar(&self, _query: &SemanticQuery) -> SearchResult<Vec<ScoredProduct>> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(Vec::new())
    }

    async fn health_check(&self) -> SearchResult<()> {
        Err(SearchError::Database("connection refused".to_string()))
    }
}

fn test_config() -> Config {
    let mut config = Config::default();
    config.server.api_keys = vec![API_KEY.to_string()];
    config.server.allowed_origins = vec!["http://localhost:3000".to_string()];
    config
}

fn create_test_row(id: i64, domain: &str, title: &str) -> ProductRow {
    ProductRow {
        id,
        product_id: 9_000 + id,
        domain: domain.to_string(),
        title: title.to_string(),
        price: Some("49.00".to_string()),
        image_url: Some(format!("https://cdn.example/{}.jpg", id)),
    }
}

async fn create_test_server() -> TestServer {
    let embedder = HashingEmbedder::default();
    let store = Arc::new(MemoryProductStore::new());

    for id in 1..=25 {
        let domain = if id <= 3 { "shop.example" } else { "other.example" };
        let title = if id <= 20 { "Field Watch" } else { "Hiking Socks" };
        let embedding = embedder.encode(title).unwrap();
        store.insert(create_test_row(id, domain, title), Some(embedding)).await;
    }
    for id in 26..=30 {
        store.insert(create_test_row(id, "other.example", "Watch Strap"), None).await;
    }

    let server = SearchServer::new(test_config(), store, Arc::new(embedder)).unwrap();
    TestServer::new(server.router()).unwrap()
}

fn bearer() -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", API_KEY)).unwrap()
}

#[tokio::test]
async fn test_health_endpoint_needs_no_credentials() {
    let server = create_test_server().await;

    let response = server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body, serde_json::json!({ "ok": true }));
}

#[tokio::test]
async fn test_health_reports_unreachable_store() {
    let server = SearchServer::new(test_config(), Arc::new(SlowStore), Arc::new(HashingEmbedder::default())).unwrap();
    let server = TestServer::new(server.router()).unwrap();

    let response = server.get("/health").await;

    assert_eq!(response.status_code(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_search_requires_bearer_key() {
    let server = create_test_server().await;

    let missing = server.get("/search/lexical").add_query_param("q", "watch").await;
    assert_eq!(missing.status_code(), StatusCode::UNAUTHORIZED);
    let error: ErrorResponse = missing.json();
    assert_eq!(error.error, "Unauthorized");
    assert!(error.message.contains("Authorization"));

    let wrong = server
        .get("/search/semantic")
        .add_query_param("q", "watch")
        .add_header(AUTHORIZATION, HeaderValue::from_static("Bearer nope"))
        .await;
    assert_eq!(wrong.status_code(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_lexical_search_page_and_headers() {
    let server = create_test_server().await;

    let response = server
        .get("/search/lexical")
        .add_query_param("q", "watch")
        .add_header(AUTHORIZATION, bearer())
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    let body: Value = response.json();
    assert_eq!(body["items"].as_array().unwrap().len(), 20);
    assert_eq!(body["total"], 25);
    assert_eq!(body["hasMore"], true);
    assert_eq!(body["sort"], "rank");
    assert_eq!(body["items"][0]["productId"], 9_030);

    let headers = response.headers();
    let cache_control = "public, s-maxage=60, stale-while-revalidate=30";
    assert_eq!(headers.get("cache-control").unwrap(), cache_control);
    assert_eq!(headers.get("cdn-cache-control").unwrap(), cache_control);
    assert_eq!(headers.get("vary").unwrap(), "Origin, Accept-Encoding");
    assert_eq!(headers.get("cache-tag").unwrap(), "search:watch:*");
    assert!(headers.get("etag").is_some());
    assert!(headers.get("x-request-id").is_some());
}

#[tokio::test]
async fn test_lexical_next_page_and_empty_query() {
    let server = create_test_server().await;

    let first: Value = server
        .get("/search/lexical")
        .add_query_param("q", "watch")
        .add_query_param("limit", "20")
        .add_header(AUTHORIZATION, bearer())
        .await
        .json();
    let cursor = first["nextCursor"].as_str().unwrap().to_string();

    let second: Value = server
        .get("/search/lexical")
        .add_query_param("q", "watch")
        .add_query_param("cursor", &cursor)
        .add_header(AUTHORIZATION, bearer())
        .await
        .json();
    assert_eq!(second["items"].as_array().unwrap().len(), 5);
    assert_eq!(second["hasMore"], false);
    assert_eq!(second["nextCursor"], Value::Null);

    let empty: Value = server
        .get("/search/lexical")
        .add_query_param("q", "  ")
        .add_header(AUTHORIZATION, bearer())
        .await
        .json();
    assert_eq!(empty["items"].as_array().unwrap().len(), 0);
    assert_eq!(empty["sort"], "recent");
}

#[tokio::test]
async fn test_matching_etag_is_not_modified() {
    let server = create_test_server().await;

    let first = server
        .get("/search/lexical")
        .add_query_param("q", "socks")
        .add_header(AUTHORIZATION, bearer())
        .await;
    let etag = first.headers().get("etag").unwrap().clone();

    let second = server
        .get("/search/lexical")
        .add_query_param("q", "socks")
        .add_header(AUTHORIZATION, bearer())
        .add_header(IF_NONE_MATCH, etag)
        .await;

    assert_eq!(second.status_code(), StatusCode::NOT_MODIFIED);
}

#[tokio::test]
async fn test_semantic_search_scoped_to_domain() {
    let server = create_test_server().await;

    let response = server
        .get("/search/semantic")
        .add_query_param("q", "field watch")
        .add_query_param("domain", "shop.example")
        .add_header(AUTHORIZATION, bearer())
        .await;

    assert_eq!(response.status_code(), StatusCode::OK);
    assert_eq!(
        response.headers().get("cache-tag").unwrap(),
        "semantic-search:field watch:shop.example"
    );

    let body: Value = response.json();
    assert_eq!(body["sort"], "similarity");
    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 3);
    assert!(items.iter().all(|item| item["domain"] == "shop.example"));
    assert!(items.iter().all(|item| item["title"] == "Field Watch"));
}

#[tokio::test]
async fn test_malformed_cursor_is_bad_request() {
    let server = create_test_server().await;

    let response = server
        .get("/search/semantic")
        .add_query_param("q", "field watch")
        .add_query_param("cursor", "very-similar")
        .add_header(AUTHORIZATION, bearer())
        .await;

    assert_eq!(response.status_code(), StatusCode::BAD_REQUEST);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "Invalid request");
}

#[tokio::test]
async fn test_slow_search_times_out() {
    let mut config = test_config();
    config.server.request_timeout_ms = 50;
    let server = SearchServer::new(config, Arc::new(SlowStore), Arc::new(HashingEmbedder::default())).unwrap();
    let server = TestServer::new(server.router()).unwrap();

    let response = server
        .get("/search/lexical")
        .add_query_param("q", "watch")
        .add_header(AUTHORIZATION, bearer())
        .await;

    assert_eq!(response.status_code(), StatusCode::GATEWAY_TIMEOUT);
    let error: ErrorResponse = response.json();
    assert_eq!(error.error, "Function timeout");

    let metrics = server.get("/metrics").await.text();
    assert!(metrics.contains("search_timeouts_total{endpoint=\"lexical\"} 1"));
}

#[tokio::test]
async fn test_cors_preflight_allowlist() {
    let server = create_test_server().await;

    let allowed = server
        .method(Method::OPTIONS, "/search/lexical")
        .add_header(ORIGIN, HeaderValue::from_static("http://localhost:3000"))
        .add_header(ACCESS_CONTROL_REQUEST_METHOD, HeaderValue::from_static("GET"))
        .await;
    assert_eq!(
        allowed.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(),
        "http://localhost:3000"
    );
    assert_ne!(allowed.status_code(), StatusCode::UNAUTHORIZED);

    let denied = server
        .method(Method::OPTIONS, "/search/lexical")
        .add_header(ORIGIN, HeaderValue::from_static("https://evil.example"))
        .add_header(ACCESS_CONTROL_REQUEST_METHOD, HeaderValue::from_static("GET"))
        .await;
    assert!(denied.headers().get(ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
}

#[tokio::test]
async fn test_metrics_count_searches() {
    let server = create_test_server().await;

    server
        .get("/search/semantic")
        .add_query_param("q", "field watch")
        .add_header(AUTHORIZATION, bearer())
        .await;

    let response = server.get("/metrics").await;
    assert_eq!(response.status_code(), StatusCode::OK);
    assert!(response.text().contains("search_requests_total{endpoint=\"semantic\"} 1"));
}

#[test]
fn test_invalid_origin_is_config_error() {
    let result = cors_layer(&["http://bad\norigin".to_string()]);

    assert!(matches!(result, Err(SearchError::Config(_))));
}
