use axum::{
    extract::{Query, Request, State},
    http::{
        header::{self, HeaderName},
        HeaderMap, HeaderValue, Method, StatusCode,
    },
    middleware::{self, Next},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::database::ProductStore;
use crate::error::{SearchError, SearchResult};
use crate::ml::EmbeddingProvider;
use crate::observability::MetricsRegistry;
use crate::search::{LexicalSearchService, SearchParams, SemanticSearchService};
use crate::types::SearchResultPage;

#[cfg(test)]
mod tests;

const LEXICAL_TAG_PREFIX: &str = "search:";
const SEMANTIC_TAG_PREFIX: &str = "semantic-search:";
const VARY_HEADER: &str = "Origin, Accept-Encoding";

const CDN_CACHE_CONTROL: HeaderName = HeaderName::from_static("cdn-cache-control");
const CLOUDFLARE_CDN_CACHE_CONTROL: HeaderName = HeaderName::from_static("cloudflare-cdn-cache-control");
const CACHE_TAG: HeaderName = HeaderName::from_static("cache-tag");
const REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// HTTP front of the lexical and semantic search services
pub struct SearchServer {
    app: Router,
    config: Config,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    lexical: Arc<LexicalSearchService>,
    semantic: Arc<SemanticSearchService>,
    store: Arc<dyn ProductStore>,
    metrics: MetricsRegistry,
}

/// Error body returned by every failing endpoint
#[derive(Debug, serde::Serialize, serde::Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
struct HealthResponse {
    ok: bool,
}

impl SearchServer {
    /// Wire both search services over `store` and build the router
    pub fn new(
        config: Config,
        store: Arc<dyn ProductStore>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> SearchResult<Self> {
        info!("Initializing search server components...");

        let state = AppState {
            lexical: Arc::new(LexicalSearchService::new(store.clone(), config.search.clone())),
            semantic: Arc::new(SemanticSearchService::new(store.clone(), embedder, config.search.clone())),
            store,
            metrics: MetricsRegistry::new()?,
            config: Arc::new(config.clone()),
        };

        let app = build_router(state)?;

        info!("Search server initialized successfully");
        Ok(SearchServer { app, config })
    }

    /// Router with all layers applied
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub async fn run(self) -> SearchResult<()> {
        let bind_addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&bind_addr)
            .await
            .map_err(|e| SearchError::Config(format!("Failed to bind to {}: {}", bind_addr, e)))?;

        info!("HTTP server listening on {}", bind_addr);

        axum::serve(listener, self.app)
            .await
            .map_err(|e| SearchError::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }
}

fn build_router(state: AppState) -> SearchResult<Router> {
    let cors = cors_layer(&state.config.server.allowed_origins)?;

    let search_routes = Router::new()
        .route("/search/lexical", get(lexical_search_handler))
        .route("/search/semantic", get(semantic_search_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    Ok(Router::new()
        .merge(search_routes)
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(cors)
        .with_state(state))
}

/// Origin allowlist; preflight requests are answered by the layer itself
fn cors_layer(allowed_origins: &[String]) -> SearchResult<CorsLayer> {
    let origins = allowed_origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .map_err(|e| SearchError::Config(format!("Invalid allowed origin '{}': {}", origin, e)))
        })
        .collect::<SearchResult<Vec<_>>>()?;

    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static("x-client-info"),
            HeaderName::from_static("apikey"),
        ]))
}

/// Tag every request with an id, both in the tracing span and the response headers
async fn request_id_middleware(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!(
        "http_request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = next.run(request).instrument(span).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert(REQUEST_ID, value);
    }
    response
}

/// Bearer credential check against the configured API keys
async fn auth_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, Response> {
    let known_key = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| state.config.server.api_keys.iter().any(|key| key == token.trim()));

    match known_key {
        Some(true) => Ok(next.run(request).await),
        Some(false) => {
            warn!("Rejected request with unknown API key");
            Err(error_response(&SearchError::Unauthorized(
                "The API key is not valid for this service".to_string(),
            )))
        }
        None => Err(error_response(&SearchError::Unauthorized(
            "Missing 'Authorization: Bearer <key>' header".to_string(),
        ))),
    }
}

async fn lexical_search_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Response {
    let result = run_search(&state, "lexical", state.lexical.search(&params)).await;
    search_response(&state, result, &params.cache_tag(LEXICAL_TAG_PREFIX), &headers)
}

async fn semantic_search_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> Response {
    let result = run_search(&state, "semantic", state.semantic.search(&params)).await;
    search_response(&state, result, &params.cache_tag(SEMANTIC_TAG_PREFIX), &headers)
}

/// Run a search under the handler deadline and record its metrics
async fn run_search<F>(state: &AppState, endpoint: &str, search: F) -> SearchResult<SearchResultPage>
where
    F: Future<Output = SearchResult<SearchResultPage>>,
{
    let timer = state.metrics.metrics.start_timer(endpoint);
    let request_timeout = Duration::from_millis(state.config.server.request_timeout_ms);

    let result = match timeout(request_timeout, search).await {
        Ok(result) => result,
        Err(_) => {
            error!("Function timeout after {:?}", request_timeout);
            Err(SearchError::Timeout)
        }
    };

    timer.observe();
    state
        .metrics
        .metrics
        .record_outcome(endpoint, result.as_ref().map(|page| page.items.len()));
    result
}

fn search_response(
    state: &AppState,
    result: SearchResult<SearchResultPage>,
    cache_tag: &str,
    request_headers: &HeaderMap,
) -> Response {
    let page = match result {
        Ok(page) => page,
        Err(e) => return error_response(&e),
    };

    let body = match serde_json::to_vec(&page) {
        Ok(body) => body,
        Err(e) => return error_response(&SearchError::from(e)),
    };
    let etag = format!("\"{:016x}\"", farmhash::fingerprint64(&body));

    let mut headers = HeaderMap::new();
    let cache_control = state.config.search.cache_control_header();
    if let Ok(value) = HeaderValue::from_str(&cache_control) {
        headers.insert(header::CACHE_CONTROL, value.clone());
        headers.insert(CDN_CACHE_CONTROL, value.clone());
        headers.insert(CLOUDFLARE_CDN_CACHE_CONTROL, value);
    }
    headers.insert(header::VARY, HeaderValue::from_static(VARY_HEADER));
    match HeaderValue::from_str(cache_tag) {
        Ok(value) => {
            headers.insert(CACHE_TAG, value);
        }
        Err(_) => debug!("Skipping Cache-Tag header for non-ASCII query"),
    }
    if let Ok(value) = HeaderValue::from_str(&etag) {
        headers.insert(header::ETAG, value);
    }

    let not_modified = request_headers
        .get(header::IF_NONE_MATCH)
        .and_then(|value| value.to_str().ok())
        .map_or(false, |candidates| candidates.split(',').any(|c| c.trim() == etag));
    if not_modified {
        return (StatusCode::NOT_MODIFIED, headers).into_response();
    }

    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));
    (StatusCode::OK, headers, body).into_response()
}

fn error_response(error: &SearchError) -> Response {
    let status = StatusCode::from_u16(error.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    let (label, message) = match error {
        SearchError::Timeout => ("Function timeout", "Search took too long to complete".to_string()),
        SearchError::InvalidRequest(msg) => ("Invalid request", msg.clone()),
        SearchError::Unauthorized(msg) => ("Unauthorized", msg.clone()),
        SearchError::Degraded(msg) => ("Service degraded", msg.clone()),
        _ => {
            error!("Search failed: {}", error);
            ("Internal error", "Search service temporarily unavailable".to_string())
        }
    };

    (
        status,
        Json(ErrorResponse {
            error: label.to_string(),
            message,
            timestamp: chrono::Utc::now(),
        }),
    )
        .into_response()
}

async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    match state.store.health_check().await {
        Ok(()) => (StatusCode::OK, Json(HealthResponse { ok: true })),
        Err(e) => {
            warn!("Health check failed: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse { ok: false }))
        }
    }
}

async fn metrics_handler(State(state): State<AppState>) -> Response {
    match state.metrics.gather() {
        Ok(body) => {
            let content_type = HeaderValue::from_str(&state.metrics.content_type())
                .unwrap_or_else(|_| HeaderValue::from_static("text/plain"));
            ([(header::CONTENT_TYPE, content_type)], body).into_response()
        }
        Err(e) => error_response(&e),
    }
}
