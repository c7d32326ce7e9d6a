use crate::config::EmbeddingConfig;
use crate::error::{SearchError, SearchResult};
use crate::ml::EmbeddingProvider;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

#[derive(Debug, Serialize)]
struct FeatureExtractionRequest<'a> {
    inputs: &'a str,
    options: RequestOptions,
}

#[derive(Debug, Serialize)]
struct RequestOptions {
    wait_for_model: bool,
}

/// Feature-extraction responses come back either pooled or per token
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FeatureExtractionResponse {
    Pooled(Vec<f32>),
    Tokens(Vec<Vec<f32>>),
    Batched(Vec<Vec<Vec<f32>>>),
}

impl FeatureExtractionResponse {
    fn into_embedding(self) -> SearchResult<Vec<f32>> {
        match self {
            FeatureExtractionResponse::Pooled(embedding) => Ok(embedding),
            FeatureExtractionResponse::Tokens(tokens) => mean_pool(tokens),
            FeatureExtractionResponse::Batched(mut batch) => {
                if batch.is_empty() {
                    return Err(SearchError::Embedding("Empty embedding batch".to_string()));
                }
                mean_pool(batch.swap_remove(0))
            }
        }
    }
}

/// Average token vectors into one sentence vector
fn mean_pool(tokens: Vec<Vec<f32>>) -> SearchResult<Vec<f32>> {
    let width = tokens
        .first()
        .map(Vec::len)
        .ok_or_else(|| SearchError::Embedding("Empty token embeddings".to_string()))?;

    let mut pooled = vec![0.0f32; width];
    for token in &tokens {
        if token.len() != width {
            return Err(SearchError::Embedding("Ragged token embeddings".to_string()));
        }
        for (sum, value) in pooled.iter_mut().zip(token) {
            *sum += value;
        }
    }

    let count = tokens.len() as f32;
    for value in &mut pooled {
        *value /= count;
    }
    Ok(pooled)
}

/// Client for a hosted sentence-embedding model
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
    dimension: usize,
}

impl HttpEmbeddingProvider {
    pub fn new(config: &EmbeddingConfig) -> SearchResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| SearchError::Config(format!("Failed to build embedding client: {}", e)))?;

        let endpoint = format!(
            "{}/{}",
            config.api_url.trim_end_matches('/'),
            config.model.trim_start_matches('/')
        );

        Ok(Self {
            client,
            endpoint,
            api_token: config.api_token.clone(),
            dimension: config.dimension,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn embed(&self, text: &str) -> SearchResult<Vec<f32>> {
        let started = Instant::now();

        let mut request = self.client.post(&self.endpoint).json(&FeatureExtractionRequest {
            inputs: text,
            options: RequestOptions { wait_for_model: true },
        });
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                SearchError::Timeout
            } else {
                SearchError::Embedding(format!("Embedding request failed: {}", e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SearchError::Embedding(format!(
                "Embedding provider returned {}: {}",
                status, body
            )));
        }

        let parsed: FeatureExtractionResponse = response
            .json()
            .await
            .map_err(|e| SearchError::Embedding(format!("Invalid embedding response: {}", e)))?;
        let embedding = parsed.into_embedding()?;

        debug!(
            "Embedding generated in {:?} ({} dimensions)",
            started.elapsed(),
            embedding.len()
        );
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
