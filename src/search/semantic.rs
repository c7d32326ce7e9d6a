use super::{with_query_timeout, SearchParams, TOTAL_CAP};
use crate::config::SearchPolicyConfig;
use crate::database::{ProductStore, SemanticQuery};
use crate::error::{SearchError, SearchResult, ValidationError};
use crate::ml::EmbeddingProvider;
use crate::observability::sanitize_query;
use crate::types::{ProductSummary, SearchResultPage, SortMode};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Embedding + vector similarity product search.
///
/// Pages are keyed on similarity: the cursor is the similarity of the last item and the next
/// page only contains strictly less similar products.
pub struct SemanticSearchService {
    store: Arc<dyn ProductStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    policy: SearchPolicyConfig,
}

impl SemanticSearchService {
    pub fn new(store: Arc<dyn ProductStore>, embedder: Arc<dyn EmbeddingProvider>, policy: SearchPolicyConfig) -> Self {
        Self { store, embedder, policy }
    }

    #[instrument(skip(self, params), fields(query = %sanitize_query(params.query_text())))]
    pub async fn search(&self, params: &SearchParams) -> SearchResult<SearchResultPage> {
        let text = params.query_text();
        if text.is_empty() {
            return Ok(SearchResultPage::empty(SortMode::Similarity));
        }

        let limit = params.page_limit();
        let below_similarity = params.cursor().map(parse_similarity_cursor).transpose()?;

        let started = Instant::now();
        let embedding = self.embedder.embed(text).await?;
        if embedding.len() != self.embedder.dimension() {
            return Err(SearchError::Embedding(format!(
                "Expected {} dimensions, provider returned {}",
                self.embedder.dimension(),
                embedding.len()
            )));
        }
        debug!("Embedding generated in {:?}", started.elapsed());

        let query = SemanticQuery {
            embedding,
            domain: params.domain(),
            similarity_threshold: self.policy.similarity_threshold,
            below_similarity,
            fetch_limit: limit + 1,
        };

        let started = Instant::now();
        let scored = with_query_timeout(self.policy.query_timeout(), self.store.search_similar(&query)).await?;
        info!("Query completed in {:?}", started.elapsed());

        let mut page = SearchResultPage::from_overfetch(
            scored,
            limit,
            0,
            SortMode::Similarity,
            |scored| scored.similarity.to_string(),
            |scored| ProductSummary::from(scored.row),
        );
        page.total = (page.items.len() as u64).min(TOTAL_CAP);

        Ok(page)
    }
}

fn parse_similarity_cursor(cursor: &str) -> SearchResult<f32> {
    cursor
        .parse::<f32>()
        .ok()
        .filter(|s| s.is_finite())
        .ok_or_else(|| ValidationError::InvalidCursor(format!("'{}' is not a similarity score", cursor)).into())
}
