use super::{with_query_timeout, SearchParams, TOTAL_CAP};
use crate::config::SearchPolicyConfig;
use crate::database::{LexicalQuery, ProductStore};
use crate::error::{SearchResult, ValidationError};
use crate::observability::sanitize_query;
use crate::types::{ProductSummary, SearchResultPage, SortMode};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument};

/// Full-text product search with keyset pagination on the primary key
pub struct LexicalSearchService {
    store: Arc<dyn ProductStore>,
    policy: SearchPolicyConfig,
}

impl LexicalSearchService {
    pub fn new(store: Arc<dyn ProductStore>, policy: SearchPolicyConfig) -> Self {
        Self { store, policy }
    }

    #[instrument(skip(self, params), fields(query = %sanitize_query(params.query_text())))]
    pub async fn search(&self, params: &SearchParams) -> SearchResult<SearchResultPage> {
        let text = params.query_text();
        if text.is_empty() {
            return Ok(SearchResultPage::empty(SortMode::Recent));
        }

        let sort = SortMode::from_param(params.sort.as_deref());
        let limit = params.page_limit();
        let before_id = params
            .cursor()
            .map(|c| {
                c.parse::<i64>()
                    .map_err(|_| ValidationError::InvalidCursor(format!("'{}' is not a product key", c)))
            })
            .transpose()?;

        debug!(
            "Lexical search: domain={:?}, sort={}, limit={}, cursor={:?}",
            params.domain(),
            sort,
            limit,
            before_id
        );

        let query = LexicalQuery {
            text: text.to_string(),
            domain: params.domain(),
            before_id,
            fetch_limit: limit + 1,
        };

        let started = Instant::now();
        let matches = with_query_timeout(self.policy.query_timeout(), self.store.search_text(&query)).await?;
        info!("Query completed in {:?}", started.elapsed());

        Ok(SearchResultPage::from_overfetch(
            matches.rows,
            limit,
            matches.total.min(TOTAL_CAP),
            sort,
            |row| row.id.to_string(),
            ProductSummary::from,
        ))
    }
}
