use super::{LexicalMatches, LexicalQuery, ProductRow, ProductStore, ScoredProduct, SemanticQuery};
use crate::error::SearchResult;
use crate::ml::cosine_similarity;
use async_trait::async_trait;
use std::cmp::Ordering;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Clone)]
struct StoredProduct {
    row: ProductRow,
    terms: Vec<String>,
    embedding: Option<Vec<f32>>,
}

/// In-memory product store.
///
/// Text matching is word based: every plain query word must appear in the title and words
/// prefixed with `-` must not.
#[derive(Debug, Default)]
pub struct MemoryProductStore {
    products: RwLock<Vec<StoredProduct>>,
}

impl MemoryProductStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace (by id) a product
    pub async fn insert(&self, row: ProductRow, embedding: Option<Vec<f32>>) {
        let stored = StoredProduct {
            terms: tokenize(&row.title),
            row,
            embedding,
        };

        let mut products = self.products.write().await;
        products.retain(|p| p.row.id != stored.row.id);
        products.push(stored);
    }

    pub async fn len(&self) -> usize {
        self.products.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.products.read().await.is_empty()
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Split a query into required and excluded words
fn parse_terms(query: &str) -> (Vec<String>, Vec<String>) {
    let mut required = Vec::new();
    let mut excluded = Vec::new();

    for word in query.split_whitespace() {
        match word.strip_prefix('-') {
            Some(negated) => excluded.extend(tokenize(negated)),
            None => required.extend(tokenize(word)),
        }
    }

    (required, excluded)
}

fn domain_matches(row: &ProductRow, domain: Option<&str>) -> bool {
    domain.map_or(true, |d| row.domain == d)
}

#[async_trait]
impl ProductStore for MemoryProductStore {
    async fn search_text(&self, query: &LexicalQuery) -> SearchResult<LexicalMatches> {
        let (required, excluded) = parse_terms(&query.text);
        let products = self.products.read().await;

        let mut matches: Vec<&StoredProduct> = products
            .iter()
            .filter(|p| domain_matches(&p.row, query.domain.as_deref()))
            .filter(|p| query.before_id.map_or(true, |before| p.row.id < before))
            .filter(|p| !required.is_empty() && required.iter().all(|t| p.terms.contains(t)))
            .filter(|p| !excluded.iter().any(|t| p.terms.contains(t)))
            .collect();
        matches.sort_by(|a, b| b.row.id.cmp(&a.row.id));

        let total = matches.len() as u64;
        let rows = matches
            .into_iter()
            .take(query.fetch_limit)
            .map(|p| p.row.clone())
            .collect::<Vec<_>>();

        debug!("Memory text search matched {} rows", total);
        Ok(LexicalMatches { rows, total })
    }

    async fn search_similar(&self, query: &SemanticQuery) -> SearchResult<Vec<ScoredProduct>> {
        let products = self.products.read().await;

        let mut scored: Vec<ScoredProduct> = products
            .iter()
            .filter(|p| domain_matches(&p.row, query.domain.as_deref()))
            .filter_map(|p| {
                let embedding = p.embedding.as_ref()?;
                Some(ScoredProduct {
                    row: p.row.clone(),
                    similarity: cosine_similarity(&query.embedding, embedding),
                })
            })
            .filter(|s| s.similarity >= query.similarity_threshold)
            .filter(|s| query.below_similarity.map_or(true, |below| s.similarity < below))
            .collect();

        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b.row.id.cmp(&a.row.id))
        });
        scored.truncate(query.fetch_limit);

        Ok(scored)
    }

    async fn health_check(&self) -> SearchResult<()> {
        Ok(())
    }
}
