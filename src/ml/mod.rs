//! Query embeddings for semantic search
//!
//! - [`HttpEmbeddingProvider`] calls a hosted feature-extraction endpoint
//! - [`HashingEmbedder`] is a deterministic local encoder for tests and offline runs

pub mod embedding_client;
pub mod hashing;

use crate::error::SearchResult;
use async_trait::async_trait;

pub use embedding_client::HttpEmbeddingProvider;
pub use hashing::HashingEmbedder;

/// External capability that turns text into a fixed-size vector
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> SearchResult<Vec<f32>>;

    /// Length of every vector returned by [`EmbeddingProvider::embed`]
    fn dimension(&self) -> usize;
}

/// Cosine similarity of two vectors; 0.0 when either is all zeros or the lengths differ
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Scale `vector` to unit length in place
pub fn normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}
