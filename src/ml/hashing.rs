use crate::error::{SearchError, SearchResult};
use crate::ml::{normalize, EmbeddingProvider};
use async_trait::async_trait;
use tracing::{debug, instrument};

/// Feature-hashing encoder.
///
/// Each lowercase word lands in a bucket picked by its farmhash fingerprint, so texts sharing
/// words end up close in cosine space. Output is normalized to unit length.
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimension: usize,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension: dimension.max(1) }
    }

    /// Encode synchronously; used by [`EmbeddingProvider::embed`] and for seeding stores
    pub fn encode(&self, text: &str) -> SearchResult<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(SearchError::Embedding("Empty text for encoding".to_string()));
        }

        let mut embedding = vec![0.0f32; self.dimension];
        for word in text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(str::to_lowercase)
        {
            let fingerprint = farmhash::fingerprint64(word.as_bytes());
            let idx = (fingerprint % self.dimension as u64) as usize;
            // High bit picks the sign so unrelated words partly cancel
            let sign = if fingerprint >> 63 == 0 { 1.0 } else { -1.0 };
            embedding[idx] += sign;
        }

        normalize(&mut embedding);
        Ok(embedding)
    }
}

impl Default for HashingEmbedder {
    fn default() -> Self {
        Self::new(384)
    }
}

#[async_trait]
impl EmbeddingProvider for HashingEmbedder {
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    async fn embed(&self, text: &str) -> SearchResult<Vec<f32>> {
        let embedding = self.encode(text)?;
        debug!("Generated embedding with {} dimensions", embedding.len());
        Ok(embedding)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
