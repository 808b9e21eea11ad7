use crate::{Chunk, EngineError, RetrievalResult};
use async_trait::async_trait;

/// Unreadable sources are `Extraction` errors; a readable but empty source returns `Ok("")`.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, source: &[u8]) -> Result<String, EngineError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifies the model/version; indexes built by a different id are rejected.
    fn id(&self) -> &str;

    fn dimensions(&self) -> usize;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError>;
}

#[async_trait]
pub trait GroundedGenerator: Send + Sync {
    async fn generate_grounded(&self, context: &str, question: &str)
        -> Result<String, EngineError>;
}

#[async_trait]
pub trait UnconstrainedGenerator: Send + Sync {
    async fn generate_unconstrained(&self, question: &str) -> Result<String, EngineError>;
}

/// Nearest-neighbour lookup over an immutable set of chunk vectors.
pub trait VectorSearch: Send + Sync {
    fn dimensions(&self) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn search(&self, query_vector: &[f32], k: usize) -> Result<RetrievalResult, EngineError> {
        self.search_where(query_vector, k, &|_| true)
    }

    /// Like `search`, but chunks rejected by `keep` never take a result slot.
    fn search_where(
        &self,
        query_vector: &[f32],
        k: usize,
        keep: &dyn Fn(&Chunk) -> bool,
    ) -> Result<RetrievalResult, EngineError>;
}
