use crate::chunking::normalize_whitespace;
use crate::index::FlatIndex;
use crate::traits::{Embedder, VectorSearch};
use crate::{EngineError, RetrievalResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

pub struct Retriever {
    embedder: Arc<dyn Embedder>,
    min_chunk_chars: usize,
    timeout: Duration,
}

impl Retriever {
    pub fn new(embedder: Arc<dyn Embedder>, min_chunk_chars: usize, timeout: Duration) -> Self {
        Self {
            embedder,
            min_chunk_chars,
            timeout,
        }
    }

    pub async fn retrieve(
        &self,
        index: &FlatIndex,
        query: &str,
        k: usize,
    ) -> Result<RetrievalResult, EngineError> {
        if k == 0 {
            return Err(EngineError::InvalidParameter(
                "k must be greater than zero".to_string(),
            ));
        }
        // an index built by another embedder version is stale even at equal width
        if index.embedder_id() != self.embedder.id()
            || index.dimensions() != self.embedder.dimensions()
        {
            return Err(EngineError::DimensionMismatch {
                expected: index.dimensions(),
                actual: self.embedder.dimensions(),
            });
        }

        let embedded = tokio::time::timeout(self.timeout, self.embedder.embed(query)).await;
        let query_vector = match embedded {
            Ok(result) => result?,
            Err(_) => {
                return Err(EngineError::Embedding(format!(
                    "query embedding timed out after {:?}",
                    self.timeout
                )))
            }
        };

        let min_chars = self.min_chunk_chars;
        let result = index.search_where(&query_vector, k, &|chunk| {
            is_meaningful(&chunk.text, min_chars)
        })?;

        debug!(k, hits = result.len(), "retrieved chunks");
        Ok(result)
    }
}

pub fn is_meaningful(text: &str, min_chars: usize) -> bool {
    normalize_whitespace(text).chars().count() >= min_chars
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::IndexMetadata;
    use crate::{CharacterNgramEmbedder, Chunk, DocumentFingerprint};
    use async_trait::async_trait;
    use chrono::Utc;

    /// Same identity as the wrapped embedder, but never answers in time.
    struct StalledEmbedder(CharacterNgramEmbedder);

    #[async_trait]
    impl Embedder for StalledEmbedder {
        fn id(&self) -> &str {
            self.0.id()
        }

        fn dimensions(&self) -> usize {
            self.0.dimensions()
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(self.0.embed_sync(text))
        }
    }

    fn metadata(embedder: &CharacterNgramEmbedder) -> IndexMetadata {
        IndexMetadata {
            document: DocumentFingerprint {
                document_id: "doc".to_string(),
                source_name: "doc.txt".to_string(),
                checksum: "sum".to_string(),
                ingested_at: Utc::now(),
            },
            embedder_id: embedder.id().to_string(),
            dimensions: embedder.dimensions(),
        }
    }

    fn index_of(
        texts: &[&str],
        embedder: &CharacterNgramEmbedder,
    ) -> Result<FlatIndex, EngineError> {
        let chunks: Vec<Chunk> = texts
            .iter()
            .enumerate()
            .map(|(index, text)| Chunk {
                index,
                text: text.to_string(),
                start: 0,
                end: text.chars().count(),
            })
            .collect();
        let vectors = texts.iter().map(|text| embedder.embed_sync(text)).collect();
        FlatIndex::build(metadata(embedder), chunks, vectors)
    }

    fn retriever(embedder: CharacterNgramEmbedder) -> Retriever {
        Retriever::new(Arc::new(embedder), 5, Duration::from_secs(5))
    }

    #[tokio::test]
    async fn most_similar_chunk_ranks_first() -> Result<(), EngineError> {
        let embedder = CharacterNgramEmbedder::default();
        let index = index_of(
            &[
                "The boiler must be descaled every spring.",
                "Hydraulic pump pressure should stay below 200 bar.",
                "Invoices are paid within thirty days.",
            ],
            &embedder,
        )?;

        let result = retriever(embedder)
            .retrieve(&index, "hydraulic pump pressure", 2)
            .await?;
        assert_eq!(result.len(), 2);
        assert_eq!(result.hits[0].chunk.index, 1);
        assert!(result.hits[0].score >= result.hits[1].score);
        Ok(())
    }

    #[tokio::test]
    async fn near_empty_chunks_are_filtered() -> Result<(), EngineError> {
        let embedder = CharacterNgramEmbedder::default();
        let index = index_of(&["  ab \n", "pump", "pump pressure limits"], &embedder)?;

        let result = retriever(embedder).retrieve(&index, "pump", 10).await?;
        let indices: Vec<usize> = result.hits.iter().map(|hit| hit.chunk.index).collect();
        assert_eq!(indices, vec![2]);
        Ok(())
    }

    #[tokio::test]
    async fn index_from_another_embedder_is_rejected() -> Result<(), EngineError> {
        let index = index_of(&["some content here"], &CharacterNgramEmbedder::new(64))?;
        let result = retriever(CharacterNgramEmbedder::new(32))
            .retrieve(&index, "content", 3)
            .await;
        assert!(matches!(
            result,
            Err(EngineError::DimensionMismatch {
                expected: 64,
                actual: 32
            })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn zero_k_is_rejected_before_embedding() -> Result<(), EngineError> {
        let embedder = CharacterNgramEmbedder::default();
        let index = index_of(&["some content here"], &embedder)?;
        let result = retriever(embedder).retrieve(&index, "content", 0).await;
        assert!(matches!(result, Err(EngineError::InvalidParameter(_))));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_query_embedding_times_out() -> Result<(), EngineError> {
        let embedder = CharacterNgramEmbedder::default();
        let index = index_of(&["pump pressure limits"], &embedder)?;
        let retriever = Retriever::new(
            Arc::new(StalledEmbedder(embedder)),
            5,
            Duration::from_secs(1),
        );

        let result = retriever.retrieve(&index, "pump", 3).await;
        match result {
            Err(EngineError::Embedding(reason)) => assert!(reason.contains("timed out")),
            other => panic!("expected embedding timeout, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn meaningful_length_counts_normalized_characters() {
        assert!(!is_meaningful(" a  b \n c ", 6));
        assert!(is_meaningful(" a  b \n c ", 5));
        assert!(!is_meaningful("\n\n\t", 1));
    }
}
