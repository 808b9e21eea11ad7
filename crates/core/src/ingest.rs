use crate::chunking::{chunk_text, ChunkingConfig};
use crate::index::{FlatIndex, IndexMetadata};
use crate::traits::{Embedder, TextExtractor};
use crate::{Document, DocumentFingerprint, EngineConfig, EngineError, SourceDocument};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Extracts, chunks and embeds one document into an in-memory index.
///
/// Nothing here touches the persisted slot; a failure at any step leaves no trace.
pub struct IngestionPipeline {
    extractor: Arc<dyn TextExtractor>,
    embedder: Arc<dyn Embedder>,
    chunking: ChunkingConfig,
    timeout: Duration,
}

impl IngestionPipeline {
    pub fn new(
        extractor: Arc<dyn TextExtractor>,
        embedder: Arc<dyn Embedder>,
        config: &EngineConfig,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            extractor,
            embedder,
            chunking: ChunkingConfig::from(config),
            timeout: config.capability_timeout(),
        })
    }

    pub async fn run(&self, source: SourceDocument) -> Result<FlatIndex, EngineError> {
        let document = self.extract(source).await?;
        let document_id = document.fingerprint.document_id.clone();

        let chunks = chunk_text(&document.text, self.chunking)?;
        if chunks.is_empty() || document.text.trim().is_empty() {
            return Err(EngineError::NoContent(format!(
                "{} has no extractable text",
                document.fingerprint.source_name
            )));
        }
        info!(document_id = %document_id, chunk_count = chunks.len(), "document chunked");

        let dimensions = self.embedder.dimensions();
        let mut embeddings = Vec::with_capacity(chunks.len());
        for chunk in &chunks {
            let vector = self.embed_chunk(&chunk.text, chunk.index).await?;
            if vector.len() != dimensions {
                return Err(EngineError::DimensionMismatch {
                    expected: dimensions,
                    actual: vector.len(),
                });
            }
            embeddings.push(vector);
        }
        debug!(document_id = %document_id, embedded = embeddings.len(), "chunks embedded");

        FlatIndex::build(
            IndexMetadata {
                document: document.fingerprint,
                embedder_id: self.embedder.id().to_string(),
                dimensions,
            },
            chunks,
            embeddings,
        )
    }

    async fn extract(&self, source: SourceDocument) -> Result<Document, EngineError> {
        let fingerprint = fingerprint(&source);
        let extractor = Arc::clone(&self.extractor);
        let text = tokio::task::spawn_blocking(move || extractor.extract_text(&source.bytes))
            .await
            .map_err(|error| EngineError::Extraction(format!("extraction task failed: {error}")))??;

        Ok(Document { fingerprint, text })
    }

    async fn embed_chunk(&self, text: &str, index: usize) -> Result<Vec<f32>, EngineError> {
        match tokio::time::timeout(self.timeout, self.embedder.embed(text)).await {
            Ok(Ok(vector)) => Ok(vector),
            Ok(Err(EngineError::Embedding(reason))) => Err(EngineError::Embedding(format!(
                "chunk {index}: {reason}"
            ))),
            Ok(Err(error)) => Err(EngineError::Embedding(format!("chunk {index}: {error}"))),
            Err(_) => Err(EngineError::Embedding(format!(
                "chunk {index}: timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

pub fn fingerprint(source: &SourceDocument) -> DocumentFingerprint {
    DocumentFingerprint {
        document_id: sha256_hex(source.name.as_bytes()),
        source_name: source.name.clone(),
        checksum: sha256_hex(&source.bytes),
        ingested_at: Utc::now(),
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
