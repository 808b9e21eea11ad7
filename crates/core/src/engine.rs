use crate::answer::AnswerSynthesizer;
use crate::index::FlatIndex;
use crate::ingest::IngestionPipeline;
use crate::retrieval::Retriever;
use crate::traits::{
    Embedder, GroundedGenerator, TextExtractor, UnconstrainedGenerator, VectorSearch,
};
use crate::{
    AnswerOutcome, EngineConfig, EngineError, Health, IndexHandle, RetrievalResult,
    SourceDocument,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// The external capabilities the engine drives.
#[derive(Clone)]
pub struct Capabilities {
    pub extractor: Arc<dyn TextExtractor>,
    pub embedder: Arc<dyn Embedder>,
    pub grounded: Arc<dyn GroundedGenerator>,
    pub unconstrained: Arc<dyn UnconstrainedGenerator>,
}

/// Owns the single index slot.
///
/// The active index is an immutable `Arc<FlatIndex>` replaced wholesale after the new
/// artifact is on disk, so a query holds either the old or the new index for its whole
/// duration. At most one ingestion runs at a time; others fail with `IngestionInProgress`.
pub struct QaEngine {
    config: EngineConfig,
    capabilities: Capabilities,
    pipeline: IngestionPipeline,
    retriever: Retriever,
    synthesizer: AnswerSynthesizer,
    active: RwLock<Option<Arc<FlatIndex>>>,
    ingestion: Mutex<()>,
}

impl QaEngine {
    pub fn new(config: EngineConfig, capabilities: Capabilities) -> Result<Self, EngineError> {
        config.validate()?;
        let timeout = config.capability_timeout();

        Ok(Self {
            pipeline: IngestionPipeline::new(
                Arc::clone(&capabilities.extractor),
                Arc::clone(&capabilities.embedder),
                &config,
            )?,
            retriever: Retriever::new(
                Arc::clone(&capabilities.embedder),
                config.min_chunk_chars,
                timeout,
            ),
            synthesizer: AnswerSynthesizer::new(config.min_chunk_chars, timeout)?,
            active: RwLock::new(None),
            ingestion: Mutex::new(()),
            config,
            capabilities,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub async fn ingest(&self, source: SourceDocument) -> Result<IndexHandle, EngineError> {
        let _slot = self
            .ingestion
            .try_lock()
            .map_err(|_| EngineError::IngestionInProgress)?;

        info!(source = %source.name, bytes = source.bytes.len(), "ingestion started");
        let index = Arc::new(self.pipeline.run(source).await?);

        let path = self.config.index_path.clone();
        let to_persist = Arc::clone(&index);
        tokio::task::spawn_blocking(move || to_persist.save(&path))
            .await
            .map_err(|error| EngineError::Io(std::io::Error::other(error.to_string())))??;

        *self.active.write().await = Some(Arc::clone(&index));

        let handle = handle_for(&index, self.config.index_path.clone());
        info!(
            document_id = %handle.document.document_id,
            chunk_count = handle.chunk_count,
            path = %handle.path.display(),
            "index swapped in"
        );
        Ok(handle)
    }

    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult, EngineError> {
        let index = self.current_index().await?;
        self.retriever.retrieve(&index, query, k).await
    }

    pub async fn answer(
        &self,
        question: &str,
        permission_granted: bool,
    ) -> Result<AnswerOutcome, EngineError> {
        if question.trim().is_empty() {
            return Err(EngineError::InvalidParameter("question is empty".to_string()));
        }

        let index = self.current_index().await?;
        let retrieval = self
            .retriever
            .retrieve(&index, question, self.config.top_k)
            .await?;

        self.synthesizer
            .synthesize(
                question,
                &retrieval,
                permission_granted,
                self.capabilities.grounded.as_ref(),
                self.capabilities.unconstrained.as_ref(),
            )
            .await
    }

    pub async fn health(&self) -> Health {
        match self.current_index().await {
            Ok(index) => Health {
                ready: true,
                document_id: Some(index.document().document_id.clone()),
                chunk_count: Some(index.len()),
            },
            Err(_) => Health {
                ready: false,
                document_id: None,
                chunk_count: None,
            },
        }
    }

    /// Drops the cached index and reads the persisted artifact again.
    ///
    /// Shares the ingestion guard so a stale read can never overwrite a fresher swap.
    pub async fn reload(&self) -> Result<IndexHandle, EngineError> {
        let _slot = self
            .ingestion
            .try_lock()
            .map_err(|_| EngineError::IngestionInProgress)?;

        let index = Arc::new(self.load_persisted().await?);
        *self.active.write().await = Some(Arc::clone(&index));
        Ok(handle_for(&index, self.config.index_path.clone()))
    }

    async fn current_index(&self) -> Result<Arc<FlatIndex>, EngineError> {
        if let Some(index) = self.active.read().await.as_ref() {
            return Ok(Arc::clone(index));
        }

        let loaded = Arc::new(self.load_persisted().await?);
        let mut active = self.active.write().await;
        // an ingestion may have swapped in a newer index while we were loading
        let index = active.get_or_insert_with(|| Arc::clone(&loaded));
        Ok(Arc::clone(index))
    }

    async fn load_persisted(&self) -> Result<FlatIndex, EngineError> {
        let path = self.config.index_path.clone();
        let shown = path.display().to_string();
        let loaded = tokio::task::spawn_blocking(move || FlatIndex::load(&path))
            .await
            .map_err(|error| EngineError::IndexUnavailable(error.to_string()))?;

        match &loaded {
            Ok(index) => info!(path = %shown, chunk_count = index.len(), "index loaded"),
            Err(error) => warn!(path = %shown, %error, "no usable index on disk"),
        }
        loaded
    }
}

fn handle_for(index: &FlatIndex, path: PathBuf) -> IndexHandle {
    IndexHandle {
        document: index.document().clone(),
        chunk_count: index.len(),
        dimensions: index.dimensions(),
        path,
    }
}
