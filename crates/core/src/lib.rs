pub mod answer;
pub mod chunking;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod extractor;
pub mod index;
pub mod ingest;
pub mod models;
pub mod providers;
pub mod retrieval;
pub mod traits;

pub use answer::{after_grounded, after_permission, AnswerSynthesizer, GroundedReply};
pub use chunking::{chunk_text, normalize_whitespace, ChunkingConfig};
pub use embeddings::{CharacterNgramEmbedder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use engine::{Capabilities, QaEngine};
pub use error::{EngineError, Result};
pub use extractor::{AutoExtractor, PdfTextExtractor, PlainTextExtractor};
pub use index::{FlatIndex, IndexMetadata, INDEX_FORMAT, INDEX_VERSION};
pub use ingest::{fingerprint, IngestionPipeline};
pub use models::{
    AnswerOutcome, AnswerState, Chunk, Document, DocumentFingerprint, EngineConfig, Health,
    IndexHandle, RetrievalResult, ScoredChunk, SourceDocument, FALLBACK_DENIED_MESSAGE,
    NOT_IN_CONTEXT_SENTINEL,
};
pub use providers::{grounded_prompt, HttpEmbedder, HttpGenerator, HttpProviderConfig};
pub use retrieval::{is_meaningful, Retriever};
pub use traits::{Embedder, GroundedGenerator, TextExtractor, UnconstrainedGenerator, VectorSearch};
