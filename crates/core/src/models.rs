use crate::error::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Phrase the grounded generator must return verbatim when the context lacks the answer.
pub const NOT_IN_CONTEXT_SENTINEL: &str = "Answer is not available in the context.";

/// Returned when no grounded answer exists and fallback was not permitted.
pub const FALLBACK_DENIED_MESSAGE: &str =
    "Answer not found in the context, and AI permission was not granted.";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DocumentFingerprint {
    pub document_id: String,
    pub source_name: String,
    pub checksum: String,
    pub ingested_at: DateTime<Utc>,
}

/// An uploaded source awaiting ingestion.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    pub fn new(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub fingerprint: DocumentFingerprint,
    pub text: String,
}

/// A contiguous slice of the document text. Offsets count characters, `end` is exclusive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub text: String,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Hits ordered by descending score, ties by ascending chunk index.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum AnswerState {
    Grounded,
    /// No grounded answer exists; the outcome now depends on the caller's permission.
    NeedsPermission,
    FallbackUsed,
    FallbackDenied,
}

impl AnswerState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::NeedsPermission)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerOutcome {
    pub state: AnswerState,
    pub answer: String,
}

/// Summary of the index that an ingestion made active.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexHandle {
    pub document: DocumentFingerprint,
    pub chunk_count: usize,
    pub dimensions: usize,
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Health {
    pub ready: bool,
    pub document_id: Option<String>,
    pub chunk_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub min_chunk_chars: usize,
    pub index_path: PathBuf,
    pub capability_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 200,
            top_k: 4,
            min_chunk_chars: 5,
            index_path: PathBuf::from("index/document.index.json"),
            capability_timeout_secs: 60,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.chunk_size == 0 {
            return Err(EngineError::InvalidParameter(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(EngineError::InvalidParameter(format!(
                "chunk_overlap {} must be smaller than chunk_size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(EngineError::InvalidParameter(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if self.capability_timeout_secs == 0 {
            return Err(EngineError::InvalidParameter(
                "capability_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn capability_timeout(&self) -> Duration {
        Duration::from_secs(self.capability_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn overlap_equal_to_size_is_rejected() {
        let config = EngineConfig {
            chunk_size: 100,
            chunk_overlap: 100,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn zero_top_k_is_rejected() {
        let config = EngineConfig {
            top_k: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(EngineError::InvalidParameter(_))
        ));
    }

    #[test]
    fn partial_config_fills_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let config: EngineConfig = serde_json::from_str(r#"{"top_k": 7}"#)?;
        assert_eq!(config.top_k, 7);
        assert_eq!(config.chunk_size, 1_000);
        assert_eq!(config.chunk_overlap, 200);
        Ok(())
    }

    #[test]
    fn only_needs_permission_is_non_terminal() {
        assert!(!AnswerState::NeedsPermission.is_terminal());
        assert!(AnswerState::Grounded.is_terminal());
        assert!(AnswerState::FallbackUsed.is_terminal());
        assert!(AnswerState::FallbackDenied.is_terminal());
    }
}
