use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("text extraction failed: {0}")]
    Extraction(String),

    #[error("document produced no content: {0}")]
    NoContent(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("an ingestion is already in progress for this index slot")]
    IngestionInProgress,

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),
}

impl EngineError {
    /// Only the ingestion guard is worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::IngestionInProgress)
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::EngineError;

    #[test]
    fn only_ingestion_guard_is_retryable() {
        assert!(EngineError::IngestionInProgress.is_retryable());
        assert!(!EngineError::IndexUnavailable("missing".to_string()).is_retryable());
        assert!(!EngineError::DimensionMismatch {
            expected: 4,
            actual: 8
        }
        .is_retryable());
    }

    #[test]
    fn dimension_mismatch_message_names_both_sides() {
        let message = EngineError::DimensionMismatch {
            expected: 128,
            actual: 64,
        }
        .to_string();
        assert!(message.contains("128"));
        assert!(message.contains("64"));
    }
}
