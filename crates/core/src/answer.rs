//! Grounded-versus-fallback answer decision.
//!
//! ```text
//! retrieval ──► context empty ──────────────────────────────► NeedsPermission
//!          └──► grounded generation ─► answer ──────────────► Grounded
//!                                  └─► sentinel | failure ──► NeedsPermission
//! NeedsPermission ─► permission granted ─► unconstrained ───► FallbackUsed
//!                 └─► not granted (no generation call) ─────► FallbackDenied
//! ```

use crate::retrieval::is_meaningful;
use crate::traits::{GroundedGenerator, UnconstrainedGenerator};
use crate::{
    AnswerOutcome, AnswerState, EngineError, RetrievalResult, FALLBACK_DENIED_MESSAGE,
    NOT_IN_CONTEXT_SENTINEL,
};
use regex::Regex;
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

/// What the grounded step produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GroundedReply {
    NoContext,
    Answer(String),
    NotInContext,
    Failed(String),
}

impl GroundedReply {
    pub fn from_generation(generated: Result<String, EngineError>) -> Self {
        match generated {
            Ok(text) if text == NOT_IN_CONTEXT_SENTINEL => Self::NotInContext,
            Ok(text) => Self::Answer(text),
            Err(error) => Self::Failed(error.to_string()),
        }
    }
}

/// First transition: only a real grounded answer terminates here.
pub fn after_grounded(reply: &GroundedReply) -> AnswerState {
    match reply {
        GroundedReply::Answer(_) => AnswerState::Grounded,
        _ => AnswerState::NeedsPermission,
    }
}

/// Second transition, taken from `NeedsPermission` only.
pub fn after_permission(permission_granted: bool) -> AnswerState {
    if permission_granted {
        AnswerState::FallbackUsed
    } else {
        AnswerState::FallbackDenied
    }
}

pub struct AnswerSynthesizer {
    newlines: Regex,
    min_chunk_chars: usize,
    timeout: Duration,
}

impl AnswerSynthesizer {
    pub fn new(min_chunk_chars: usize, timeout: Duration) -> Result<Self, EngineError> {
        Ok(Self {
            newlines: Regex::new(r"\r\n|\n|\r")?,
            min_chunk_chars,
            timeout,
        })
    }

    /// Joins meaningful hit texts with single spaces, newlines flattened.
    pub fn assemble_context(&self, retrieval: &RetrievalResult) -> String {
        retrieval
            .hits
            .iter()
            .filter(|hit| is_meaningful(&hit.chunk.text, self.min_chunk_chars))
            .map(|hit| self.newlines.replace_all(&hit.chunk.text, " ").trim().to_string())
            .filter(|text| !text.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub async fn synthesize(
        &self,
        question: &str,
        retrieval: &RetrievalResult,
        permission_granted: bool,
        grounded: &dyn GroundedGenerator,
        unconstrained: &dyn UnconstrainedGenerator,
    ) -> Result<AnswerOutcome, EngineError> {
        let context = self.assemble_context(retrieval);

        let reply = if context.is_empty() {
            GroundedReply::NoContext
        } else {
            let generated = self
                .bounded(grounded.generate_grounded(&context, question))
                .await;
            GroundedReply::from_generation(generated)
        };

        if let GroundedReply::Failed(reason) = &reply {
            warn!(%reason, "grounded generation failed, treating as no grounded answer");
        }

        let state = match after_grounded(&reply) {
            AnswerState::NeedsPermission => after_permission(permission_granted),
            terminal => terminal,
        };

        let answer = match (state, reply) {
            (AnswerState::Grounded, GroundedReply::Answer(answer)) => answer,
            (AnswerState::FallbackUsed, _) => {
                info!("using unconstrained fallback generation");
                self.bounded(unconstrained.generate_unconstrained(question))
                    .await?
            }
            _ => FALLBACK_DENIED_MESSAGE.to_string(),
        };

        info!(state = ?state, "answer resolved");
        Ok(AnswerOutcome { state, answer })
    }

    async fn bounded<F>(&self, call: F) -> Result<String, EngineError>
    where
        F: Future<Output = Result<String, EngineError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(EngineError::Generation(reason))) => Err(EngineError::Generation(reason)),
            Ok(Err(error)) => Err(EngineError::Generation(error.to_string())),
            Err(_) => Err(EngineError::Generation(format!(
                "generation timed out after {:?}",
                self.timeout
            ))),
        }
    }
}
