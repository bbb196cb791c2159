//! Domain error types.

use thiserror::Error;
use uuid::Uuid;

/// Top-level domain error type.
///
/// Every failure surfaced to a caller carries one of these kinds plus a short
/// message. None of them leave a session half-advanced.
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    /// A malformed contribution, unknown participant, or otherwise invalid input.
    #[error("validation error: {0}")]
    Validation(String),

    /// The session is missing, expired, or its store could not be reached.
    #[error("session state not found: {0}")]
    StateNotFound(Uuid),

    /// The narrative generator failed, errored, or timed out.
    #[error("narrative generator error: {0}")]
    Generator(String),

    /// Generator output could not be normalized into a resolution.
    #[error("schema error: {0}")]
    Schema(String),

    /// A resolution is already in flight, or the session moved underneath us.
    #[error("concurrency conflict on session {session_id}: {reason}")]
    Concurrency {
        /// The session that had the conflict.
        session_id: Uuid,
        /// What collided.
        reason: String,
    },

    /// An infrastructure/persistence error.
    #[error("infrastructure error: {0}")]
    Infrastructure(String),
}

impl DomainError {
    /// Machine-readable name of the error kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::StateNotFound(_) => "state_not_found",
            Self::Generator(_) => "generator_error",
            Self::Schema(_) => "schema_error",
            Self::Concurrency { .. } => "concurrency_error",
            Self::Infrastructure(_) => "infrastructure_error",
        }
    }

    /// Whether the same turn can be retried without participants resubmitting.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Generator(_) | Self::Schema(_) | Self::Concurrency { .. }
        )
    }
}
