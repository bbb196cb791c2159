//! Storage port for turn buckets.

use async_trait::async_trait;
use tabletale_core::error::DomainError;
use tabletale_session::domain::contribution::Contribution;
use uuid::Uuid;

use crate::domain::bucket::TurnBucket;

/// Per-session contribution buckets.
///
/// Implementations apply [`TurnBucket::accept`] atomically per session.
#[async_trait]
pub trait ContributionStore: Send + Sync {
    /// Stores one contribution for `turn_number`.
    async fn put(
        &self,
        session_id: Uuid,
        turn_number: u64,
        contribution: Contribution,
    ) -> Result<(), DomainError>;

    /// The session's current bucket, if any.
    async fn bucket(&self, session_id: Uuid) -> Result<Option<TurnBucket>, DomainError>;

    /// Drops the session's bucket unconditionally.
    async fn clear(&self, session_id: Uuid) -> Result<(), DomainError>;

    /// Drops the bucket only if it still belongs to `turn_number`.
    /// Returns whether anything was dropped.
    async fn clear_turn(&self, session_id: Uuid, turn_number: u64) -> Result<bool, DomainError>;
}
