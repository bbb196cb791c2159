//! Storage ports for session state.

use async_trait::async_trait;
use tabletale_core::error::DomainError;
use uuid::Uuid;

use crate::domain::state::SessionState;

/// Keyed, whole-record cache of live session state, with expiry.
///
/// There are no field-level updates: writers read the latest record,
/// compute the next one, and write it back whole.
#[async_trait]
pub trait SessionStateStore: Send + Sync {
    /// Reads a session record. `Ok(None)` on a miss or an expired entry.
    async fn get(&self, session_id: Uuid) -> Result<Option<SessionState>, DomainError>;

    /// Overwrites the whole record and refreshes its expiry.
    async fn set(&self, session_id: Uuid, state: &SessionState) -> Result<(), DomainError>;

    /// Drops the record.
    async fn remove(&self, session_id: Uuid) -> Result<(), DomainError>;

    /// Sweeps expired records. Returns every id that expired since the last
    /// sweep, including ones already evicted on read.
    async fn purge_expired(&self) -> Result<Vec<Uuid>, DomainError>;
}

/// Durable fallback consulted on a cache miss.
#[async_trait]
pub trait PersistentStore: Send + Sync {
    /// Loads the last saved record for a session.
    async fn load(&self, session_id: Uuid) -> Result<Option<SessionState>, DomainError>;

    /// Saves the record, replacing any earlier snapshot.
    async fn save(&self, state: &SessionState) -> Result<(), DomainError>;
}
