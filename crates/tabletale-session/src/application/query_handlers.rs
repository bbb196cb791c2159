//! Query handlers for the Session state context.
//!
//! Reads go to the cache first and fall back to the durable store on a
//! miss; a recovered record is written back to the cache.

use tabletale_core::error::DomainError;
use tracing::warn;
use uuid::Uuid;

use crate::domain::state::SessionState;
use crate::repository::{PersistentStore, SessionStateStore};

/// Reads a session from the cache only.
///
/// A miss and a store failure both surface as `StateNotFound`; the failure
/// is logged.
///
/// # Errors
///
/// Returns `DomainError::StateNotFound` when no record can be read.
pub async fn require_state(
    session_id: Uuid,
    store: &dyn SessionStateStore,
) -> Result<SessionState, DomainError> {
    match store.get(session_id).await {
        Ok(Some(state)) => Ok(state),
        Ok(None) => Err(DomainError::StateNotFound(session_id)),
        Err(e) => {
            warn!(%session_id, error = %e, "session cache read failed");
            Err(DomainError::StateNotFound(session_id))
        }
    }
}

/// Reads a session from the cache, falling back to the durable store.
///
/// # Errors
///
/// Returns `DomainError::StateNotFound` when neither store has the session.
/// Returns the cache's error if writing the recovered record back fails.
pub async fn recover_state(
    session_id: Uuid,
    store: &dyn SessionStateStore,
    durable: &dyn PersistentStore,
) -> Result<SessionState, DomainError> {
    if let Some(state) = cached(session_id, store).await {
        return Ok(state);
    }
    match durable.load(session_id).await {
        Ok(Some(state)) => {
            store.set(session_id, &state).await?;
            tracing::info!(%session_id, turn = state.turn_number, "recovered session from durable store");
            Ok(state)
        }
        Ok(None) => Err(DomainError::StateNotFound(session_id)),
        Err(e) => {
            warn!(%session_id, error = %e, "durable store read failed");
            Err(DomainError::StateNotFound(session_id))
        }
    }
}

/// Like [`recover_state`], but seeds and caches an empty record when no
/// store knows the session.
///
/// # Errors
///
/// Returns the cache's error if writing the record fails.
pub async fn load_or_seed(
    session_id: Uuid,
    store: &dyn SessionStateStore,
    durable: &dyn PersistentStore,
) -> Result<SessionState, DomainError> {
    match recover_state(session_id, store, durable).await {
        Ok(state) => Ok(state),
        Err(DomainError::StateNotFound(_)) => {
            let state = SessionState::new(session_id);
            store.set(session_id, &state).await?;
            Ok(state)
        }
        Err(e) => Err(e),
    }
}

async fn cached(session_id: Uuid, store: &dyn SessionStateStore) -> Option<SessionState> {
    match store.get(session_id).await {
        Ok(state) => state,
        Err(e) => {
            warn!(%session_id, error = %e, "session cache read failed");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use tabletale_core::error::DomainError;
    use tabletale_test_support::FixedClock;
    use uuid::Uuid;

    use crate::application::query_handlers::{load_or_seed, recover_state, require_state};
    use crate::domain::state::SessionState;
    use crate::memory::{InMemoryPersistentStore, InMemorySessionStore};
    use crate::repository::{PersistentStore, SessionStateStore};

    fn cache() -> InMemorySessionStore {
        InMemorySessionStore::new(Duration::hours(1), Arc::new(FixedClock::default()))
    }

    #[tokio::test]
    async fn test_require_state_returns_not_found_on_miss() {
        // Arrange
        let store = cache();
        let id = Uuid::new_v4();

        // Act
        let result = require_state(id, &store).await;

        // Assert
        assert!(matches!(result, Err(DomainError::StateNotFound(missing)) if missing == id));
    }

    #[tokio::test]
    async fn test_recover_state_prefers_cache() {
        // Arrange
        let store = cache();
        let durable = InMemoryPersistentStore::new();
        let id = Uuid::new_v4();
        let mut cached = SessionState::new(id);
        cached.turn_number = 3;
        store.set(id, &cached).await.unwrap();
        durable.save(&SessionState::new(id)).await.unwrap();

        // Act
        let state = recover_state(id, &store, &durable).await.unwrap();

        // Assert
        assert_eq!(state.turn_number, 3);
    }

    #[tokio::test]
    async fn test_recover_state_falls_back_to_durable_and_recaches() {
        // Arrange
        let store = cache();
        let durable = InMemoryPersistentStore::new();
        let id = Uuid::new_v4();
        let mut saved = SessionState::new(id);
        saved.turn_number = 5;
        durable.save(&saved).await.unwrap();

        // Act
        let state = recover_state(id, &store, &durable).await.unwrap();

        // Assert
        assert_eq!(state.turn_number, 5);
        assert_eq!(store.get(id).await.unwrap(), Some(saved));
    }

    #[tokio::test]
    async fn test_recover_state_not_found_anywhere() {
        let store = cache();
        let durable = InMemoryPersistentStore::new();

        let result = recover_state(Uuid::new_v4(), &store, &durable).await;

        assert!(matches!(result, Err(DomainError::StateNotFound(_))));
    }

    #[tokio::test]
    async fn test_load_or_seed_creates_empty_record() {
        // Arrange
        let store = cache();
        let durable = InMemoryPersistentStore::new();
        let id = Uuid::new_v4();

        // Act
        let state = load_or_seed(id, &store, &durable).await.unwrap();

        // Assert
        assert_eq!(state, SessionState::new(id));
        assert!(store.get(id).await.unwrap().is_some());
    }
}
