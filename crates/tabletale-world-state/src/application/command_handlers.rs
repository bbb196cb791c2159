//! Commits a resolution against the latest session record.

use tabletale_core::error::DomainError;
use tabletale_session::application::query_handlers::require_state;
use tabletale_session::domain::state::SessionState;
use tabletale_session::repository::SessionStateStore;
use tracing::info;
use uuid::Uuid;

use crate::domain::merge::apply;
use crate::domain::resolution::ResolutionResult;

/// Re-reads the record, checks it is still at `expected_turn`, merges
/// `result` and writes the next record whole.
///
/// # Errors
///
/// Returns `DomainError::StateNotFound` if the record cannot be read.
/// Returns `DomainError::Concurrency` if the turn has moved on or the
/// session is already terminal.
/// Returns the store's error if the write fails.
pub async fn commit_resolution(
    session_id: Uuid,
    expected_turn: u64,
    result: &ResolutionResult,
    store: &dyn SessionStateStore,
) -> Result<SessionState, DomainError> {
    let latest = require_state(session_id, store).await?;
    if latest.turn_number != expected_turn {
        return Err(DomainError::Concurrency {
            session_id,
            reason: format!(
                "turn moved from {expected_turn} to {} during resolution",
                latest.turn_number
            ),
        });
    }
    if latest.terminal {
        return Err(DomainError::Concurrency {
            session_id,
            reason: "session became terminal during resolution".to_owned(),
        });
    }

    let next = apply(&latest, result);
    store.set(session_id, &next).await?;
    info!(
        %session_id,
        turn_number = next.turn_number,
        terminal = next.terminal,
        "resolution committed"
    );
    Ok(next)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;
    use tabletale_core::error::DomainError;
    use tabletale_session::domain::state::SessionState;
    use tabletale_session::memory::InMemorySessionStore;
    use tabletale_session::repository::SessionStateStore;
    use tabletale_test_support::FixedClock;
    use uuid::Uuid;

    use crate::application::command_handlers::commit_resolution;
    use crate::domain::resolution::ResolutionResult;

    fn cache() -> InMemorySessionStore {
        InMemorySessionStore::new(Duration::hours(1), Arc::new(FixedClock::default()))
    }

    #[tokio::test]
    async fn test_commit_resolution_writes_next_turn() {
        // Arrange
        let store = cache();
        let id = Uuid::new_v4();
        store.set(id, &SessionState::new(id)).await.unwrap();

        // Act
        let next = commit_resolution(id, 0, &ResolutionResult::default(), &store)
            .await
            .unwrap();

        // Assert
        assert_eq!(next.turn_number, 1);
        assert_eq!(store.get(id).await.unwrap().unwrap().turn_number, 1);
    }

    #[tokio::test]
    async fn test_commit_resolution_rejects_stale_turn() {
        // Arrange
        let store = cache();
        let id = Uuid::new_v4();
        let mut state = SessionState::new(id);
        state.turn_number = 2;
        store.set(id, &state).await.unwrap();

        // Act
        let result = commit_resolution(id, 1, &ResolutionResult::default(), &store).await;

        // Assert
        assert!(matches!(result, Err(DomainError::Concurrency { .. })));
        assert_eq!(store.get(id).await.unwrap().unwrap().turn_number, 2);
    }

    #[tokio::test]
    async fn test_commit_resolution_rejects_terminal_session() {
        let store = cache();
        let id = Uuid::new_v4();
        let mut state = SessionState::new(id);
        state.terminal = true;
        store.set(id, &state).await.unwrap();

        let result = commit_resolution(id, 0, &ResolutionResult::default(), &store).await;

        assert!(matches!(result, Err(DomainError::Concurrency { .. })));
    }

    #[tokio::test]
    async fn test_commit_resolution_missing_session_is_not_found() {
        let store = cache();

        let result =
            commit_resolution(Uuid::new_v4(), 0, &ResolutionResult::default(), &store).await;

        assert!(matches!(result, Err(DomainError::StateNotFound(_))));
    }
}
