//! In-process store implementations.
//!
//! The `Mutex` guards are only held for the synchronous map access and are
//! never carried across an await point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tabletale_core::clock::Clock;
use tabletale_core::error::DomainError;
use uuid::Uuid;

use crate::domain::state::SessionState;
use crate::repository::{PersistentStore, SessionStateStore};

/// Default lifetime of a cached session record.
pub const DEFAULT_SESSION_TTL_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
struct CachedState {
    state: SessionState,
    expires_at: DateTime<Utc>,
}

fn lock<T>(mutex: &Mutex<T>) -> Result<MutexGuard<'_, T>, DomainError> {
    mutex
        .lock()
        .map_err(|e| DomainError::Infrastructure(format!("store mutex poisoned: {e}")))
}

/// Process-local session cache with per-entry expiry.
pub struct InMemorySessionStore {
    entries: Mutex<HashMap<Uuid, CachedState>>,
    evicted: Mutex<Vec<Uuid>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for InMemorySessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemorySessionStore")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl InMemorySessionStore {
    /// Creates an empty store whose entries live for `ttl` after each write.
    #[must_use]
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            evicted: Mutex::new(Vec::new()),
            ttl,
            clock,
        }
    }
}

#[async_trait]
impl SessionStateStore for InMemorySessionStore {
    async fn get(&self, session_id: Uuid) -> Result<Option<SessionState>, DomainError> {
        let now = self.clock.now();
        {
            let mut entries = lock(&self.entries)?;
            match entries.get(&session_id) {
                Some(cached) if cached.expires_at > now => return Ok(Some(cached.state.clone())),
                Some(_) => {
                    entries.remove(&session_id);
                }
                None => return Ok(None),
            }
        }
        lock(&self.evicted)?.push(session_id);
        tracing::debug!(%session_id, "evicted expired session record");
        Ok(None)
    }

    async fn set(&self, session_id: Uuid, state: &SessionState) -> Result<(), DomainError> {
        let expires_at = self.clock.now() + self.ttl;
        lock(&self.entries)?.insert(
            session_id,
            CachedState {
                state: state.clone(),
                expires_at,
            },
        );
        Ok(())
    }

    async fn remove(&self, session_id: Uuid) -> Result<(), DomainError> {
        lock(&self.entries)?.remove(&session_id);
        Ok(())
    }

    async fn purge_expired(&self) -> Result<Vec<Uuid>, DomainError> {
        let now = self.clock.now();
        let mut purged = std::mem::take(&mut *lock(&self.evicted)?);
        lock(&self.entries)?.retain(|session_id, cached| {
            let live = cached.expires_at > now;
            if !live {
                purged.push(*session_id);
            }
            live
        });
        Ok(purged)
    }
}

/// No durable fallback: loads always miss and saves are dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullPersistentStore;

#[async_trait]
impl PersistentStore for NullPersistentStore {
    async fn load(&self, _session_id: Uuid) -> Result<Option<SessionState>, DomainError> {
        Ok(None)
    }

    async fn save(&self, _state: &SessionState) -> Result<(), DomainError> {
        Ok(())
    }
}

/// Durable-store stand-in that keeps snapshots for the life of the process.
#[derive(Debug, Default)]
pub struct InMemoryPersistentStore {
    snapshots: Mutex<HashMap<Uuid, SessionState>>,
}

impl InMemoryPersistentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistentStore for InMemoryPersistentStore {
    async fn load(&self, session_id: Uuid) -> Result<Option<SessionState>, DomainError> {
        Ok(lock(&self.snapshots)?.get(&session_id).cloned())
    }

    async fn save(&self, state: &SessionState) -> Result<(), DomainError> {
        lock(&self.snapshots)?.insert(state.session_id, state.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabletale_test_support::{SteppingClock, fixed_time};

    fn store_with_clock(ttl_secs: i64) -> (InMemorySessionStore, Arc<SteppingClock>) {
        let clock = Arc::new(SteppingClock::new(fixed_time()));
        let store = InMemorySessionStore::new(Duration::seconds(ttl_secs), clock.clone());
        (store, clock)
    }

    #[tokio::test]
    async fn test_get_returns_none_for_unknown_session() {
        let (store, _) = store_with_clock(60);
        assert!(store.get(Uuid::new_v4()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_then_get_returns_whole_record() {
        let (store, _) = store_with_clock(60);
        let id = Uuid::new_v4();
        let mut state = SessionState::new(id);
        state.turn_number = 4;

        store.set(id, &state).await.unwrap();

        assert_eq!(store.get(id).await.unwrap(), Some(state));
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let (store, clock) = store_with_clock(60);
        let id = Uuid::new_v4();
        store.set(id, &SessionState::new(id)).await.unwrap();

        clock.advance(Duration::seconds(59));
        assert!(store.get(id).await.unwrap().is_some());

        clock.advance(Duration::seconds(1));
        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_refreshes_expiry() {
        let (store, clock) = store_with_clock(60);
        let id = Uuid::new_v4();
        let state = SessionState::new(id);
        store.set(id, &state).await.unwrap();

        clock.advance(Duration::seconds(45));
        store.set(id, &state).await.unwrap();
        clock.advance(Duration::seconds(45));

        assert!(store.get(id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_purge_expired_removes_only_stale_entries() {
        let (store, clock) = store_with_clock(60);
        let stale = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        store.set(stale, &SessionState::new(stale)).await.unwrap();
        clock.advance(Duration::seconds(30));
        store.set(fresh, &SessionState::new(fresh)).await.unwrap();
        clock.advance(Duration::seconds(31));

        assert_eq!(store.purge_expired().await.unwrap(), vec![stale]);
        assert!(store.get(fresh).await.unwrap().is_some());
        assert!(store.purge_expired().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_purge_reports_records_evicted_on_read() {
        let (store, clock) = store_with_clock(60);
        let id = Uuid::new_v4();
        store.set(id, &SessionState::new(id)).await.unwrap();
        clock.advance(Duration::seconds(61));

        assert!(store.get(id).await.unwrap().is_none());

        assert_eq!(store.purge_expired().await.unwrap(), vec![id]);
    }

    #[tokio::test]
    async fn test_remove_drops_record() {
        let (store, _) = store_with_clock(60);
        let id = Uuid::new_v4();
        store.set(id, &SessionState::new(id)).await.unwrap();

        store.remove(id).await.unwrap();

        assert!(store.get(id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persistent_store_keeps_latest_snapshot() {
        let durable = InMemoryPersistentStore::new();
        let id = Uuid::new_v4();
        let mut state = SessionState::new(id);
        durable.save(&state).await.unwrap();
        state.turn_number = 2;
        durable.save(&state).await.unwrap();

        let loaded = durable.load(id).await.unwrap().unwrap();
        assert_eq!(loaded.turn_number, 2);
    }

    #[tokio::test]
    async fn test_null_store_never_returns_a_snapshot() {
        let id = Uuid::new_v4();
        NullPersistentStore.save(&SessionState::new(id)).await.unwrap();
        assert!(NullPersistentStore.load(id).await.unwrap().is_none());
    }
}
