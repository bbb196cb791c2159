//! Who is currently seated at a session.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tabletale_core::error::DomainError;
use uuid::Uuid;

/// Source of the active participant set for a session.
#[async_trait]
pub trait RoomMembershipProvider: Send + Sync {
    /// Participant ids currently connected to the session.
    async fn active_participants(&self, session_id: Uuid) -> Result<Vec<String>, DomainError>;

    /// Forgets every seat at a session that no longer exists.
    async fn close(&self, session_id: Uuid) -> Result<(), DomainError>;
}

/// Membership kept in process, driven by join and leave calls.
#[derive(Debug, Default)]
pub struct InMemoryRoomMembership {
    rooms: Mutex<HashMap<Uuid, BTreeSet<String>>>,
}

impl InMemoryRoomMembership {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, BTreeSet<String>>>, DomainError> {
        self.rooms
            .lock()
            .map_err(|e| DomainError::Infrastructure(format!("membership mutex poisoned: {e}")))
    }

    /// Seats a participant. Returns false if already seated.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the registry mutex is poisoned.
    pub fn join(&self, session_id: Uuid, participant_id: &str) -> Result<bool, DomainError> {
        Ok(self
            .lock()?
            .entry(session_id)
            .or_default()
            .insert(participant_id.to_owned()))
    }

    /// Unseats a participant. Returns false if not seated.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the registry mutex is poisoned.
    pub fn leave(&self, session_id: Uuid, participant_id: &str) -> Result<bool, DomainError> {
        let mut rooms = self.lock()?;
        let Some(room) = rooms.get_mut(&session_id) else {
            return Ok(false);
        };
        let removed = room.remove(participant_id);
        if room.is_empty() {
            rooms.remove(&session_id);
        }
        Ok(removed)
    }
}

#[async_trait]
impl RoomMembershipProvider for InMemoryRoomMembership {
    async fn active_participants(&self, session_id: Uuid) -> Result<Vec<String>, DomainError> {
        Ok(self
            .lock()?
            .get(&session_id)
            .map(|room| room.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn close(&self, session_id: Uuid) -> Result<(), DomainError> {
        self.lock()?.remove(&session_id);
        Ok(())
    }
}
