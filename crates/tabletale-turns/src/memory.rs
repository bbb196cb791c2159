//! In-process contribution store.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tabletale_core::error::DomainError;
use tabletale_session::domain::contribution::Contribution;
use uuid::Uuid;

use crate::domain::bucket::TurnBucket;
use crate::repository::ContributionStore;

/// Buckets in a `HashMap`; the lock is never held across an await.
#[derive(Debug, Default)]
pub struct InMemoryContributionStore {
    buckets: Mutex<HashMap<Uuid, TurnBucket>>,
}

impl InMemoryContributionStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<Uuid, TurnBucket>>, DomainError> {
        self.buckets.lock().map_err(|e| {
            DomainError::Infrastructure(format!("contribution store mutex poisoned: {e}"))
        })
    }
}

#[async_trait]
impl ContributionStore for InMemoryContributionStore {
    async fn put(
        &self,
        session_id: Uuid,
        turn_number: u64,
        contribution: Contribution,
    ) -> Result<(), DomainError> {
        let mut buckets = self.lock()?;
        let mut slot = buckets.remove(&session_id);
        let result = TurnBucket::accept(&mut slot, turn_number, contribution);
        if let Some(bucket) = slot {
            buckets.insert(session_id, bucket);
        }
        result
    }

    async fn bucket(&self, session_id: Uuid) -> Result<Option<TurnBucket>, DomainError> {
        Ok(self.lock()?.get(&session_id).cloned())
    }

    async fn clear(&self, session_id: Uuid) -> Result<(), DomainError> {
        self.lock()?.remove(&session_id);
        Ok(())
    }

    async fn clear_turn(&self, session_id: Uuid, turn_number: u64) -> Result<bool, DomainError> {
        let mut buckets = self.lock()?;
        match buckets.get(&session_id) {
            Some(bucket) if bucket.turn_number == turn_number => {
                buckets.remove(&session_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
