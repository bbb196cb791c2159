//! Per-session single-flight resolution.
//!
//! Writers (submissions, session teardown) and a resolution exclude each
//! other per session. A writer holds its permit from the in-flight check
//! through the store write, and a resolution waits for running writers to
//! finish before it snapshots, so no accepted contribution lands after the
//! snapshot.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tabletale_core::error::DomainError;
use tokio::sync::Notify;
use uuid::Uuid;

#[derive(Debug, Default)]
struct Slot {
    resolving: bool,
    writers: usize,
}

#[derive(Debug, Default)]
struct Inner {
    slots: Mutex<HashMap<Uuid, Slot>>,
    drained: Notify,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Tracks which sessions have a resolution in flight or a write running.
#[derive(Debug, Clone, Default)]
pub struct ResolutionGuard {
    inner: Arc<Inner>,
}

impl ResolutionGuard {
    /// Creates a guard with nothing in flight.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims the session for a resolution, then waits for running writers.
    ///
    /// New writers are refused as soon as the claim is made. Dropping the
    /// returned future releases the claim.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Concurrency` if another resolution holds the
    /// session.
    pub async fn acquire(&self, session_id: Uuid) -> Result<ResolutionLease, DomainError> {
        {
            let mut slots = self.inner.lock();
            let slot = slots.entry(session_id).or_default();
            if slot.resolving {
                return Err(DomainError::Concurrency {
                    session_id,
                    reason: "a resolution is already in flight".to_owned(),
                });
            }
            slot.resolving = true;
        }
        let lease = ResolutionLease {
            inner: Arc::clone(&self.inner),
            session_id,
        };

        loop {
            let drained = self.inner.drained.notified();
            tokio::pin!(drained);
            drained.as_mut().enable();
            if self.writers(session_id) == 0 {
                return Ok(lease);
            }
            drained.await;
        }
    }

    /// Admits one writer unless a resolution holds the session.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Concurrency` while a resolution is in flight.
    pub fn try_write(&self, session_id: Uuid) -> Result<WritePermit, DomainError> {
        let mut slots = self.inner.lock();
        let slot = slots.entry(session_id).or_default();
        if slot.resolving {
            return Err(DomainError::Concurrency {
                session_id,
                reason: "turn is being resolved; resubmit after turn_resolved".to_owned(),
            });
        }
        slot.writers += 1;
        Ok(WritePermit {
            inner: Arc::clone(&self.inner),
            session_id,
        })
    }

    /// Whether a resolution holds the session right now.
    #[must_use]
    pub fn is_in_flight(&self, session_id: Uuid) -> bool {
        self.inner
            .lock()
            .get(&session_id)
            .is_some_and(|slot| slot.resolving)
    }

    fn writers(&self, session_id: Uuid) -> usize {
        self.inner
            .lock()
            .get(&session_id)
            .map_or(0, |slot| slot.writers)
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.inner.lock().len()
    }
}

/// Proof that a resolution holds its session. Released on drop.
#[derive(Debug)]
pub struct ResolutionLease {
    inner: Arc<Inner>,
    session_id: Uuid,
}

impl ResolutionLease {
    /// The claimed session.
    #[must_use]
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }
}

impl Drop for ResolutionLease {
    fn drop(&mut self) {
        let mut slots = self.inner.lock();
        if let Some(slot) = slots.get_mut(&self.session_id) {
            slot.resolving = false;
            if slot.writers == 0 {
                slots.remove(&self.session_id);
            }
        }
    }
}

/// A running write against one session. Released on drop.
#[derive(Debug)]
pub struct WritePermit {
    inner: Arc<Inner>,
    session_id: Uuid,
}

impl Drop for WritePermit {
    fn drop(&mut self) {
        {
            let mut slots = self.inner.lock();
            if let Some(slot) = slots.get_mut(&self.session_id) {
                slot.writers = slot.writers.saturating_sub(1);
                if slot.writers == 0 && !slot.resolving {
                    slots.remove(&self.session_id);
                }
            }
        }
        self.inner.drained.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn test_second_acquire_fails_until_lease_drops() {
        let guard = ResolutionGuard::new();
        let id = Uuid::new_v4();

        let lease = guard.acquire(id).await.unwrap();
        assert!(guard.is_in_flight(id));
        assert!(matches!(
            guard.acquire(id).await,
            Err(DomainError::Concurrency { session_id, .. }) if session_id == id
        ));

        drop(lease);
        assert!(!guard.is_in_flight(id));
        assert!(guard.acquire(id).await.is_ok());
    }

    #[tokio::test]
    async fn test_sessions_do_not_block_each_other() {
        let guard = ResolutionGuard::new();
        let _a = guard.acquire(Uuid::new_v4()).await.unwrap();
        let _w = guard.try_write(Uuid::new_v4()).unwrap();
        assert!(guard.acquire(Uuid::new_v4()).await.is_ok());
    }

    #[tokio::test]
    async fn test_lease_released_on_early_return() {
        async fn failing_resolution(guard: &ResolutionGuard, id: Uuid) -> Result<(), DomainError> {
            let _lease = guard.acquire(id).await?;
            Err(DomainError::Generator("boom".to_owned()))
        }

        let guard = ResolutionGuard::new();
        let id = Uuid::new_v4();

        assert!(failing_resolution(&guard, id).await.is_err());
        assert!(!guard.is_in_flight(id));
        assert_eq!(guard.tracked(), 0);
    }

    #[tokio::test]
    async fn test_writes_are_refused_while_resolving() {
        let guard = ResolutionGuard::new();
        let id = Uuid::new_v4();

        let lease = guard.acquire(id).await.unwrap();
        assert!(matches!(
            guard.try_write(id),
            Err(DomainError::Concurrency { .. })
        ));

        drop(lease);
        assert!(guard.try_write(id).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolution_waits_for_running_writer() {
        let guard = ResolutionGuard::new();
        let id = Uuid::new_v4();
        let permit = guard.try_write(id).unwrap();

        let waiting = {
            let guard = guard.clone();
            tokio::spawn(async move { guard.acquire(id).await.map(|lease| lease.session_id()) })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(!waiting.is_finished());
        assert!(guard.is_in_flight(id));
        assert!(guard.try_write(id).is_err());

        drop(permit);
        assert_eq!(waiting.await.unwrap().unwrap(), id);
        assert_eq!(guard.tracked(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_acquire_releases_the_claim() {
        let guard = ResolutionGuard::new();
        let id = Uuid::new_v4();
        let permit = guard.try_write(id).unwrap();

        let attempt = tokio::time::timeout(Duration::from_millis(5), guard.acquire(id)).await;
        assert!(attempt.is_err());
        assert!(!guard.is_in_flight(id));

        drop(permit);
        assert_eq!(guard.tracked(), 0);
    }
}
