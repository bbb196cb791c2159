//! The submission barrier.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tabletale_core::error::DomainError;
use tabletale_core::rng::DeterministicRng;
use tabletale_rules::domain::autonomy::synthesize_contribution;
use tabletale_session::domain::contribution::Contribution;
use tabletale_session::domain::state::SessionState;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::bucket::TurnProgress;
use crate::repository::ContributionStore;

/// Collects one contribution per participant per turn.
#[derive(Clone)]
pub struct TurnCollector {
    store: Arc<dyn ContributionStore>,
}

impl std::fmt::Debug for TurnCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnCollector").finish_non_exhaustive()
    }
}

impl TurnCollector {
    /// Creates a collector over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ContributionStore>) -> Self {
        Self { store }
    }

    /// Stores a contribution for `turn_number`; last submission wins.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if a newer turn is already open.
    pub async fn store_contribution(
        &self,
        session_id: Uuid,
        turn_number: u64,
        contribution: Contribution,
    ) -> Result<(), DomainError> {
        debug!(
            %session_id,
            turn_number,
            participant_id = %contribution.participant_id,
            action = %contribution.chosen_action_id,
            "contribution stored"
        );
        self.store.put(session_id, turn_number, contribution).await
    }

    /// Everything in the session's current bucket, whatever its turn.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the read fails.
    pub async fn get_all_contributions(
        &self,
        session_id: Uuid,
    ) -> Result<BTreeMap<String, Contribution>, DomainError> {
        Ok(self
            .store
            .bucket(session_id)
            .await?
            .map(|bucket| bucket.contributions)
            .unwrap_or_default())
    }

    /// Contributions stored for `turn_number`; empty if the bucket is
    /// missing or belongs to another turn.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the read fails.
    pub async fn snapshot(
        &self,
        session_id: Uuid,
        turn_number: u64,
    ) -> Result<BTreeMap<String, Contribution>, DomainError> {
        Ok(self
            .store
            .bucket(session_id)
            .await?
            .and_then(|bucket| bucket.for_turn(turn_number).cloned())
            .unwrap_or_default())
    }

    /// Drops the session's bucket.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the removal fails.
    pub async fn clear_contributions(&self, session_id: Uuid) -> Result<(), DomainError> {
        self.store.clear(session_id).await
    }

    /// Drops the bucket only if it still belongs to `turn_number`.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the removal fails.
    pub async fn clear_turn(&self, session_id: Uuid, turn_number: u64) -> Result<bool, DomainError> {
        self.store.clear_turn(session_id, turn_number).await
    }

    /// Submitted versus expected for `turn_number`.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the read fails.
    pub async fn progress<S: AsRef<str> + Sync>(
        &self,
        session_id: Uuid,
        turn_number: u64,
        expected: &[S],
    ) -> Result<TurnProgress, DomainError> {
        let contributions = self.snapshot(session_id, turn_number).await?;
        Ok(TurnProgress::measure(&contributions, expected))
    }

    /// True iff every id in `expected` has a contribution for `turn_number`.
    ///
    /// # Errors
    ///
    /// Returns the store's error if the read fails.
    pub async fn is_complete<S: AsRef<str> + Sync>(
        &self,
        session_id: Uuid,
        turn_number: u64,
        expected: &[S],
    ) -> Result<bool, DomainError> {
        Ok(self
            .progress(session_id, turn_number, expected)
            .await?
            .is_complete())
    }

    /// Synthesizes and stores an autonomous contribution for one seat.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if the participant is not in the
    /// party or the scene offers its role nothing.
    /// Returns `DomainError::Infrastructure` if the RNG mutex is poisoned.
    pub async fn submit_autonomous(
        &self,
        state: &SessionState,
        participant_id: &str,
        rng: &Mutex<dyn DeterministicRng>,
    ) -> Result<Contribution, DomainError> {
        let member = state.member(participant_id).ok_or_else(|| {
            DomainError::Validation(format!("participant {participant_id} is not in the party"))
        })?;
        let contribution = {
            let mut rng = lock_rng(rng)?;
            synthesize_contribution(member, &state.scene, &mut *rng)
        }
        .ok_or_else(|| {
            DomainError::Validation(format!(
                "no scene actions for role {} of {participant_id}",
                member.role
            ))
        })?;

        self.store_contribution(state.session_id, state.turn_number, contribution.clone())
            .await?;
        info!(
            session_id = %state.session_id,
            turn_number = state.turn_number,
            participant_id,
            action = %contribution.chosen_action_id,
            "autonomous contribution submitted"
        );
        Ok(contribution)
    }
}

/// Adds an autonomous contribution to `contributions` for every party member
/// that has none and whose role has scene actions. Returns the filled ids.
///
/// # Errors
///
/// Returns `DomainError::Infrastructure` if the RNG mutex is poisoned.
pub fn fill_autonomous(
    state: &SessionState,
    contributions: &mut BTreeMap<String, Contribution>,
    rng: &Mutex<dyn DeterministicRng>,
) -> Result<Vec<String>, DomainError> {
    let mut filled = Vec::new();
    for member in &state.party {
        if contributions.contains_key(&member.id) {
            continue;
        }
        let synthesized = {
            let mut rng = lock_rng(rng)?;
            synthesize_contribution(member, &state.scene, &mut *rng)
        };
        if let Some(contribution) = synthesized {
            filled.push(member.id.clone());
            contributions.insert(member.id.clone(), contribution);
        }
    }
    if !filled.is_empty() {
        debug!(session_id = %state.session_id, filled = ?filled, "autonomous actors filled");
    }
    Ok(filled)
}

fn lock_rng<'a>(
    rng: &'a Mutex<dyn DeterministicRng + 'static>,
) -> Result<MutexGuard<'a, dyn DeterministicRng + 'static>, DomainError> {
    rng.lock()
        .map_err(|e| DomainError::Infrastructure(format!("rng mutex poisoned: {e}")))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use tabletale_core::error::DomainError;
    use tabletale_session::domain::contribution::Contribution;
    use tabletale_session::domain::scene::{Scene, SceneAction};
    use tabletale_session::domain::state::{CharacterSheet, PartyMember, SessionState};
    use tabletale_test_support::SequenceRng;
    use uuid::Uuid;

    use crate::application::collector::{TurnCollector, fill_autonomous};
    use crate::domain::bucket::TurnProgress;
    use crate::memory::InMemoryContributionStore;

    fn collector() -> TurnCollector {
        TurnCollector::new(Arc::new(InMemoryContributionStore::new()))
    }

    fn contribution(participant_id: &str, action: &str) -> Contribution {
        Contribution {
            participant_id: participant_id.to_owned(),
            chosen_action_id: action.to_owned(),
            applied_stat: "wits".to_owned(),
            stat_modifier: 0,
            choice_text: format!("take {action}"),
            autonomous: false,
            pinned_dice: None,
        }
    }

    fn member(id: &str, role: &str) -> PartyMember {
        PartyMember {
            id: id.to_owned(),
            name: id.to_owned(),
            role: role.to_owned(),
            sheet: CharacterSheet::default(),
            memory: String::new(),
        }
    }

    fn state() -> SessionState {
        let mut state = SessionState::new(Uuid::new_v4());
        state.party = vec![member("p1", "scout"), member("p2", "mage")];
        let action = |id: &str| SceneAction {
            id: id.to_owned(),
            text: format!("act {id}"),
            applied_stat: "wits".to_owned(),
            stat_modifier: 0,
        };
        state.scene = Scene {
            title: "Gate".to_owned(),
            actions: BTreeMap::from([
                ("scout".to_owned(), vec![action("A"), action("B")]),
                ("mage".to_owned(), vec![action("X"), action("Y")]),
            ]),
        };
        state
    }

    #[tokio::test]
    async fn test_resubmission_is_idempotent_last_wins() {
        // Arrange
        let collector = collector();
        let id = Uuid::new_v4();

        // Act
        collector
            .store_contribution(id, 0, contribution("p1", "A"))
            .await
            .unwrap();
        collector
            .store_contribution(id, 0, contribution("p1", "B"))
            .await
            .unwrap();

        // Assert
        let all = collector.get_all_contributions(id).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all["p1"].chosen_action_id, "B");
    }

    #[tokio::test]
    async fn test_completeness_follows_shrinking_active_set() {
        // Arrange
        let collector = collector();
        let id = Uuid::new_v4();
        collector
            .store_contribution(id, 0, contribution("p1", "A"))
            .await
            .unwrap();

        // Act / Assert
        assert!(!collector.is_complete(id, 0, &["p1", "p2"]).await.unwrap());
        assert!(collector.is_complete(id, 0, &["p1"]).await.unwrap());
    }

    #[tokio::test]
    async fn test_progress_ignores_stale_bucket() {
        let collector = collector();
        let id = Uuid::new_v4();
        collector
            .store_contribution(id, 0, contribution("p1", "A"))
            .await
            .unwrap();

        let progress = collector.progress(id, 1, &["p1"]).await.unwrap();

        assert_eq!(progress, TurnProgress { submitted: 0, total: 1 });
    }

    #[tokio::test]
    async fn test_clear_turn_only_clears_matching_turn() {
        let collector = collector();
        let id = Uuid::new_v4();
        collector
            .store_contribution(id, 1, contribution("p1", "A"))
            .await
            .unwrap();

        assert!(!collector.clear_turn(id, 0).await.unwrap());
        assert!(collector.clear_turn(id, 1).await.unwrap());
        assert!(collector.get_all_contributions(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submit_autonomous_stores_synthesized_contribution() {
        // Arrange
        let collector = collector();
        let state = state();
        let rng = Mutex::new(SequenceRng::new(vec![1]));

        // Act
        let contribution = collector
            .submit_autonomous(&state, "p2", &rng)
            .await
            .unwrap();

        // Assert
        assert_eq!(contribution.chosen_action_id, "Y");
        assert!(contribution.autonomous);
        let stored = collector.snapshot(state.session_id, 0).await.unwrap();
        assert_eq!(stored["p2"], contribution);
    }

    #[tokio::test]
    async fn test_submit_autonomous_unknown_participant_is_validation_error() {
        let collector = collector();
        let rng = Mutex::new(SequenceRng::new(vec![0]));

        let result = collector.submit_autonomous(&state(), "p9", &rng).await;

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_fill_autonomous_only_fills_missing_members() {
        // Arrange
        let state = state();
        let mut contributions = BTreeMap::from([("p1".to_owned(), contribution("p1", "A"))]);
        let rng = Mutex::new(SequenceRng::new(vec![0]));

        // Act
        let filled = fill_autonomous(&state, &mut contributions, &rng).unwrap();

        // Assert
        assert_eq!(filled, vec!["p2".to_owned()]);
        assert_eq!(contributions["p1"].chosen_action_id, "A");
        assert_eq!(contributions["p2"].chosen_action_id, "X");
        assert!(contributions["p2"].autonomous);
    }
}
