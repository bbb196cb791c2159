//! Judges a whole turn's contributions against a session snapshot.

use std::collections::BTreeMap;
use std::sync::Mutex;

use tabletale_core::error::DomainError;
use tabletale_core::rng::DeterministicRng;
use tabletale_session::domain::contribution::Contribution;
use tabletale_session::domain::state::SessionState;
use tracing::debug;

use crate::domain::judgement::{JudgedContribution, evaluate};

/// Judges every contribution in participant-id order.
///
/// The RNG lock is held only for each synchronous check.
///
/// # Errors
///
/// Returns `DomainError::Validation` if a contribution names a participant
/// outside the party or pins an out-of-range die.
/// Returns `DomainError::Infrastructure` if the RNG mutex is poisoned.
pub fn judge_contributions(
    state: &SessionState,
    contributions: &BTreeMap<String, Contribution>,
    rng: &Mutex<dyn DeterministicRng>,
) -> Result<Vec<JudgedContribution>, DomainError> {
    let mut judged = Vec::with_capacity(contributions.len());
    for (participant_id, contribution) in contributions {
        let actor = state.member(participant_id).ok_or_else(|| {
            DomainError::Validation(format!(
                "participant {participant_id} is not in the party"
            ))
        })?;
        let judgement = {
            let mut rng = rng
                .lock()
                .map_err(|e| DomainError::Infrastructure(format!("rng mutex poisoned: {e}")))?;
            evaluate(
                actor,
                &contribution.applied_stat,
                contribution.stat_modifier,
                state.difficulty_tier,
                contribution.pinned_dice,
                &mut *rng,
            )?
        };
        debug!(
            session_id = %state.session_id,
            participant_id = %participant_id,
            dice = judgement.dice,
            total = judgement.total,
            grade = %judgement.grade,
            autonomous = contribution.autonomous,
            "contribution judged"
        );
        judged.push(JudgedContribution {
            contribution: contribution.clone(),
            judgement,
        });
    }
    Ok(judged)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use tabletale_core::error::DomainError;
    use tabletale_session::domain::contribution::Contribution;
    use tabletale_session::domain::state::{
        CharacterSheet, DifficultyTier, PartyMember, SessionState,
    };
    use tabletale_test_support::SequenceRng;
    use uuid::Uuid;

    use crate::application::judging::judge_contributions;
    use crate::domain::judgement::Grade;

    fn member(id: &str, dexterity: i32) -> PartyMember {
        let mut sheet = CharacterSheet::default();
        sheet.stats.insert("dexterity".to_owned(), dexterity);
        PartyMember {
            id: id.to_owned(),
            name: id.to_owned(),
            role: "scout".to_owned(),
            sheet,
            memory: String::new(),
        }
    }

    fn contribution(participant_id: &str) -> Contribution {
        Contribution {
            participant_id: participant_id.to_owned(),
            chosen_action_id: "A".to_owned(),
            applied_stat: "dexterity".to_owned(),
            stat_modifier: 0,
            choice_text: "climb".to_owned(),
            autonomous: false,
            pinned_dice: None,
        }
    }

    fn state() -> SessionState {
        let mut state = SessionState::new(Uuid::new_v4());
        state.difficulty_tier = DifficultyTier::Intermediate;
        state.party = vec![member("p1", 5), member("p2", 0)];
        state
    }

    #[test]
    fn test_judges_in_participant_order_with_shared_rng() {
        // Arrange
        let state = state();
        let contributions = BTreeMap::from([
            ("p2".to_owned(), contribution("p2")),
            ("p1".to_owned(), contribution("p1")),
        ]);
        let rng = Mutex::new(SequenceRng::new(vec![10, 2]));

        // Act
        let judged = judge_contributions(&state, &contributions, &rng).unwrap();

        // Assert
        assert_eq!(judged.len(), 2);
        assert_eq!(judged[0].judgement.participant_id, "p1");
        assert_eq!(judged[0].judgement.total, 15);
        assert_eq!(judged[0].judgement.grade, Grade::Success);
        assert_eq!(judged[1].judgement.participant_id, "p2");
        assert_eq!(judged[1].judgement.grade, Grade::Failure);
    }

    #[test]
    fn test_unknown_participant_is_validation_error() {
        let state = state();
        let contributions = BTreeMap::from([("ghost".to_owned(), contribution("ghost"))]);
        let rng = Mutex::new(SequenceRng::new(vec![10]));

        let result = judge_contributions(&state, &contributions, &rng);

        assert!(matches!(result, Err(DomainError::Validation(_))));
    }

    #[test]
    fn test_pinned_dice_make_the_turn_repeatable() {
        let state = state();
        let contributions = BTreeMap::from([(
            "p1".to_owned(),
            contribution("p1").with_pinned_dice(20),
        )]);
        let rng = Mutex::new(SequenceRng::new(vec![]));

        let judged = judge_contributions(&state, &contributions, &rng).unwrap();

        assert_eq!(judged[0].judgement.grade, Grade::CriticalSuccess);
    }
}
