//! The d20 stat check.

use std::fmt;

use serde::{Deserialize, Serialize};
use tabletale_core::error::DomainError;
use tabletale_core::rng::DeterministicRng;
use tabletale_session::domain::contribution::Contribution;
use tabletale_session::domain::state::{DifficultyTier, PartyMember};

/// Faces on the check die.
pub const DIE_FACES: u32 = 20;

/// Outcome grade of a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grade {
    /// Natural 20.
    CriticalSuccess,
    /// Total met the difficulty class.
    Success,
    /// Total fell short.
    Failure,
    /// Natural 1.
    CriticalFailure,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::CriticalSuccess => "critical success",
            Self::Success => "success",
            Self::Failure => "failure",
            Self::CriticalFailure => "critical failure",
        };
        f.write_str(label)
    }
}

/// The graded result of one check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgementResult {
    /// Who acted.
    pub participant_id: String,
    /// Die value in `1..=20`.
    pub dice: u32,
    /// The actor's value for the applied stat.
    pub stat_value: i32,
    /// Flat modifier of the action.
    pub modifier: i32,
    /// `dice + stat_value + modifier`.
    pub total: i32,
    /// Target number for the session's tier.
    pub difficulty_class: i32,
    /// Outcome grade.
    pub grade: Grade,
}

/// A contribution together with its judgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgedContribution {
    /// What was submitted.
    pub contribution: Contribution,
    /// How it was judged.
    pub judgement: JudgementResult,
}

/// Difficulty class for a tier; unrecognized tiers fall back to 10.
#[must_use]
pub fn difficulty_class(tier: DifficultyTier) -> i32 {
    match tier {
        DifficultyTier::Beginner | DifficultyTier::Unrecognized => 10,
        DifficultyTier::Intermediate => 13,
        DifficultyTier::Advanced => 16,
    }
}

/// Grades a check. Natural 20 and natural 1 win over the total.
#[must_use]
pub fn determine_grade(dice: u32, total: i32, difficulty_class: i32) -> Grade {
    if dice == DIE_FACES {
        Grade::CriticalSuccess
    } else if dice == 1 {
        Grade::CriticalFailure
    } else if total >= difficulty_class {
        Grade::Success
    } else {
        Grade::Failure
    }
}

/// Judges one action by `actor`.
///
/// Draws the die from `rng` unless `pinned` supplies it.
///
/// # Errors
///
/// Returns `DomainError::Validation` if `pinned` lies outside `1..=20`.
pub fn evaluate(
    actor: &PartyMember,
    applied_stat: &str,
    modifier: i32,
    tier: DifficultyTier,
    pinned: Option<u32>,
    rng: &mut dyn DeterministicRng,
) -> Result<JudgementResult, DomainError> {
    let dice = match pinned {
        Some(value) if (1..=DIE_FACES).contains(&value) => value,
        Some(value) => {
            return Err(DomainError::Validation(format!(
                "pinned dice {value} is outside 1..={DIE_FACES}"
            )));
        }
        None => rng.next_u32_range(1, DIE_FACES),
    };
    let stat_value = actor.sheet.stat(applied_stat);
    // dice is at most 20, so the cast cannot wrap.
    #[allow(clippy::cast_possible_wrap)]
    let total = (dice as i32)
        .saturating_add(stat_value)
        .saturating_add(modifier);
    let difficulty_class = difficulty_class(tier);

    Ok(JudgementResult {
        participant_id: actor.id.clone(),
        dice,
        stat_value,
        modifier,
        total,
        difficulty_class,
        grade: determine_grade(dice, total, difficulty_class),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabletale_session::domain::state::CharacterSheet;
    use tabletale_test_support::{MockRng, SequenceRng};

    fn actor_with(stat: &str, value: i32) -> PartyMember {
        let mut sheet = CharacterSheet::default();
        sheet.stats.insert(stat.to_owned(), value);
        PartyMember {
            id: "p1".to_owned(),
            name: "Ilse".to_owned(),
            role: "scout".to_owned(),
            sheet,
            memory: String::new(),
        }
    }

    #[test]
    fn test_difficulty_class_table() {
        assert_eq!(difficulty_class(DifficultyTier::Beginner), 10);
        assert_eq!(difficulty_class(DifficultyTier::Intermediate), 13);
        assert_eq!(difficulty_class(DifficultyTier::Advanced), 16);
        assert_eq!(difficulty_class(DifficultyTier::Unrecognized), 10);
    }

    #[test]
    fn test_natural_20_is_critical_success_even_below_dc() {
        let actor = actor_with("strength", -10);
        let mut rng = SequenceRng::new(vec![20]);

        let result = evaluate(
            &actor,
            "strength",
            -5,
            DifficultyTier::Advanced,
            None,
            &mut rng,
        )
        .unwrap();

        assert_eq!(result.dice, 20);
        assert_eq!(result.total, 5);
        assert_eq!(result.grade, Grade::CriticalSuccess);
    }

    #[test]
    fn test_natural_1_is_critical_failure_even_above_dc() {
        let actor = actor_with("strength", 30);
        let mut rng = SequenceRng::new(vec![1]);

        let result = evaluate(
            &actor,
            "strength",
            0,
            DifficultyTier::Beginner,
            None,
            &mut rng,
        )
        .unwrap();

        assert_eq!(result.total, 31);
        assert_eq!(result.grade, Grade::CriticalFailure);
    }

    #[test]
    fn test_total_meeting_intermediate_dc_is_success() {
        let actor = actor_with("dexterity", 5);
        let mut rng = SequenceRng::new(vec![10]);

        let result = evaluate(
            &actor,
            "dexterity",
            0,
            DifficultyTier::Intermediate,
            None,
            &mut rng,
        )
        .unwrap();

        assert_eq!(result.stat_value, 5);
        assert_eq!(result.total, 15);
        assert_eq!(result.difficulty_class, 13);
        assert_eq!(result.grade, Grade::Success);
    }

    #[test]
    fn test_missing_stat_counts_as_zero_and_fails() {
        let actor = actor_with("dexterity", 5);
        let mut rng = SequenceRng::new(vec![2]);

        let result = evaluate(
            &actor,
            "charisma",
            0,
            DifficultyTier::Beginner,
            None,
            &mut rng,
        )
        .unwrap();

        assert_eq!(result.stat_value, 0);
        assert_eq!(result.total, 2);
        assert_eq!(result.grade, Grade::Failure);
    }

    #[test]
    fn test_pinned_dice_skips_the_rng() {
        let actor = actor_with("wits", 1);
        let mut rng = SequenceRng::new(vec![]);

        let result = evaluate(
            &actor,
            "wits",
            2,
            DifficultyTier::Intermediate,
            Some(10),
            &mut rng,
        )
        .unwrap();

        assert_eq!(rng.draws(), 0);
        assert_eq!(result.total, 13);
        assert_eq!(result.grade, Grade::Success);
    }

    #[test]
    fn test_extreme_modifier_saturates_instead_of_overflowing() {
        let actor = actor_with("strength", i32::MAX);
        let mut rng = SequenceRng::new(vec![12]);

        let result = evaluate(
            &actor,
            "strength",
            i32::MAX,
            DifficultyTier::Advanced,
            None,
            &mut rng,
        )
        .unwrap();

        assert_eq!(result.total, i32::MAX);
        assert_eq!(result.grade, Grade::Success);

        let mut rng = SequenceRng::new(vec![12]);
        let result = evaluate(
            &actor_with("strength", i32::MIN),
            "strength",
            i32::MIN,
            DifficultyTier::Beginner,
            None,
            &mut rng,
        )
        .unwrap();

        assert_eq!(result.total, i32::MIN);
        assert_eq!(result.grade, Grade::Failure);
    }

    #[test]
    fn test_pinned_dice_out_of_range_is_validation_error() {
        let actor = actor_with("wits", 1);

        for pinned in [0, 21] {
            let result = evaluate(
                &actor,
                "wits",
                0,
                DifficultyTier::Beginner,
                Some(pinned),
                &mut MockRng,
            );
            assert!(matches!(result, Err(DomainError::Validation(_))));
        }
    }

    #[test]
    fn test_grade_serializes_snake_case() {
        assert_eq!(
            serde_json::to_value(Grade::CriticalFailure).unwrap(),
            serde_json::json!("critical_failure")
        );
    }
}
