//! A session's contributions for one turn.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tabletale_core::error::DomainError;
use tabletale_session::domain::contribution::Contribution;

/// Contributions stored for a single turn, keyed by participant id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnBucket {
    /// Turn the contributions belong to.
    pub turn_number: u64,
    /// One contribution per participant.
    pub contributions: BTreeMap<String, Contribution>,
}

impl TurnBucket {
    /// An empty bucket for `turn_number`.
    #[must_use]
    pub fn new(turn_number: u64) -> Self {
        Self {
            turn_number,
            contributions: BTreeMap::new(),
        }
    }

    /// Stores `contribution` for `turn_number` into `slot`.
    ///
    /// A bucket from an older turn is discarded first. A resubmission by the
    /// same participant replaces the earlier one.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `turn_number` is older than the
    /// bucket already in `slot`.
    pub fn accept(
        slot: &mut Option<Self>,
        turn_number: u64,
        contribution: Contribution,
    ) -> Result<(), DomainError> {
        match slot.as_ref().map(|b| b.turn_number) {
            Some(open) if open > turn_number => {
                return Err(DomainError::Validation(format!(
                    "contribution for turn {turn_number} arrived after turn {open} opened"
                )));
            }
            Some(open) if open == turn_number => {}
            _ => *slot = Some(Self::new(turn_number)),
        }
        slot.get_or_insert_with(|| Self::new(turn_number))
            .contributions
            .insert(contribution.participant_id.clone(), contribution);
        Ok(())
    }

    /// Contributions only if the bucket belongs to `turn_number`.
    #[must_use]
    pub fn for_turn(&self, turn_number: u64) -> Option<&BTreeMap<String, Contribution>> {
        (self.turn_number == turn_number).then_some(&self.contributions)
    }
}

/// How many expected participants have contributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnProgress {
    /// Expected participants with a stored contribution.
    pub submitted: usize,
    /// Expected participants.
    pub total: usize,
}

impl TurnProgress {
    /// Counts which of `expected` appear in `contributions`.
    #[must_use]
    pub fn measure<S: AsRef<str>>(
        contributions: &BTreeMap<String, Contribution>,
        expected: &[S],
    ) -> Self {
        let submitted = expected
            .iter()
            .filter(|id| contributions.contains_key(id.as_ref()))
            .count();
        Self {
            submitted,
            total: expected.len(),
        }
    }

    /// True once every expected participant has contributed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.submitted == self.total
    }
}
