//! A participant's action for the current turn, pending judgement.

use serde::{Deserialize, Serialize};

use super::scene::SceneAction;

/// One participant's action for one turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    /// Who acts; equal to a party member id.
    pub participant_id: String,
    /// Chosen action id.
    pub chosen_action_id: String,
    /// Stat the check adds.
    pub applied_stat: String,
    /// Flat modifier the check adds.
    pub stat_modifier: i32,
    /// Display text of the chosen action.
    #[serde(default)]
    pub choice_text: String,
    /// Synthesized for a seat without a human at the controls.
    #[serde(default)]
    pub autonomous: bool,
    /// Overrides the dice draw when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pinned_dice: Option<u32>,
}

impl Contribution {
    /// Builds a contribution from a scene action.
    #[must_use]
    pub fn from_action(participant_id: impl Into<String>, action: &SceneAction) -> Self {
        Self {
            participant_id: participant_id.into(),
            chosen_action_id: action.id.clone(),
            applied_stat: action.applied_stat.clone(),
            stat_modifier: action.stat_modifier,
            choice_text: action.text.clone(),
            autonomous: false,
            pinned_dice: None,
        }
    }

    /// Marks the contribution as synthesized.
    #[must_use]
    pub fn autonomous(mut self) -> Self {
        self.autonomous = true;
        self
    }

    /// Pins the dice value.
    #[must_use]
    pub fn with_pinned_dice(mut self, dice: u32) -> Self {
        self.pinned_dice = Some(dice);
        self
    }
}
