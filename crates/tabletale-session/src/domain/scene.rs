//! The current scene: which actions each role may take this turn.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One selectable action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneAction {
    /// Action identifier, unique within its role.
    pub id: String,
    /// Display text; also what the generator sees as the choice.
    #[serde(default)]
    pub text: String,
    /// Stat the check adds.
    #[serde(default)]
    pub applied_stat: String,
    /// Flat modifier the check adds.
    #[serde(default)]
    pub stat_modifier: i32,
}

/// Actions on offer, keyed by role.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scene {
    /// Scene title.
    #[serde(default)]
    pub title: String,
    /// Actions per role.
    #[serde(default)]
    pub actions: BTreeMap<String, Vec<SceneAction>>,
}

impl Scene {
    /// Actions available to `role`; empty when the role has none.
    #[must_use]
    pub fn actions_for(&self, role: &str) -> &[SceneAction] {
        self.actions.get(role).map_or(&[], Vec::as_slice)
    }

    /// Finds an action by role and id.
    #[must_use]
    pub fn find(&self, role: &str, action_id: &str) -> Option<&SceneAction> {
        self.actions_for(role).iter().find(|a| a.id == action_id)
    }
}
