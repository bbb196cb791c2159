//! The normalized result of one turn's narration.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tabletale_session::domain::state::{LogEntry, SheetEntry};

/// Changes to one party member's sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyChanges {
    /// Added to current hit points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hp: Option<i32>,
    /// Status tags to union into the sheet.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub status: Vec<String>,
    /// Bumps the member's hurt counter when set.
    #[serde(default)]
    pub hurt: bool,
}

/// A change addressed to one existing party member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyDelta {
    /// Target member id.
    pub id: String,
    /// What changes.
    #[serde(default)]
    pub changes: PartyChanges,
}

/// Item and spell changes, each keyed by member id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryDelta {
    /// Names removed from items and spells.
    #[serde(default)]
    pub consumed: BTreeMap<String, Vec<String>>,
    /// Entries appended to items.
    #[serde(default)]
    pub added: BTreeMap<String, Vec<SheetEntry>>,
    /// Signed charge changes by entry name.
    #[serde(default)]
    pub charges: BTreeMap<String, BTreeMap<String, i32>>,
}

impl InventoryDelta {
    /// True when no member is touched.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.consumed.is_empty() && self.added.is_empty() && self.charges.is_empty()
    }
}

/// A best-effort scene render. Either `url` or `error` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneImage {
    /// Where the render can be fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Why the render is missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Prompt the render was requested with.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

/// Everything one turn changes, after normalization.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResolutionResult {
    /// Shared narration for the table.
    pub narration: String,
    /// Per-participant narration; every party id has an entry.
    pub personal_narrations: BTreeMap<String, String>,
    /// World keys to overwrite.
    pub world_delta: Map<String, Value>,
    /// Sheet changes.
    pub party_deltas: Vec<PartyDelta>,
    /// Log entries to append.
    pub log_append: Vec<LogEntry>,
    /// Item and spell changes.
    pub inventory_delta: InventoryDelta,
    /// Cooldown counters to set, by member then skill.
    pub skill_cooldown_delta: BTreeMap<String, BTreeMap<String, u32>>,
    /// Ends the story.
    pub terminal: bool,
    /// Optional scene render.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<SceneImage>,
}
