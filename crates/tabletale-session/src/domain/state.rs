//! The session record and the party it carries.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::scene::Scene;

/// Default number of turns a scenario is paced for.
pub const DEFAULT_MAX_TURNS: u64 = 10;

/// Difficulty of a session; selects the check DC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyTier {
    /// Forgiving checks.
    Beginner,
    /// Balanced checks.
    #[default]
    Intermediate,
    /// Punishing checks.
    Advanced,
    /// Any tier name this engine does not know.
    #[serde(other)]
    Unrecognized,
}

impl fmt::Display for DifficultyTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Unrecognized => "unrecognized",
        };
        f.write_str(name)
    }
}

/// Scenario headline shown to the generator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario title.
    #[serde(default)]
    pub title: String,
    /// One-paragraph summary.
    #[serde(default)]
    pub summary: String,
}

/// Shared world facts. Known keys are typed; anything else the generator
/// sends is kept in `extra` so shallow merges never drop it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct World {
    /// In-world time of day.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Current location of the party.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Free-form notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Any other world keys.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl World {
    /// Overwrites a single key, routing the three known keys to their fields.
    ///
    /// `null` clears a known key; non-string values for a known key are
    /// stored as their JSON text.
    pub fn set_key(&mut self, key: &str, value: Value) {
        let slot = match key {
            "time" => &mut self.time,
            "location" => &mut self.location,
            "notes" => &mut self.notes,
            _ => {
                self.extra.insert(key.to_owned(), value);
                return;
            }
        };
        *slot = match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        };
    }

    /// Returns the world as a flat JSON object.
    #[must_use]
    pub fn to_map(&self) -> serde_json::Map<String, Value> {
        let mut map: serde_json::Map<String, Value> = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        for (key, field) in [
            ("time", &self.time),
            ("location", &self.location),
            ("notes", &self.notes),
        ] {
            if let Some(value) = field {
                map.insert(key.to_owned(), Value::String(value.clone()));
            }
        }
        map
    }
}

/// A named item or spell, optionally with remaining charges.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "SheetEntryRepr")]
pub struct SheetEntry {
    /// Exact name; inventory deltas match on it.
    pub name: String,
    /// Remaining uses, if the entry is limited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub charges: Option<i32>,
}

impl SheetEntry {
    /// An entry without charges.
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            charges: None,
        }
    }

    /// An entry with `charges` uses left.
    #[must_use]
    pub fn charged(name: impl Into<String>, charges: i32) -> Self {
        Self {
            name: name.into(),
            charges: Some(charges),
        }
    }
}

/// Sheets arrive either as bare names or as `{name, charges}` objects.
#[derive(Deserialize)]
#[serde(untagged)]
enum SheetEntryRepr {
    Name(String),
    Full {
        name: String,
        #[serde(default)]
        charges: Option<i32>,
    },
}

impl From<SheetEntryRepr> for SheetEntry {
    fn from(repr: SheetEntryRepr) -> Self {
        match repr {
            SheetEntryRepr::Name(name) => Self::named(name),
            SheetEntryRepr::Full { name, charges } => Self { name, charges },
        }
    }
}

/// A party member's mechanical sheet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CharacterSheet {
    /// Stat values by stat name.
    #[serde(default)]
    pub stats: BTreeMap<String, i32>,
    /// Skill names.
    #[serde(default)]
    pub skills: Vec<String>,
    /// Carried items.
    #[serde(default)]
    pub items: Vec<SheetEntry>,
    /// Known spells.
    #[serde(default)]
    pub spells: Vec<SheetEntry>,
    /// Status tags; only ever unioned.
    #[serde(default)]
    pub status: BTreeSet<String>,
    /// Hit points.
    #[serde(default)]
    pub hp: i32,
}

impl CharacterSheet {
    /// Stat value, 0 when the stat is absent.
    #[must_use]
    pub fn stat(&self, name: &str) -> i32 {
        self.stats.get(name).copied().unwrap_or(0)
    }
}

/// One member of the party.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartyMember {
    /// Stable identifier, also the participant id of whoever plays it.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Role; selects the scene actions available to this member.
    #[serde(default)]
    pub role: String,
    /// Mechanical sheet.
    #[serde(default)]
    pub sheet: CharacterSheet,
    /// Free-text memory carried between turns.
    #[serde(default)]
    pub memory: String,
}

/// One entry of the session log.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Turn the entry belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turn: Option<u64>,
    /// Narration recorded for the turn.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narration: Option<String>,
    /// Short event lines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<String>,
    /// Anything else the generator attached.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// The whole ephemeral record for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Session identifier.
    pub session_id: Uuid,
    /// Completed turns; only the merger increments it.
    #[serde(default)]
    pub turn_number: u64,
    /// Scenario headline.
    #[serde(default)]
    pub scenario: Scenario,
    /// World facts.
    #[serde(default)]
    pub world: World,
    /// Party in seating order.
    #[serde(default)]
    pub party: Vec<PartyMember>,
    /// Append-only log.
    #[serde(default)]
    pub log: Vec<LogEntry>,
    /// Difficulty tier for checks.
    #[serde(default)]
    pub difficulty_tier: DifficultyTier,
    /// Set once the story has ended.
    #[serde(default)]
    pub terminal: bool,
    /// Actions on offer this turn.
    #[serde(default)]
    pub scene: Scene,
    /// Remaining skill cooldowns by member, then skill.
    #[serde(default)]
    pub cooldowns: BTreeMap<String, BTreeMap<String, u32>>,
    /// Cumulative hurt markers per member.
    #[serde(default)]
    pub hurt_counts: BTreeMap<String, u32>,
    /// Turns the scenario is paced for.
    #[serde(default = "default_max_turns")]
    pub max_turns: u64,
}

fn default_max_turns() -> u64 {
    DEFAULT_MAX_TURNS
}

impl SessionState {
    /// An empty-party, zero-turn session.
    #[must_use]
    pub fn new(session_id: Uuid) -> Self {
        Self {
            session_id,
            turn_number: 0,
            scenario: Scenario::default(),
            world: World::default(),
            party: Vec::new(),
            log: Vec::new(),
            difficulty_tier: DifficultyTier::default(),
            terminal: false,
            scene: Scene::default(),
            cooldowns: BTreeMap::new(),
            hurt_counts: BTreeMap::new(),
            max_turns: DEFAULT_MAX_TURNS,
        }
    }

    /// Looks up a party member by id.
    #[must_use]
    pub fn member(&self, id: &str) -> Option<&PartyMember> {
        self.party.iter().find(|m| m.id == id)
    }

    /// Mutable lookup by id.
    pub fn member_mut(&mut self, id: &str) -> Option<&mut PartyMember> {
        self.party.iter_mut().find(|m| m.id == id)
    }

    /// Party ids in seating order.
    #[must_use]
    pub fn party_ids(&self) -> Vec<&str> {
        self.party.iter().map(|m| m.id.as_str()).collect()
    }

    /// The last `n` log entries, oldest first.
    #[must_use]
    pub fn recent_log(&self, n: usize) -> &[LogEntry] {
        let start = self.log.len().saturating_sub(n);
        &self.log[start..]
    }
}
