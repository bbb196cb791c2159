//! Tolerant normalization of untrusted generator output.
//!
//! The output is read as a loose JSON object. Every field gets a safe
//! default, several spellings of each key are accepted, and malformed
//! entries are dropped one by one instead of failing the turn.

use std::collections::BTreeMap;

use serde_json::{Map, Value};
use tabletale_core::error::DomainError;
use tabletale_session::domain::state::{LogEntry, SessionState, SheetEntry};
use tabletale_world_state::domain::resolution::{
    InventoryDelta, PartyChanges, PartyDelta, ResolutionResult,
};
use tracing::debug;

const NARRATION_KEYS: &[&str] = &["narration", "story"];
const PERSONAL_KEYS: &[&str] = &["personal_narrations", "personalNarrations", "personal"];
const WORLD_KEYS: &[&str] = &["world_delta", "worldDelta", "world"];
const PARTY_KEYS: &[&str] = &["party_deltas", "partyDeltas", "party"];
const LOG_KEYS: &[&str] = &["log_append", "logAppend"];
const INVENTORY_KEYS: &[&str] = &["inventory_delta", "inventoryDelta", "inventory"];
const COOLDOWN_KEYS: &[&str] = &["skill_cooldown_delta", "skillCooldownDelta"];
const TERMINAL_KEYS: &[&str] = &["terminal", "is_final_turn", "isFinalTurn"];

/// Normalizes parsed generator output against the session it resolves.
///
/// # Errors
///
/// Returns `DomainError::Schema` if `raw` is not a JSON object.
pub fn normalize(state: &SessionState, raw: &Value) -> Result<ResolutionResult, DomainError> {
    let Value::Object(obj) = raw else {
        return Err(DomainError::Schema(format!(
            "generator output is a JSON {}, expected an object",
            json_kind(raw)
        )));
    };

    let mut result = ResolutionResult {
        narration: first_of(obj, NARRATION_KEYS)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_owned(),
        personal_narrations: personal_narrations(state, first_of(obj, PERSONAL_KEYS)),
        world_delta: first_of(obj, WORLD_KEYS)
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_else(|| state.world.to_map()),
        party_deltas: first_of(obj, PARTY_KEYS)
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(party_delta).collect())
            .unwrap_or_default(),
        log_append: first_of(obj, LOG_KEYS)
            .and_then(Value::as_array)
            .map(|entries| entries.iter().filter_map(log_entry).collect())
            .unwrap_or_default(),
        inventory_delta: InventoryDelta::default(),
        skill_cooldown_delta: BTreeMap::new(),
        terminal: TERMINAL_KEYS
            .iter()
            .any(|key| obj.get(*key).and_then(Value::as_bool) == Some(true)),
        image: None,
    };

    if let Some(inventory) = first_of(obj, INVENTORY_KEYS) {
        merge_inventory(&mut result.inventory_delta, inventory);
    }
    if let Some(cooldowns) = first_of(obj, COOLDOWN_KEYS) {
        merge_cooldowns(&mut result.skill_cooldown_delta, cooldowns);
    }
    if let Some(update) = obj
        .get("shari")
        .and_then(|s| s.get("update"))
        .and_then(Value::as_object)
    {
        merge_legacy_update(&mut result, update);
    }

    debug!(
        session_id = %state.session_id,
        narration_len = result.narration.len(),
        party_deltas = result.party_deltas.len(),
        log_entries = result.log_append.len(),
        terminal = result.terminal,
        "generator output normalized"
    );
    Ok(result)
}

pub(crate) fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub(crate) fn first_of<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| obj.get(*key).filter(|v| !v.is_null()))
}

/// Ids arrive as strings or numbers.
pub(crate) fn id_of(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) fn int_of(value: &Value) -> Option<i32> {
    let n = value
        .as_i64()
        .or_else(|| value.as_f64().map(|f| f.trunc() as i64))?;
    i32::try_from(n).ok()
}

fn personal_narrations(state: &SessionState, raw: Option<&Value>) -> BTreeMap<String, String> {
    let given = raw.and_then(Value::as_object);
    state
        .party
        .iter()
        .map(|member| {
            let text = given
                .and_then(|g| g.get(&member.id))
                .and_then(Value::as_str)
                .unwrap_or_default();
            (member.id.clone(), text.to_owned())
        })
        .collect()
}

fn party_delta(entry: &Value) -> Option<PartyDelta> {
    let id = id_of(entry.get("id")?)?;
    let changes = entry.get("changes").and_then(Value::as_object);
    let Some(changes) = changes else {
        return Some(PartyDelta {
            id,
            changes: PartyChanges::default(),
        });
    };
    Some(PartyDelta {
        id,
        changes: PartyChanges {
            hp: changes.get("hp").and_then(int_of),
            status: changes.get("status").map(status_tags).unwrap_or_default(),
            hurt: changes.get("hurt").and_then(Value::as_bool).unwrap_or(false),
        },
    })
}

/// Status arrives as a list, a single tag, or a map of tag to flag.
fn status_tags(value: &Value) -> Vec<String> {
    match value {
        Value::String(tag) => vec![tag.clone()],
        Value::Array(tags) => tags
            .iter()
            .filter_map(|t| t.as_str().map(str::to_owned))
            .collect(),
        Value::Object(flags) => flags
            .iter()
            .filter(|(_, on)| on.as_bool() == Some(true))
            .map(|(tag, _)| tag.clone())
            .collect(),
        _ => Vec::new(),
    }
}

fn log_entry(entry: &Value) -> Option<LogEntry> {
    if !entry.is_object() {
        return None;
    }
    serde_json::from_value(entry.clone()).ok()
}

fn entry_name(value: &Value) -> Option<String> {
    match value {
        Value::String(name) => Some(name.clone()),
        Value::Object(obj) => obj.get("name").and_then(Value::as_str).map(str::to_owned),
        _ => None,
    }
}

fn merge_inventory(delta: &mut InventoryDelta, raw: &Value) {
    let Some(raw) = raw.as_object() else {
        return;
    };
    for (member_id, names) in raw.get("consumed").and_then(Value::as_object).into_iter().flatten() {
        let names: Vec<String> = names
            .as_array()
            .map(|list| list.iter().filter_map(entry_name).collect())
            .unwrap_or_default();
        if !names.is_empty() {
            delta.consumed.entry(member_id.clone()).or_default().extend(names);
        }
    }
    for (member_id, entries) in raw.get("added").and_then(Value::as_object).into_iter().flatten() {
        let entries: Vec<SheetEntry> = entries
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(|e| serde_json::from_value(e.clone()).ok())
                    .collect()
            })
            .unwrap_or_default();
        if !entries.is_empty() {
            delta.added.entry(member_id.clone()).or_default().extend(entries);
        }
    }
    for (member_id, changes) in raw.get("charges").and_then(Value::as_object).into_iter().flatten() {
        let Some(changes) = changes.as_object() else {
            continue;
        };
        let slot = delta.charges.entry(member_id.clone()).or_default();
        for (name, change) in changes {
            if let Some(change) = int_of(change) {
                slot.insert(name.clone(), change);
            }
        }
    }
}

fn merge_cooldowns(delta: &mut BTreeMap<String, BTreeMap<String, u32>>, raw: &Value) {
    for (member_id, skills) in raw.as_object().into_iter().flatten() {
        let Some(skills) = skills.as_object() else {
            continue;
        };
        let slot = delta.entry(member_id.clone()).or_default();
        for (skill, turns) in skills {
            if let Some(turns) = int_of(turns).and_then(|t| u32::try_from(t).ok()) {
                slot.insert(skill.clone(), turns);
            }
        }
    }
}

/// Folds the nested `shari.update` block into the flat result.
fn merge_legacy_update(result: &mut ResolutionResult, update: &Map<String, Value>) {
    for (member_id, hurt) in update
        .get("characterHurt")
        .and_then(Value::as_object)
        .into_iter()
        .flatten()
    {
        if hurt.as_bool() == Some(true) {
            result.party_deltas.push(PartyDelta {
                id: member_id.clone(),
                changes: PartyChanges {
                    hurt: true,
                    ..PartyChanges::default()
                },
            });
        }
    }

    if let Some(location) = update
        .get("currentLocation")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        result
            .world_delta
            .insert("location".to_owned(), Value::String(location.to_owned()));
    }
    if let Some(previous) = update.get("previousLocation").filter(|v| !v.is_null()) {
        result
            .world_delta
            .insert("prev_location".to_owned(), previous.clone());
    }
    if let Some(notes) = update
        .get("notes")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        result
            .world_delta
            .insert("notes".to_owned(), Value::String(notes.to_owned()));
    }

    if let Some(inventory) = update.get("inventory") {
        merge_inventory(&mut result.inventory_delta, inventory);
    }
    if let Some(cooldowns) = update.get("skills").and_then(|s| s.get("cooldown")) {
        merge_cooldowns(&mut result.skill_cooldown_delta, cooldowns);
    }
}
