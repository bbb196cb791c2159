//! Reads a proposed next scene out of generator output.
//!
//! Options arrive keyed by party id or by role. Ids are mapped to their
//! member's role, keys matching neither are dropped, and so is any option
//! without text. Missing option ids are lettered `A`, `B`, ... in order.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};
use tabletale_core::error::DomainError;
use tabletale_session::domain::scene::{Scene, SceneAction};
use tabletale_session::domain::state::SessionState;
use tracing::debug;

use crate::domain::normalize::{first_of, id_of, int_of, json_kind};

const OPTIONS_KEYS: &[&str] = &["options", "actions", "choices"];
const TITLE_KEYS: &[&str] = &["title", "scene_title", "sceneTitle"];
const TEXT_KEYS: &[&str] = &["text", "label", "description"];
const STAT_KEYS: &[&str] = &["applied_stat", "appliedStat", "stat"];
const MODIFIER_KEYS: &[&str] = &["stat_modifier", "statModifier", "modifier"];

/// Normalizes a proposed scene against the party it is offered to.
///
/// # Errors
///
/// Returns `DomainError::Schema` if `raw` is not a JSON object, carries no
/// options map, or offers nothing usable to any party role.
pub fn normalize_scene(state: &SessionState, raw: &Value) -> Result<Scene, DomainError> {
    let Value::Object(obj) = raw else {
        return Err(DomainError::Schema(format!(
            "scene proposal is a JSON {}, expected an object",
            json_kind(raw)
        )));
    };
    let options = first_of(obj, OPTIONS_KEYS)
        .and_then(Value::as_object)
        .ok_or_else(|| DomainError::Schema("scene proposal has no options map".to_owned()))?;

    let mut actions: BTreeMap<String, Vec<SceneAction>> = BTreeMap::new();
    for (key, entries) in options {
        let Some(role) = role_for(state, key) else {
            debug!(key = %key, "dropping options for an unknown party id or role");
            continue;
        };
        if actions.contains_key(&role) {
            continue;
        }
        let parsed = role_actions(state, &role, entries);
        if !parsed.is_empty() {
            actions.insert(role, parsed);
        }
    }
    if actions.is_empty() {
        return Err(DomainError::Schema(
            "scene proposal offers no usable options to any party role".to_owned(),
        ));
    }

    let title = first_of(obj, TITLE_KEYS)
        .and_then(Value::as_str)
        .filter(|t| !t.trim().is_empty())
        .map_or_else(|| format!("Turn {}", state.turn_number + 1), str::to_owned);
    Ok(Scene { title, actions })
}

fn role_for(state: &SessionState, key: &str) -> Option<String> {
    if let Some(member) = state.member(key) {
        return Some(member.role.clone());
    }
    state
        .party
        .iter()
        .any(|m| m.role == key)
        .then(|| key.to_owned())
}

fn role_actions(state: &SessionState, role: &str, entries: &Value) -> Vec<SceneAction> {
    let Some(entries) = entries.as_array() else {
        return Vec::new();
    };
    let fallback_stat = strongest_stat(state, role);
    let mut seen = BTreeSet::new();
    entries
        .iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let entry = entry.as_object()?;
            let text = first_of(entry, TEXT_KEYS)
                .and_then(Value::as_str)
                .map(str::trim)
                .filter(|t| !t.is_empty())?;
            let id = entry
                .get("id")
                .and_then(id_of)
                .map(|id| id.trim().to_owned())
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| letter(index));
            if !seen.insert(id.clone()) {
                return None;
            }
            Some(SceneAction {
                id,
                text: text.to_owned(),
                applied_stat: stat_of(entry).unwrap_or_else(|| fallback_stat.clone()),
                stat_modifier: first_of(entry, MODIFIER_KEYS)
                    .and_then(int_of)
                    .unwrap_or(0),
            })
        })
        .collect()
}

fn stat_of(entry: &Map<String, Value>) -> Option<String> {
    first_of(entry, STAT_KEYS)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
}

/// Highest stat of the first member holding `role`; ties go to the
/// alphabetically first name.
fn strongest_stat(state: &SessionState, role: &str) -> String {
    state
        .party
        .iter()
        .find(|m| m.role == role)
        .and_then(|m| {
            m.sheet
                .stats
                .iter()
                .max_by(|(a_name, a), (b_name, b)| a.cmp(b).then_with(|| b_name.cmp(a_name)))
        })
        .map(|(name, _)| name.clone())
        .unwrap_or_default()
}

fn letter(index: usize) -> String {
    u8::try_from(index)
        .ok()
        .filter(|i| *i < 26)
        .map_or_else(|| format!("opt{}", index + 1), |i| char::from(b'A' + i).to_string())
}
