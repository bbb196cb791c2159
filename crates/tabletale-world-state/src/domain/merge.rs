//! The pure state merge.

use std::collections::BTreeSet;

use tabletale_session::domain::state::{PartyMember, SessionState, SheetEntry};
use tracing::warn;

use super::resolution::{InventoryDelta, PartyDelta, ResolutionResult};

/// Applies `result` to a copy of `state` and returns the next record.
///
/// Deltas addressed to ids outside the party are skipped and logged; a
/// delta never adds a member.
#[must_use]
pub fn apply(state: &SessionState, result: &ResolutionResult) -> SessionState {
    let mut next = state.clone();
    next.turn_number = state.turn_number + 1;

    for (key, value) in &result.world_delta {
        next.world.set_key(key, value.clone());
    }
    next.log.extend(result.log_append.iter().cloned());

    for delta in &result.party_deltas {
        apply_party_delta(&mut next, delta);
    }
    apply_inventory(&mut next, &result.inventory_delta);

    for (member_id, skills) in &result.skill_cooldown_delta {
        if next.member(member_id).is_none() {
            warn_unknown(state, member_id, "skill cooldown");
            continue;
        }
        let slot = next.cooldowns.entry(member_id.clone()).or_default();
        for (skill, turns) in skills {
            slot.insert(skill.clone(), *turns);
        }
    }

    next.terminal = result.terminal;
    next
}

fn warn_unknown(state: &SessionState, member_id: &str, delta: &str) {
    warn!(
        session_id = %state.session_id,
        member_id,
        delta,
        "delta addressed to unknown party member skipped"
    );
}

fn apply_party_delta(next: &mut SessionState, delta: &PartyDelta) {
    let Some(member) = next.member_mut(&delta.id) else {
        warn_unknown(next, &delta.id, "party");
        return;
    };
    let changes = &delta.changes;
    if let Some(hp) = changes.hp {
        member.sheet.hp = member.sheet.hp.saturating_add(hp);
    }
    member.sheet.status.extend(changes.status.iter().cloned());
    if changes.hurt {
        *next.hurt_counts.entry(delta.id.clone()).or_insert(0) += 1;
    }
}

fn apply_inventory(next: &mut SessionState, delta: &InventoryDelta) {
    for (member_id, names) in &delta.consumed {
        let Some(member) = next.member_mut(member_id) else {
            warn_unknown(next, member_id, "inventory consumed");
            continue;
        };
        let names: BTreeSet<&str> = names.iter().map(String::as_str).collect();
        member.sheet.items.retain(|e| !names.contains(e.name.as_str()));
        member.sheet.spells.retain(|e| !names.contains(e.name.as_str()));
    }

    for (member_id, entries) in &delta.added {
        let Some(member) = next.member_mut(member_id) else {
            warn_unknown(next, member_id, "inventory added");
            continue;
        };
        member.sheet.items.extend(entries.iter().cloned());
    }

    for (member_id, changes) in &delta.charges {
        let Some(member) = next.member_mut(member_id) else {
            warn_unknown(next, member_id, "inventory charges");
            continue;
        };
        adjust_charges(member, changes);
    }
}

fn adjust_charges(member: &mut PartyMember, changes: &std::collections::BTreeMap<String, i32>) {
    let sheet = &mut member.sheet;
    let entries = sheet.items.iter_mut().chain(sheet.spells.iter_mut());
    for entry in entries {
        let SheetEntry {
            name,
            charges: Some(charges),
        } = entry
        else {
            continue;
        };
        if let Some(change) = changes.get(name.as_str()) {
            *charges = charges.saturating_add(*change);
        }
    }
}
