//! Command handlers for the Session state context.
//!
//! Each handler reads the latest whole record, computes the next one and
//! writes it back whole.

use std::collections::BTreeSet;

use tabletale_core::command::Command;
use tabletale_core::error::DomainError;
use tracing::{info, warn};

use crate::application::query_handlers::recover_state;
use crate::domain::commands::{EndSession, SetScene, StartSession};
use crate::domain::scene::Scene;
use crate::domain::state::{PartyMember, SessionState};
use crate::repository::{PersistentStore, SessionStateStore};

fn validate_party(party: &[PartyMember]) -> Result<(), DomainError> {
    let mut seen = BTreeSet::new();
    for member in party {
        if member.id.trim().is_empty() {
            return Err(DomainError::Validation(
                "party member id must not be empty".to_owned(),
            ));
        }
        if !seen.insert(member.id.as_str()) {
            return Err(DomainError::Validation(format!(
                "duplicate party member id: {}",
                member.id
            )));
        }
    }
    Ok(())
}

fn validate_scene(scene: &Scene) -> Result<(), DomainError> {
    for (role, actions) in &scene.actions {
        if role.trim().is_empty() {
            return Err(DomainError::Validation(
                "scene role must not be empty".to_owned(),
            ));
        }
        let mut ids = BTreeSet::new();
        for action in actions {
            if action.id.trim().is_empty() {
                return Err(DomainError::Validation(format!(
                    "scene action for role {role} has an empty id"
                )));
            }
            if !ids.insert(action.id.as_str()) {
                return Err(DomainError::Validation(format!(
                    "duplicate action id {} for role {role}",
                    action.id
                )));
            }
        }
    }
    Ok(())
}

/// Handles the `StartSession` command: validates the party and writes a
/// fresh turn-zero record.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the session is already live, a party
/// id is empty or repeated, or `max_turns` is zero.
/// Returns the store's error if the write fails.
pub async fn handle_start_session(
    command: &StartSession,
    store: &dyn SessionStateStore,
) -> Result<SessionState, DomainError> {
    let session_id = command.session_id();
    if matches!(store.get(session_id).await, Ok(Some(_))) {
        return Err(DomainError::Validation(format!(
            "session {session_id} already exists"
        )));
    }
    validate_party(&command.party)?;
    if command.max_turns == Some(0) {
        return Err(DomainError::Validation(
            "max_turns must be at least 1".to_owned(),
        ));
    }

    let mut state = SessionState::new(session_id);
    state.scenario = command.scenario.clone();
    state.world = command.world.clone();
    state.party = command.party.clone();
    state.difficulty_tier = command.difficulty_tier;
    if let Some(max_turns) = command.max_turns {
        state.max_turns = max_turns;
    }

    store.set(session_id, &state).await?;
    info!(
        %session_id,
        correlation_id = %command.correlation_id(),
        command = command.command_type(),
        party_size = state.party.len(),
        "session started"
    );
    Ok(state)
}

/// Handles the `SetScene` command: replaces the actions on offer.
///
/// # Errors
///
/// Returns `DomainError::StateNotFound` if the session is unknown.
/// Returns `DomainError::Validation` if the scene is malformed or the
/// session has already ended its story.
pub async fn handle_set_scene(
    command: &SetScene,
    store: &dyn SessionStateStore,
    durable: &dyn PersistentStore,
) -> Result<SessionState, DomainError> {
    validate_scene(&command.scene)?;
    let session_id = command.session_id();
    let mut state = recover_state(session_id, store, durable).await?;
    if state.terminal {
        return Err(DomainError::Validation(format!(
            "session {session_id} is terminal"
        )));
    }

    state.scene = command.scene.clone();
    store.set(session_id, &state).await?;
    info!(
        %session_id,
        correlation_id = %command.correlation_id(),
        command = command.command_type(),
        roles = state.scene.actions.len(),
        "scene replaced"
    );
    Ok(state)
}

/// Handles the `EndSession` command: saves the last record to the durable
/// store, then drops it from the cache.
///
/// A failed durable save is logged and does not stop the teardown.
///
/// # Errors
///
/// Returns `DomainError::StateNotFound` if the session is not live.
/// Returns the cache's error if the removal fails.
pub async fn handle_end_session(
    command: &EndSession,
    store: &dyn SessionStateStore,
    durable: &dyn PersistentStore,
) -> Result<SessionState, DomainError> {
    let session_id = command.session_id();
    let state = store
        .get(session_id)
        .await?
        .ok_or(DomainError::StateNotFound(session_id))?;

    if let Err(e) = durable.save(&state).await {
        warn!(%session_id, error = %e, "final snapshot save failed");
    }
    store.remove(session_id).await?;
    info!(
        %session_id,
        correlation_id = %command.correlation_id(),
        command = command.command_type(),
        turn = state.turn_number,
        "session ended"
    );
    Ok(state)
}
