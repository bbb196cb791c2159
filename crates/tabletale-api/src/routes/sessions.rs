//! Routes for the session lifecycle and seating.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::Deserialize;
use tabletale_core::error::DomainError;
use tabletale_engine::{SessionPhase, SubmissionOutcome};
use tabletale_session::domain::commands::{EndSession, SetScene, StartSession};
use tabletale_session::domain::scene::Scene;
use tabletale_session::domain::state::{DifficultyTier, PartyMember, Scenario, SessionState, World};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct StartSessionRequest {
    /// Session id to use; generated when absent.
    #[serde(default)]
    pub session_id: Option<Uuid>,
    /// Story premise.
    #[serde(default)]
    pub scenario: Scenario,
    /// Opening world.
    #[serde(default)]
    pub world: World,
    /// Party members, in table order.
    #[serde(default)]
    pub party: Vec<PartyMember>,
    /// Check difficulty.
    #[serde(default)]
    pub difficulty_tier: DifficultyTier,
    /// Turn limit; the server default applies when absent.
    #[serde(default)]
    pub max_turns: Option<u64>,
    /// Opening scene.
    #[serde(default)]
    pub scene: Option<Scene>,
}

/// POST /
#[instrument(skip(state, request), fields(party_size = request.party.len()))]
async fn start_session(
    State(state): State<AppState>,
    Json(request): Json<StartSessionRequest>,
) -> Result<(StatusCode, Json<SessionState>), ApiError> {
    let command = StartSession {
        correlation_id: Uuid::new_v4(),
        session_id: request.session_id.unwrap_or_else(Uuid::new_v4),
        scenario: request.scenario,
        world: request.world,
        party: request.party,
        difficulty_tier: request.difficulty_tier,
        max_turns: Some(request.max_turns.unwrap_or(state.default_max_turns)),
    };

    info!(correlation_id = %command.correlation_id, session_id = %command.session_id, "handling start_session command");

    let mut session = state.engine.start_session(&command).await?;
    if let Some(scene) = request.scene {
        session = state
            .engine
            .set_scene(&SetScene {
                correlation_id: command.correlation_id,
                session_id: command.session_id,
                scene,
            })
            .await?;
    }

    Ok((StatusCode::CREATED, Json(session)))
}

/// GET /{id}
async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionState>, ApiError> {
    Ok(Json(state.engine.get_state(session_id).await?))
}

/// DELETE /{id}
#[instrument(skip(state))]
async fn end_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionState>, ApiError> {
    let command = EndSession {
        correlation_id: Uuid::new_v4(),
        session_id,
    };
    Ok(Json(state.engine.end_session(&command).await?))
}

/// PUT /{id}/scene
#[instrument(skip(state, scene))]
async fn set_scene(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(scene): Json<Scene>,
) -> Result<Json<SessionState>, ApiError> {
    let command = SetScene {
        correlation_id: Uuid::new_v4(),
        session_id,
        scene,
    };
    Ok(Json(state.engine.set_scene(&command).await?))
}

/// POST /{id}/scene/proposal
#[instrument(skip(state))]
async fn propose_scene(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionState>, ApiError> {
    Ok(Json(
        state
            .engine
            .propose_scene(session_id, Uuid::new_v4())
            .await?,
    ))
}

/// POST /{id}/participants/{pid}
#[instrument(skip(state))]
async fn join(
    State(state): State<AppState>,
    Path((session_id, participant_id)): Path<(Uuid, String)>,
) -> Result<Json<SubmissionOutcome>, ApiError> {
    let session = state.engine.get_state(session_id).await?;
    if session.member(&participant_id).is_none() {
        return Err(DomainError::Validation(format!(
            "participant {participant_id} is not in the party"
        ))
        .into());
    }
    state.membership.join(session_id, &participant_id)?;
    Ok(Json(
        state
            .engine
            .refresh_progress(session_id, Uuid::new_v4())
            .await?,
    ))
}

/// DELETE /{id}/participants/{pid}
#[instrument(skip(state))]
async fn leave(
    State(state): State<AppState>,
    Path((session_id, participant_id)): Path<(Uuid, String)>,
) -> Result<Json<SubmissionOutcome>, ApiError> {
    state.membership.leave(session_id, &participant_id)?;
    Ok(Json(
        state
            .engine
            .refresh_progress(session_id, Uuid::new_v4())
            .await?,
    ))
}

/// GET /{id}/phase
async fn phase(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<SessionPhase>, ApiError> {
    Ok(Json(state.engine.phase(session_id).await?))
}

/// Returns the router for session lifecycle and seating.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(start_session))
        .route("/{id}", get(get_session).delete(end_session))
        .route("/{id}/scene", put(set_scene))
        .route("/{id}/scene/proposal", post(propose_scene))
        .route(
            "/{id}/participants/{pid}",
            post(join).delete(leave),
        )
        .route("/{id}/phase", get(phase))
}
