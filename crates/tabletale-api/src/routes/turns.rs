//! Routes for contributions and turn resolution.

use axum::extract::{Path, State};
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use tabletale_engine::{Submission, SubmissionOutcome, TurnOutcome};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /{id}/contributions.
#[derive(Debug, Deserialize)]
pub struct ContributionRequest {
    /// Submitting party member.
    pub participant_id: String,
    /// Scene action taken.
    pub chosen_action_id: String,
    /// Stat override.
    #[serde(default)]
    pub applied_stat: Option<String>,
    /// Modifier override.
    #[serde(default)]
    pub stat_modifier: Option<i32>,
    /// Display text override.
    #[serde(default)]
    pub choice_text: Option<String>,
    /// Turn the client believes is current.
    #[serde(default)]
    pub turn_number: Option<u64>,
    /// Fixed die value.
    #[serde(default)]
    pub pinned_dice: Option<u32>,
}

/// POST /{id}/contributions
#[instrument(skip(state, request), fields(participant_id = %request.participant_id))]
async fn submit_contribution(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<ContributionRequest>,
) -> Result<Json<SubmissionOutcome>, ApiError> {
    let submission = Submission {
        correlation_id: Uuid::new_v4(),
        chosen_action_id: request.chosen_action_id,
        applied_stat: request.applied_stat,
        stat_modifier: request.stat_modifier,
        choice_text: request.choice_text,
        turn_number: request.turn_number,
        pinned_dice: request.pinned_dice,
    };

    info!(correlation_id = %submission.correlation_id, "handling submit_contribution command");

    let outcome = state
        .engine
        .submit_contribution(session_id, &request.participant_id, submission)
        .await?;
    Ok(Json(outcome))
}

/// POST /{id}/autonomous/{pid}
#[instrument(skip(state))]
async fn submit_autonomous(
    State(state): State<AppState>,
    Path((session_id, participant_id)): Path<(Uuid, String)>,
) -> Result<Json<SubmissionOutcome>, ApiError> {
    let outcome = state
        .engine
        .submit_autonomous(session_id, &participant_id, Uuid::new_v4())
        .await?;
    Ok(Json(outcome))
}

/// POST /{id}/resolve
#[instrument(skip(state))]
async fn resolve(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<TurnOutcome>, ApiError> {
    let correlation_id = Uuid::new_v4();
    info!(%correlation_id, "handling try_resolve_turn command");
    Ok(Json(
        state
            .engine
            .try_resolve_turn(session_id, correlation_id)
            .await?,
    ))
}

/// Returns the router for turn submission and resolution.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}/contributions", post(submit_contribution))
        .route("/{id}/autonomous/{pid}", post(submit_autonomous))
        .route("/{id}/resolve", post(resolve))
}
