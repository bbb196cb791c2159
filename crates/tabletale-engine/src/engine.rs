//! The turn engine façade.
//!
//! Every operation re-reads the latest session record before acting. A
//! resolution snapshots the turn's contributions, judges them, asks the
//! narrative generator for a result, commits the merge, and only then
//! clears the turn's bucket. Any failure before the commit leaves the turn
//! and its contributions as they were.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use tabletale_core::clock::Clock;
use tabletale_core::error::DomainError;
use tabletale_core::event::EventMetadata;
use tabletale_core::rng::DeterministicRng;
use tabletale_narrative::application::orchestrator::NarrativeOrchestrator;
use tabletale_rules::application::judging::judge_contributions;
use tabletale_rules::domain::judgement::{DIE_FACES, JudgedContribution};
use tabletale_session::application::command_handlers::{
    handle_end_session, handle_set_scene, handle_start_session,
};
use tabletale_session::application::query_handlers::recover_state;
use tabletale_session::domain::commands::{EndSession, SetScene, StartSession};
use tabletale_session::domain::contribution::Contribution;
use tabletale_session::domain::state::SessionState;
use tabletale_session::repository::{PersistentStore, SessionStateStore};
use tabletale_turns::application::collector::{TurnCollector, fill_autonomous};
use tabletale_turns::domain::bucket::TurnProgress;
use tabletale_turns::repository::ContributionStore;
use tabletale_world_state::application::command_handlers::commit_resolution;
use tabletale_world_state::domain::resolution::ResolutionResult;
use tokio::sync::broadcast;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::events::{TurnEvent, TurnEventKind};
use crate::guard::ResolutionGuard;
use crate::membership::RoomMembershipProvider;

/// Collaborators the engine is built from.
#[derive(Clone)]
pub struct EnginePorts {
    /// Live session records.
    pub store: Arc<dyn SessionStateStore>,
    /// Durable fallback for session records.
    pub durable: Arc<dyn PersistentStore>,
    /// Per-turn contribution buckets.
    pub contributions: Arc<dyn ContributionStore>,
    /// Who is seated at each session.
    pub membership: Arc<dyn RoomMembershipProvider>,
    /// Narrative resolution.
    pub orchestrator: NarrativeOrchestrator,
    /// Shared dice and action picks.
    pub rng: Arc<Mutex<dyn DeterministicRng>>,
    /// Event timestamps.
    pub clock: Arc<dyn Clock>,
}

/// A participant's choice for the current turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Traces the submission through the events it causes.
    pub correlation_id: Uuid,
    /// Id of the scene action taken.
    pub chosen_action_id: String,
    /// Overrides the action's stat. Required when the role has no scene actions.
    #[serde(default)]
    pub applied_stat: Option<String>,
    /// Overrides the action's modifier.
    #[serde(default)]
    pub stat_modifier: Option<i32>,
    /// Overrides the action's display text.
    #[serde(default)]
    pub choice_text: Option<String>,
    /// The turn the participant believes is current.
    #[serde(default)]
    pub turn_number: Option<u64>,
    /// Fixed die value in `1..=20`.
    #[serde(default)]
    pub pinned_dice: Option<u32>,
}

impl Submission {
    /// A plain choice of a scene action.
    #[must_use]
    pub fn choose(chosen_action_id: impl Into<String>) -> Self {
        Self {
            correlation_id: Uuid::new_v4(),
            chosen_action_id: chosen_action_id.into(),
            applied_stat: None,
            stat_modifier: None,
            choice_text: None,
            turn_number: None,
            pinned_dice: None,
        }
    }

    /// Pins the die for this check.
    #[must_use]
    pub fn with_pinned_dice(mut self, dice: u32) -> Self {
        self.pinned_dice = Some(dice);
        self
    }

    /// Rejects the submission unless `turn_number` is still current.
    #[must_use]
    pub fn for_turn(mut self, turn_number: u64) -> Self {
        self.turn_number = Some(turn_number);
        self
    }
}

/// Where the turn stands after a contribution lands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "progress", rename_all = "snake_case")]
pub enum SubmissionOutcome {
    /// Every active participant has contributed; the turn can be resolved.
    Accepted(TurnProgress),
    /// Still waiting on someone.
    Waiting(TurnProgress),
}

impl SubmissionOutcome {
    fn from_progress(progress: TurnProgress) -> Self {
        if progress.is_complete() {
            Self::Accepted(progress)
        } else {
            Self::Waiting(progress)
        }
    }

    /// The counts behind the outcome.
    #[must_use]
    pub fn progress(&self) -> TurnProgress {
        match self {
            Self::Accepted(p) | Self::Waiting(p) => *p,
        }
    }
}

/// A committed turn.
#[derive(Debug, Clone, Serialize)]
pub struct TurnResolution {
    /// The record after the merge.
    pub state: SessionState,
    /// The normalized generator result that was merged.
    pub result: ResolutionResult,
    /// Every check of the turn, in participant-id order.
    pub judged: Vec<JudgedContribution>,
    /// Party members whose contribution was synthesized at resolution.
    pub autonomous: Vec<String>,
}

/// Result of a resolution attempt.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "result", rename_all = "snake_case")]
pub enum TurnOutcome {
    /// The turn was merged and committed.
    Resolved(Box<TurnResolution>),
    /// Active participants are still missing; nothing changed.
    StillWaiting(TurnProgress),
}

/// Per-session state machine position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum SessionPhase {
    /// Collecting contributions for `turn_number`.
    AwaitingContributions {
        /// Current turn.
        turn_number: u64,
        /// Contributions so far.
        progress: TurnProgress,
    },
    /// A resolution of `turn_number` is in flight.
    Resolving {
        /// Turn being resolved.
        turn_number: u64,
    },
    /// The story has ended.
    Terminal {
        /// Turn the story ended on.
        turn_number: u64,
    },
}

/// Turn synchronization and resolution for every session.
pub struct TurnEngine {
    ports: EnginePorts,
    collector: TurnCollector,
    guard: ResolutionGuard,
    events: broadcast::Sender<TurnEvent>,
    config: EngineConfig,
}

impl std::fmt::Debug for TurnEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TurnEngine")
            .field("config", &self.config)
            .field("guard", &self.guard)
            .finish_non_exhaustive()
    }
}

impl TurnEngine {
    /// Wires an engine from its ports.
    #[must_use]
    pub fn new(ports: EnginePorts, config: EngineConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let collector = TurnCollector::new(Arc::clone(&ports.contributions));
        Self {
            ports,
            collector,
            guard: ResolutionGuard::new(),
            events,
            config,
        }
    }

    /// Receives every event emitted from now on, for all sessions.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        self.events.subscribe()
    }

    /// Creates a session at turn zero.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for a live session id, a bad party
    /// or a zero turn limit.
    pub async fn start_session(&self, command: &StartSession) -> Result<SessionState, DomainError> {
        let state = handle_start_session(command, self.ports.store.as_ref()).await?;
        self.collector.clear_contributions(state.session_id).await?;
        Ok(state)
    }

    /// Replaces the scene on offer.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StateNotFound` if the session is unknown.
    /// Returns `DomainError::Validation` for a malformed scene or a terminal
    /// session.
    pub async fn set_scene(&self, command: &SetScene) -> Result<SessionState, DomainError> {
        handle_set_scene(
            command,
            self.ports.store.as_ref(),
            self.ports.durable.as_ref(),
        )
        .await
    }

    /// Asks the narrative generator for the next turn's choices and puts
    /// them on offer.
    ///
    /// The generator runs without blocking submissions. The scene is only
    /// stored if the session is still on the same turn afterwards.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StateNotFound` if the session is unknown.
    /// Returns `DomainError::Validation` for a terminal session.
    /// Returns `DomainError::Generator` or `DomainError::Schema` if the
    /// generator fails or proposes nothing usable.
    /// Returns `DomainError::Concurrency` if a resolution is in flight or the
    /// turn moved on while the generator ran.
    #[instrument(skip(self))]
    pub async fn propose_scene(
        &self,
        session_id: Uuid,
        correlation_id: Uuid,
    ) -> Result<SessionState, DomainError> {
        let state = self.load_open(session_id).await?;
        let turn_number = state.turn_number;
        let scene = self.ports.orchestrator.propose_scene(&state).await?;

        let _permit = self.guard.try_write(session_id)?;
        let current = self.load_open(session_id).await?;
        if current.turn_number != turn_number {
            return Err(DomainError::Concurrency {
                session_id,
                reason: format!(
                    "scene was proposed for turn {turn_number} but the session is at turn {}",
                    current.turn_number
                ),
            });
        }
        let command = SetScene {
            correlation_id,
            session_id,
            scene: scene.clone(),
        };
        let next = handle_set_scene(
            &command,
            self.ports.store.as_ref(),
            self.ports.durable.as_ref(),
        )
        .await?;

        info!(turn_number, roles = scene.actions.len(), "scene proposed");
        self.emit(
            session_id,
            turn_number,
            correlation_id,
            TurnEventKind::SceneProposed { scene },
        );
        Ok(next)
    }

    /// Saves and drops a session along with any pending contributions and
    /// its seats.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StateNotFound` if the session is not live.
    /// Returns `DomainError::Concurrency` while a resolution is in flight.
    pub async fn end_session(&self, command: &EndSession) -> Result<SessionState, DomainError> {
        let session_id = command.session_id;
        let _permit = self.guard.try_write(session_id)?;
        let state = handle_end_session(
            command,
            self.ports.store.as_ref(),
            self.ports.durable.as_ref(),
        )
        .await?;
        self.forget(session_id).await?;
        Ok(state)
    }

    /// Sweeps expired session records and drops their contribution buckets
    /// and seats. Returns how many sessions were forgotten.
    ///
    /// # Errors
    ///
    /// Returns the first store error met during the sweep.
    #[instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<usize, DomainError> {
        let expired = self.ports.store.purge_expired().await?;
        let mut purged = 0;
        for session_id in expired {
            // Re-seeded from the durable store since it expired.
            if self.ports.store.get(session_id).await?.is_some() {
                continue;
            }
            self.forget(session_id).await?;
            purged += 1;
        }
        if purged > 0 {
            info!(purged, "expired sessions purged");
        }
        Ok(purged)
    }

    /// The latest session record.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StateNotFound` if neither store has the session.
    pub async fn get_state(&self, session_id: Uuid) -> Result<SessionState, DomainError> {
        self.load(session_id).await
    }

    /// Stores a participant's contribution for the current turn.
    ///
    /// Resubmitting replaces the earlier choice. Emits `turn_waiting` while
    /// active participants are still missing.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Concurrency` while the session is resolving.
    /// Returns `DomainError::Validation` for a terminal session, a stale
    /// turn number, an unknown or unseated participant, an unknown action,
    /// or a bad pinned die.
    /// Returns `DomainError::StateNotFound` if the session is unknown.
    #[instrument(skip(self, submission), fields(action = %submission.chosen_action_id, correlation_id = %submission.correlation_id))]
    pub async fn submit_contribution(
        &self,
        session_id: Uuid,
        participant_id: &str,
        submission: Submission,
    ) -> Result<SubmissionOutcome, DomainError> {
        let _permit = self.guard.try_write(session_id)?;
        let state = self.load_open(session_id).await?;
        if let Some(turn_number) = submission.turn_number {
            if turn_number != state.turn_number {
                return Err(DomainError::Validation(format!(
                    "submission for turn {turn_number}, current turn is {}",
                    state.turn_number
                )));
            }
        }

        let contribution = build_contribution(&state, participant_id, &submission)?;
        self.require_seated(&state, participant_id).await?;
        self.collector
            .store_contribution(session_id, state.turn_number, contribution)
            .await?;

        self.report_progress(&state, submission.correlation_id).await
    }

    /// Synthesizes and stores a contribution for one seat.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Concurrency` while the session is resolving.
    /// Returns `DomainError::Validation` for a terminal session, an unknown
    /// or unseated participant, or a role with no scene actions.
    /// Returns `DomainError::StateNotFound` if the session is unknown.
    #[instrument(skip(self))]
    pub async fn submit_autonomous(
        &self,
        session_id: Uuid,
        participant_id: &str,
        correlation_id: Uuid,
    ) -> Result<SubmissionOutcome, DomainError> {
        let _permit = self.guard.try_write(session_id)?;
        let state = self.load_open(session_id).await?;
        self.require_seated(&state, participant_id).await?;
        self.collector
            .submit_autonomous(&state, participant_id, &*self.ports.rng)
            .await?;
        self.report_progress(&state, correlation_id).await
    }

    /// Re-measures the current turn after the active set changed.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StateNotFound` if the session is unknown.
    pub async fn refresh_progress(
        &self,
        session_id: Uuid,
        correlation_id: Uuid,
    ) -> Result<SubmissionOutcome, DomainError> {
        let state = self.load(session_id).await?;
        self.report_progress(&state, correlation_id).await
    }

    /// Counts contributions for the current turn against the active set.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StateNotFound` if the session is unknown.
    pub async fn turn_progress(&self, session_id: Uuid) -> Result<TurnProgress, DomainError> {
        let state = self.load(session_id).await?;
        self.measure(&state).await
    }

    /// Where the session's state machine stands.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::StateNotFound` if the session is unknown.
    pub async fn phase(&self, session_id: Uuid) -> Result<SessionPhase, DomainError> {
        let state = self.load(session_id).await?;
        let turn_number = state.turn_number;
        if state.terminal {
            return Ok(SessionPhase::Terminal { turn_number });
        }
        if self.guard.is_in_flight(session_id) {
            return Ok(SessionPhase::Resolving { turn_number });
        }
        Ok(SessionPhase::AwaitingContributions {
            turn_number,
            progress: self.measure(&state).await?,
        })
    }

    /// Resolves the current turn if every active participant has contributed.
    ///
    /// Party members without a contribution (seats nobody holds) are filled
    /// autonomously before judging.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Concurrency` if a resolution is already in
    /// flight or the turn moved during this one.
    /// Returns `DomainError::Generator` or `DomainError::Schema` if the
    /// narrative step fails; the turn can be retried as is.
    /// Returns `DomainError::Validation` for a terminal session or a turn
    /// with nothing to resolve.
    /// Returns `DomainError::StateNotFound` if the session is unknown.
    #[instrument(skip(self))]
    pub async fn try_resolve_turn(
        &self,
        session_id: Uuid,
        correlation_id: Uuid,
    ) -> Result<TurnOutcome, DomainError> {
        let _lease = self.guard.acquire(session_id).await?;
        let state = self.load_open(session_id).await?;
        let turn_number = state.turn_number;

        let expected = self.expected_participants(&state).await?;
        let mut contributions = self.collector.snapshot(session_id, turn_number).await?;
        let progress = TurnProgress::measure(&contributions, &expected);
        if !progress.is_complete() {
            debug!(
                turn_number,
                submitted = progress.submitted,
                total = progress.total,
                "turn not complete"
            );
            return Ok(TurnOutcome::StillWaiting(progress));
        }

        let autonomous = fill_autonomous(&state, &mut contributions, &*self.ports.rng)?;
        if contributions.is_empty() {
            return Err(DomainError::Validation(format!(
                "turn {turn_number} has no contributions to resolve"
            )));
        }
        let judged = judge_contributions(&state, &contributions, &*self.ports.rng)?;

        let result = self.ports.orchestrator.resolve_turn(&state, &judged).await?;
        let next = commit_resolution(session_id, turn_number, &result, self.ports.store.as_ref())
            .await?;

        if self.config.snapshot_each_turn || next.terminal {
            if let Err(e) = self.ports.durable.save(&next).await {
                warn!(error = %e, turn_number = next.turn_number, "turn snapshot save failed");
            }
        }
        // A stale bucket is discarded by the next turn's first write anyway.
        if let Err(e) = self.collector.clear_turn(session_id, turn_number).await {
            warn!(error = %e, turn_number, "clearing resolved turn failed");
        }

        info!(
            turn_number = next.turn_number,
            judged = judged.len(),
            autonomous = autonomous.len(),
            terminal = next.terminal,
            "turn resolved"
        );

        self.emit(
            session_id,
            turn_number,
            correlation_id,
            TurnEventKind::TurnResolved {
                narration: result.narration.clone(),
                personal_narrations: result.personal_narrations.clone(),
                judged_results: judged.iter().map(|j| j.judgement.clone()).collect(),
                world_update: next.world.to_map(),
                party_update: next.party.clone(),
                terminal: next.terminal,
                image: result.image.clone(),
            },
        );
        if next.terminal {
            self.emit(
                session_id,
                turn_number,
                correlation_id,
                TurnEventKind::GameOver {
                    final_narration: result.narration.clone(),
                },
            );
        }

        Ok(TurnOutcome::Resolved(Box::new(TurnResolution {
            state: next,
            result,
            judged,
            autonomous,
        })))
    }

    async fn forget(&self, session_id: Uuid) -> Result<(), DomainError> {
        self.collector.clear_contributions(session_id).await?;
        self.ports.membership.close(session_id).await
    }

    async fn load(&self, session_id: Uuid) -> Result<SessionState, DomainError> {
        recover_state(
            session_id,
            self.ports.store.as_ref(),
            self.ports.durable.as_ref(),
        )
        .await
    }

    async fn load_open(&self, session_id: Uuid) -> Result<SessionState, DomainError> {
        let state = self.load(session_id).await?;
        if state.terminal {
            return Err(DomainError::Validation(format!(
                "session {session_id} has ended its story"
            )));
        }
        Ok(state)
    }

    /// Active participants that hold a party seat, in party order.
    async fn expected_participants(&self, state: &SessionState) -> Result<Vec<String>, DomainError> {
        let active: BTreeSet<String> = self
            .ports
            .membership
            .active_participants(state.session_id)
            .await?
            .into_iter()
            .collect();
        Ok(state
            .party
            .iter()
            .filter(|m| active.contains(&m.id))
            .map(|m| m.id.clone())
            .collect())
    }

    async fn require_seated(
        &self,
        state: &SessionState,
        participant_id: &str,
    ) -> Result<(), DomainError> {
        if state.member(participant_id).is_none() {
            return Err(DomainError::Validation(format!(
                "participant {participant_id} is not in the party"
            )));
        }
        let expected = self.expected_participants(state).await?;
        if !expected.iter().any(|id| id == participant_id) {
            return Err(DomainError::Validation(format!(
                "participant {participant_id} is not seated at session {}",
                state.session_id
            )));
        }
        Ok(())
    }

    async fn measure(&self, state: &SessionState) -> Result<TurnProgress, DomainError> {
        let expected = self.expected_participants(state).await?;
        self.collector
            .progress(state.session_id, state.turn_number, &expected)
            .await
    }

    async fn report_progress(
        &self,
        state: &SessionState,
        correlation_id: Uuid,
    ) -> Result<SubmissionOutcome, DomainError> {
        let progress = self.measure(state).await?;
        if !progress.is_complete() {
            self.emit(
                state.session_id,
                state.turn_number,
                correlation_id,
                TurnEventKind::TurnWaiting {
                    submitted_count: progress.submitted,
                    total_count: progress.total,
                },
            );
        }
        Ok(SubmissionOutcome::from_progress(progress))
    }

    fn emit(&self, session_id: Uuid, turn_number: u64, correlation_id: Uuid, kind: TurnEventKind) {
        let event = TurnEvent {
            metadata: EventMetadata {
                event_id: Uuid::new_v4(),
                event_type: kind.name().to_owned(),
                session_id,
                turn_number,
                correlation_id,
                occurred_at: self.ports.clock.now(),
            },
            kind,
        };
        let event_type = event.kind.name();
        // No subscribers is not an error.
        let receivers = self.events.send(event).unwrap_or(0);
        debug!(%session_id, turn_number, event_type, receivers, "turn event emitted");
    }
}

fn build_contribution(
    state: &SessionState,
    participant_id: &str,
    submission: &Submission,
) -> Result<Contribution, DomainError> {
    let member = state.member(participant_id).ok_or_else(|| {
        DomainError::Validation(format!("participant {participant_id} is not in the party"))
    })?;
    if submission.chosen_action_id.trim().is_empty() {
        return Err(DomainError::Validation(
            "chosen_action_id must not be empty".to_owned(),
        ));
    }

    let offered = state.scene.actions_for(&member.role);
    let mut contribution = if offered.is_empty() {
        let applied_stat = submission.applied_stat.clone().ok_or_else(|| {
            DomainError::Validation(format!(
                "role {} has no scene actions; applied_stat is required",
                member.role
            ))
        })?;
        Contribution {
            participant_id: participant_id.to_owned(),
            chosen_action_id: submission.chosen_action_id.clone(),
            applied_stat,
            stat_modifier: 0,
            choice_text: String::new(),
            autonomous: false,
            pinned_dice: None,
        }
    } else {
        let action = offered
            .iter()
            .find(|a| a.id == submission.chosen_action_id)
            .ok_or_else(|| {
                DomainError::Validation(format!(
                    "action {} is not offered to role {}",
                    submission.chosen_action_id, member.role
                ))
            })?;
        let mut contribution = Contribution::from_action(participant_id, action);
        if let Some(stat) = &submission.applied_stat {
            contribution.applied_stat.clone_from(stat);
        }
        contribution
    };

    if let Some(modifier) = submission.stat_modifier {
        contribution.stat_modifier = modifier;
    }
    if let Some(text) = &submission.choice_text {
        contribution.choice_text.clone_from(text);
    }
    if let Some(dice) = submission.pinned_dice {
        if !(1..=DIE_FACES).contains(&dice) {
            return Err(DomainError::Validation(format!(
                "pinned dice {dice} is outside 1..={DIE_FACES}"
            )));
        }
        contribution = contribution.with_pinned_dice(dice);
    }
    Ok(contribution)
}
