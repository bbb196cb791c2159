//! Events broadcast to everyone watching a session.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tabletale_core::event::{DomainEvent, EventMetadata};
use tabletale_rules::domain::judgement::JudgementResult;
use tabletale_session::domain::scene::Scene;
use tabletale_session::domain::state::PartyMember;
use tabletale_world_state::domain::resolution::SceneImage;

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnEventKind {
    /// A contribution arrived but the turn is not complete.
    TurnWaiting {
        /// Expected participants that have contributed.
        submitted_count: usize,
        /// Expected participants.
        total_count: usize,
    },
    /// A turn was merged and committed.
    TurnResolved {
        /// Shared narration.
        narration: String,
        /// Per-participant narration.
        personal_narrations: BTreeMap<String, String>,
        /// Every judged check of the turn.
        judged_results: Vec<JudgementResult>,
        /// World after the merge.
        world_update: Map<String, Value>,
        /// Party after the merge.
        party_update: Vec<PartyMember>,
        /// Whether the story ended.
        terminal: bool,
        /// Scene render, if one was requested.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image: Option<SceneImage>,
    },
    /// The generator proposed the choices for the coming turn.
    SceneProposed {
        /// The scene now on offer.
        scene: Scene,
    },
    /// The story ended.
    GameOver {
        /// Narration of the last turn.
        final_narration: String,
    },
}

impl TurnEventKind {
    /// Stable type name, also the `type` tag on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::TurnWaiting { .. } => "turn_waiting",
            Self::TurnResolved { .. } => "turn_resolved",
            Self::SceneProposed { .. } => "scene_proposed",
            Self::GameOver { .. } => "game_over",
        }
    }
}

/// A turn event with its envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnEvent {
    /// Envelope.
    pub metadata: EventMetadata,
    /// Payload.
    #[serde(flatten)]
    pub kind: TurnEventKind,
}

impl DomainEvent for TurnEvent {
    fn event_type(&self) -> &'static str {
        self.kind.name()
    }

    fn to_payload(&self) -> Value {
        serde_json::to_value(&self.kind).unwrap_or(Value::Null)
    }

    fn metadata(&self) -> &EventMetadata {
        &self.metadata
    }
}
