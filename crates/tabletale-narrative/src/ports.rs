//! Outbound ports to external generators.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tabletale_core::error::DomainError;

use crate::domain::context::NarrativeContext;

/// Keys the generator is asked to return, with their expected shapes.
pub const RESPONSE_CONTRACT: &str = r#"Reply with one JSON object and nothing else:
{
  "narration": string,
  "personal_narrations": {"<party id>": string},
  "world_delta": {"<world key>": value},
  "party_deltas": [{"id": "<party id>", "changes": {"hp": int, "status": [string], "hurt": bool}}],
  "log_append": [{"turn": int, "narration": string, "events": [string]}],
  "inventory_delta": {
    "consumed": {"<party id>": [string]},
    "added": {"<party id>": [string | {"name": string, "charges": int}]},
    "charges": {"<party id>": {"<item or spell>": int}}
  },
  "skill_cooldown_delta": {"<party id>": {"<skill>": int}},
  "terminal": bool
}
Only reference party ids listed in the context. Set "terminal" to true when pacing is "finale"."#;

/// Keys the generator is asked to return when proposing the next scene.
pub const SCENE_CONTRACT: &str = r#"Propose the choices for the next turn. Reply with one JSON object and nothing else:
{
  "turn": int,
  "title": string,
  "options": {
    "<party id>": [{"id": "A", "text": string, "applied_stat": "<stat>", "stat_modifier": int, "tags": [string]}]
  }
}
Offer two to four options per party id listed in the context, ids "A" to "D".
Each option is one concrete step that follows from the latest log entry."#;

/// What the orchestrator sends to a narrative generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrativeRequest {
    /// Turn context.
    pub context: NarrativeContext,
    /// Output contract the reply must follow.
    pub response_contract: String,
}

impl NarrativeRequest {
    /// A request for `context` under the standard contract.
    #[must_use]
    pub fn new(context: NarrativeContext) -> Self {
        Self {
            context,
            response_contract: RESPONSE_CONTRACT.to_owned(),
        }
    }

    /// A request for the next scene's choices in `context`.
    #[must_use]
    pub fn proposal(context: NarrativeContext) -> Self {
        Self {
            context,
            response_contract: SCENE_CONTRACT.to_owned(),
        }
    }
}

/// Produces the raw text of a turn's outcome.
#[async_trait]
pub trait NarrativeGenerator: Send + Sync {
    /// Returns the generator's unparsed reply.
    async fn generate(&self, request: &NarrativeRequest) -> Result<String, DomainError>;
}

/// Renders a scene image and returns where it can be fetched.
#[async_trait]
pub trait SceneImageGenerator: Send + Sync {
    /// Returns the URL of the rendered image.
    async fn render(&self, prompt: &str) -> Result<String, DomainError>;
}
