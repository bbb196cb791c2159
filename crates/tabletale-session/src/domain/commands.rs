//! Commands for the Session state context.

use tabletale_core::command::Command;
use uuid::Uuid;

use super::scene::Scene;
use super::state::{DifficultyTier, PartyMember, Scenario, World};

/// Command to start a new session.
#[derive(Debug, Clone)]
pub struct StartSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session to create.
    pub session_id: Uuid,
    /// Scenario headline.
    pub scenario: Scenario,
    /// Opening world facts.
    pub world: World,
    /// Party in seating order.
    pub party: Vec<PartyMember>,
    /// Check difficulty.
    pub difficulty_tier: DifficultyTier,
    /// Pacing length; `None` keeps the default.
    pub max_turns: Option<u64>,
}

impl Command for StartSession {
    fn command_type(&self) -> &'static str {
        "session.start"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn session_id(&self) -> Uuid {
        self.session_id
    }
}

/// Command to replace the scene on offer.
#[derive(Debug, Clone)]
pub struct SetScene {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session to update.
    pub session_id: Uuid,
    /// The new scene.
    pub scene: Scene,
}

impl Command for SetScene {
    fn command_type(&self) -> &'static str {
        "session.set_scene"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn session_id(&self) -> Uuid {
        self.session_id
    }
}

/// Command to tear a session down.
#[derive(Debug, Clone)]
pub struct EndSession {
    /// The correlation ID for tracing.
    pub correlation_id: Uuid,
    /// The session to end.
    pub session_id: Uuid,
}

impl Command for EndSession {
    fn command_type(&self) -> &'static str {
        "session.end"
    }

    fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    fn session_id(&self) -> Uuid {
        self.session_id
    }
}
