//! Shared application state.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tabletale_core::clock::Clock;
use tabletale_core::rng::DeterministicRng;
use tabletale_engine::{EngineConfig, EnginePorts, InMemoryRoomMembership, TurnEngine};
use tabletale_narrative::application::orchestrator::{NarrativeOrchestrator, OrchestratorConfig};
use tabletale_narrative::ports::{NarrativeGenerator, SceneImageGenerator};
use tabletale_session::memory::InMemorySessionStore;
use tabletale_session::repository::PersistentStore;
use tabletale_turns::memory::InMemoryContributionStore;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::config::AppConfig;

/// Outside collaborators the state is wired from.
pub struct Collaborators {
    /// Narrative generator.
    pub generator: Arc<dyn NarrativeGenerator>,
    /// Scene renderer, when enabled.
    pub images: Option<Arc<dyn SceneImageGenerator>>,
    /// Durable snapshot store.
    pub durable: Arc<dyn PersistentStore>,
    /// Dice and autonomous picks.
    pub rng: Arc<Mutex<dyn DeterministicRng>>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

/// Application state shared across all request handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    /// The turn engine.
    pub engine: Arc<TurnEngine>,
    /// Seats per session, driven by the participant routes.
    pub membership: Arc<InMemoryRoomMembership>,
    /// Turn limit applied when a new session does not set one.
    pub default_max_turns: u64,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        engine: Arc<TurnEngine>,
        membership: Arc<InMemoryRoomMembership>,
        default_max_turns: u64,
    ) -> Self {
        Self {
            engine,
            membership,
            default_max_turns,
        }
    }

    /// Wires the engine with in-memory caches around the given collaborators.
    #[must_use]
    pub fn assemble(config: &AppConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            generator,
            images,
            durable,
            rng,
            clock,
        } = collaborators;

        let orchestrator_config = OrchestratorConfig {
            generation_timeout: config.narrative.timeout,
            log_window: config.log_window,
            image_enabled: images.is_some(),
            ..OrchestratorConfig::default()
        };
        let mut orchestrator = NarrativeOrchestrator::new(generator, orchestrator_config);
        if let Some(images) = images {
            orchestrator = orchestrator.with_images(images);
        }

        let membership = Arc::new(InMemoryRoomMembership::new());
        let ports = EnginePorts {
            store: Arc::new(InMemorySessionStore::new(
                config.session_ttl,
                Arc::clone(&clock),
            )),
            durable,
            contributions: Arc::new(InMemoryContributionStore::new()),
            membership: membership.clone(),
            orchestrator,
            rng,
            clock,
        };
        let engine = Arc::new(TurnEngine::new(ports, EngineConfig::default()));

        Self::new(engine, membership, config.max_turns)
    }

    /// Sweeps expired sessions every `every` until the task is aborted.
    #[must_use]
    pub fn spawn_expiry_sweep(&self, every: Duration) -> JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(e) = engine.purge_expired().await {
                    tracing::warn!(error = %e, "expiry sweep failed");
                }
            }
        })
    }
}
