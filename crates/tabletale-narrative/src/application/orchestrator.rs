//! Drives one turn through the narrative generator.

use std::sync::Arc;
use std::time::Duration;

use tabletale_core::error::DomainError;
use tabletale_rules::domain::judgement::JudgedContribution;
use tabletale_session::domain::scene::Scene;
use tabletale_session::domain::state::SessionState;
use tabletale_world_state::domain::resolution::{ResolutionResult, SceneImage};
use tokio::time::timeout;
use tracing::{info, instrument, warn};

use crate::domain::context::{DEFAULT_CAPABILITY_LIMIT, DEFAULT_LOG_WINDOW, NarrativeContext};
use crate::domain::extraction::extract_json_block;
use crate::domain::normalize::normalize;
use crate::domain::scene_proposal::normalize_scene;
use crate::domain::scene_prompt::build_scene_prompt;
use crate::ports::{NarrativeGenerator, NarrativeRequest, SceneImageGenerator};

/// Orchestrator settings.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Upper bound on one generator call.
    pub generation_timeout: Duration,
    /// Upper bound on one render call.
    pub image_timeout: Duration,
    /// Log entries included in the context.
    pub log_window: usize,
    /// Entries per capability section.
    pub capability_limit: usize,
    /// Whether to request a scene render after each turn.
    pub image_enabled: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            generation_timeout: Duration::from_secs(60),
            image_timeout: Duration::from_secs(60),
            log_window: DEFAULT_LOG_WINDOW,
            capability_limit: DEFAULT_CAPABILITY_LIMIT,
            image_enabled: false,
        }
    }
}

/// Turns judged contributions into a normalized resolution.
#[derive(Clone)]
pub struct NarrativeOrchestrator {
    generator: Arc<dyn NarrativeGenerator>,
    images: Option<Arc<dyn SceneImageGenerator>>,
    config: OrchestratorConfig,
}

impl std::fmt::Debug for NarrativeOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NarrativeOrchestrator")
            .field("config", &self.config)
            .field("images", &self.images.is_some())
            .finish_non_exhaustive()
    }
}

impl NarrativeOrchestrator {
    /// Creates an orchestrator without scene renders.
    #[must_use]
    pub fn new(generator: Arc<dyn NarrativeGenerator>, config: OrchestratorConfig) -> Self {
        Self {
            generator,
            images: None,
            config,
        }
    }

    /// Attaches a scene renderer; used only when `image_enabled` is set.
    #[must_use]
    pub fn with_images(mut self, images: Arc<dyn SceneImageGenerator>) -> Self {
        self.images = Some(images);
        self
    }

    /// The active settings.
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Resolves one turn. Never touches stored state.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Generator` if the generator fails or exceeds the
    /// timeout.
    /// Returns `DomainError::Schema` if its reply holds no JSON object.
    #[instrument(skip_all, fields(session_id = %state.session_id, turn_number = state.turn_number))]
    pub async fn resolve_turn(
        &self,
        state: &SessionState,
        judged: &[JudgedContribution],
    ) -> Result<ResolutionResult, DomainError> {
        let context = NarrativeContext::build(
            state,
            judged,
            self.config.log_window,
            self.config.capability_limit,
        );
        let raw = self.generate_json(&NarrativeRequest::new(context)).await?;
        let mut result = normalize(state, &raw)?;

        if self.config.image_enabled {
            if let Some(images) = &self.images {
                result.image = Some(self.render_scene(images.as_ref(), state, &result).await);
            }
        }

        info!(
            judged = judged.len(),
            terminal = result.terminal,
            image = result.image.as_ref().is_some_and(|i| i.url.is_some()),
            "turn resolved by generator"
        );
        Ok(result)
    }

    /// Asks the generator for the choices of the next turn. Never touches
    /// stored state.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Generator` if the generator fails or exceeds the
    /// timeout.
    /// Returns `DomainError::Schema` if its reply holds no JSON object or
    /// offers nothing to any party role.
    #[instrument(skip_all, fields(session_id = %state.session_id, turn_number = state.turn_number))]
    pub async fn propose_scene(&self, state: &SessionState) -> Result<Scene, DomainError> {
        let context = NarrativeContext::build(
            state,
            &[],
            self.config.log_window,
            self.config.capability_limit,
        );
        let raw = self.generate_json(&NarrativeRequest::proposal(context)).await?;
        let scene = normalize_scene(state, &raw)?;

        info!(
            roles = scene.actions.len(),
            options = scene.actions.values().map(Vec::len).sum::<usize>(),
            "scene proposed by generator"
        );
        Ok(scene)
    }

    async fn generate_json(
        &self,
        request: &NarrativeRequest,
    ) -> Result<serde_json::Value, DomainError> {
        let reply = match timeout(self.config.generation_timeout, self.generator.generate(request))
            .await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(DomainError::Generator(reason))) => {
                warn!(%reason, "narrative generator failed");
                return Err(DomainError::Generator(reason));
            }
            Ok(Err(other)) => {
                warn!(error = %other, "narrative generator failed");
                return Err(DomainError::Generator(other.to_string()));
            }
            Err(_) => {
                warn!(
                    timeout_secs = self.config.generation_timeout.as_secs_f64(),
                    "narrative generator timed out"
                );
                return Err(DomainError::Generator(format!(
                    "no reply within {:?}",
                    self.config.generation_timeout
                )));
            }
        };

        let block = extract_json_block(&reply).ok_or_else(|| {
            warn!(reply_len = reply.len(), "generator reply holds no JSON object");
            DomainError::Schema("generator reply holds no JSON object".to_owned())
        })?;
        serde_json::from_str(&block).map_err(|e| {
            warn!(error = %e, "generator reply is not valid JSON");
            DomainError::Schema(format!("generator reply is not valid JSON: {e}"))
        })
    }

    async fn render_scene(
        &self,
        images: &dyn SceneImageGenerator,
        state: &SessionState,
        result: &ResolutionResult,
    ) -> SceneImage {
        let prompt = build_scene_prompt(state, Some(result));
        let (url, error) = match timeout(self.config.image_timeout, images.render(&prompt)).await {
            Ok(Ok(url)) => (Some(url), None),
            Ok(Err(e)) => {
                warn!(error = %e, "scene render failed");
                (None, Some(e.to_string()))
            }
            Err(_) => {
                warn!("scene render timed out");
                (None, Some("scene render timed out".to_owned()))
            }
        };
        SceneImage {
            url,
            error,
            prompt: Some(prompt),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tabletale_rules::domain::judgement::{Grade, JudgementResult};
    use tabletale_session::domain::contribution::Contribution;
    use tabletale_session::domain::state::{CharacterSheet, PartyMember};
    use uuid::Uuid;

    use super::*;
    use crate::ports::SCENE_CONTRACT;

    struct ScriptedGenerator {
        reply: Result<String, DomainError>,
        delay: Option<Duration>,
        requests: Mutex<Vec<NarrativeRequest>>,
    }

    impl ScriptedGenerator {
        fn replying(reply: &str) -> Self {
            Self {
                reply: Ok(reply.to_owned()),
                delay: None,
                requests: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl NarrativeGenerator for ScriptedGenerator {
        async fn generate(&self, request: &NarrativeRequest) -> Result<String, DomainError> {
            self.requests.lock().unwrap().push(request.clone());
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.reply.clone()
        }
    }

    struct FailingImages;

    #[async_trait]
    impl SceneImageGenerator for FailingImages {
        async fn render(&self, _prompt: &str) -> Result<String, DomainError> {
            Err(DomainError::Generator("quota exhausted".to_owned()))
        }
    }

    fn state() -> SessionState {
        let mut state = SessionState::new(Uuid::new_v4());
        state.party = vec![PartyMember {
            id: "p1".to_owned(),
            name: "Ilse".to_owned(),
            role: "scout".to_owned(),
            sheet: CharacterSheet::default(),
            memory: String::new(),
        }];
        state
    }

    fn judged() -> Vec<JudgedContribution> {
        vec![JudgedContribution {
            contribution: Contribution {
                participant_id: "p1".to_owned(),
                chosen_action_id: "A".to_owned(),
                applied_stat: "dexterity".to_owned(),
                stat_modifier: 0,
                choice_text: "climb".to_owned(),
                autonomous: false,
                pinned_dice: None,
            },
            judgement: JudgementResult {
                participant_id: "p1".to_owned(),
                dice: 12,
                stat_value: 0,
                modifier: 0,
                total: 12,
                difficulty_class: 13,
                grade: Grade::Failure,
            },
        }]
    }

    #[tokio::test]
    async fn test_fenced_reply_is_normalized() {
        // Arrange
        let generator = Arc::new(ScriptedGenerator::replying(
            "Turn result:\n```json\n{\"narration\": \"You slip.\", \"terminal\": false}\n```",
        ));
        let orchestrator = NarrativeOrchestrator::new(generator.clone(), OrchestratorConfig::default());

        // Act
        let result = orchestrator.resolve_turn(&state(), &judged()).await.unwrap();

        // Assert
        assert_eq!(result.narration, "You slip.");
        assert_eq!(result.personal_narrations["p1"], "");
        assert!(result.image.is_none());
        let requests = generator.requests.lock().unwrap();
        assert_eq!(requests[0].context.choices[0].choice_text, "climb");
    }

    #[tokio::test]
    async fn test_generator_error_maps_to_generator() {
        let generator = Arc::new(ScriptedGenerator {
            reply: Err(DomainError::Infrastructure("socket closed".to_owned())),
            delay: None,
            requests: Mutex::new(Vec::new()),
        });
        let orchestrator = NarrativeOrchestrator::new(generator, OrchestratorConfig::default());

        let result = orchestrator.resolve_turn(&state(), &judged()).await;

        assert!(matches!(result, Err(DomainError::Generator(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_generator_times_out() {
        let generator = Arc::new(ScriptedGenerator {
            reply: Ok("{}".to_owned()),
            delay: Some(Duration::from_secs(120)),
            requests: Mutex::new(Vec::new()),
        });
        let orchestrator = NarrativeOrchestrator::new(generator, OrchestratorConfig::default());

        let result = orchestrator.resolve_turn(&state(), &judged()).await;

        assert!(matches!(result, Err(DomainError::Generator(_))));
    }

    #[tokio::test]
    async fn test_prose_only_reply_is_schema_error() {
        let generator = Arc::new(ScriptedGenerator::replying("The story cannot go on."));
        let orchestrator = NarrativeOrchestrator::new(generator, OrchestratorConfig::default());

        let result = orchestrator.resolve_turn(&state(), &judged()).await;

        assert!(matches!(result, Err(DomainError::Schema(_))));
    }

    #[tokio::test]
    async fn test_broken_json_is_schema_error() {
        let generator = Arc::new(ScriptedGenerator::replying("{\"narration\": }"));
        let orchestrator = NarrativeOrchestrator::new(generator, OrchestratorConfig::default());

        let result = orchestrator.resolve_turn(&state(), &judged()).await;

        assert!(matches!(result, Err(DomainError::Schema(_))));
    }

    #[tokio::test]
    async fn test_proposed_scene_is_keyed_by_role() {
        // Arrange
        let generator = Arc::new(ScriptedGenerator::replying(
            r#"Next up: {"turn": 1, "options": {"p1": [{"id": "A", "text": "Ford the river", "tags": ["risky"]}], "p7": [{"id": "A", "text": "Lurk"}]}}"#,
        ));
        let orchestrator = NarrativeOrchestrator::new(generator.clone(), OrchestratorConfig::default());

        // Act
        let scene = orchestrator.propose_scene(&state()).await.unwrap();

        // Assert
        assert_eq!(scene.title, "Turn 1");
        assert_eq!(scene.actions.len(), 1);
        assert_eq!(scene.actions_for("scout")[0].text, "Ford the river");
        let requests = generator.requests.lock().unwrap();
        assert_eq!(requests[0].response_contract, SCENE_CONTRACT);
        assert!(requests[0].context.choices.is_empty());
    }

    #[tokio::test]
    async fn test_proposal_without_options_is_schema_error() {
        let generator = Arc::new(ScriptedGenerator::replying("{\"narration\": \"Dawn.\"}"));
        let orchestrator = NarrativeOrchestrator::new(generator, OrchestratorConfig::default());

        let result = orchestrator.propose_scene(&state()).await;

        assert!(matches!(result, Err(DomainError::Schema(_))));
    }

    #[tokio::test]
    async fn test_failed_render_is_attached_not_raised() {
        // Arrange
        let generator = Arc::new(ScriptedGenerator::replying("{\"narration\": \"Dawn.\"}"));
        let config = OrchestratorConfig {
            image_enabled: true,
            ..OrchestratorConfig::default()
        };
        let orchestrator =
            NarrativeOrchestrator::new(generator, config).with_images(Arc::new(FailingImages));

        // Act
        let result = orchestrator.resolve_turn(&state(), &judged()).await.unwrap();

        // Assert
        let image = result.image.unwrap();
        assert!(image.url.is_none());
        assert!(image.error.unwrap().contains("quota exhausted"));
        assert!(image.prompt.unwrap().contains("Dawn."));
    }
}
