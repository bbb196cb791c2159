//! Narrative generator backed by an OpenAI-compatible chat completions API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tabletale_core::error::DomainError;
use tracing::{debug, error, instrument};

use crate::ports::{NarrativeGenerator, NarrativeRequest};

const SYSTEM_PROMPT: &str = "You are the game master of a cooperative tabletop story. \
Narrate the outcome of every judged choice, respecting each grade, and keep the world consistent.";

/// Connection and sampling settings.
#[derive(Debug, Clone)]
pub struct ChatCompletionsConfig {
    /// Full URL of the chat completions endpoint.
    pub url: String,
    /// Bearer token; omitted from the request when empty.
    pub api_key: String,
    /// Model name.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Nucleus sampling cutoff.
    pub top_p: f32,
    /// Reply length cap.
    pub max_tokens: u32,
}

impl ChatCompletionsConfig {
    /// Settings with the default sampling parameters.
    #[must_use]
    pub fn new(url: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            api_key: api_key.into(),
            model: model.into(),
            temperature: 0.7,
            top_p: 0.95,
            max_tokens: 2500,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    top_p: f32,
    max_tokens: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completions client.
#[derive(Debug, Clone)]
pub struct ChatCompletionsGenerator {
    client: Client,
    config: ChatCompletionsConfig,
}

impl ChatCompletionsGenerator {
    /// Creates a generator for `config`.
    #[must_use]
    pub fn new(config: ChatCompletionsConfig) -> Self {
        debug!(model = %config.model, "creating chat completions generator");
        Self {
            client: Client::new(),
            config,
        }
    }

    fn build_request<'a>(
        &'a self,
        request: &NarrativeRequest,
    ) -> Result<ChatRequest<'a>, DomainError> {
        let context = serde_json::to_string(&request.context).map_err(|e| {
            DomainError::Infrastructure(format!("context serialization failed: {e}"))
        })?;
        Ok(ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: format!("{SYSTEM_PROMPT}\n\n{}", request.response_contract),
                },
                ChatMessage {
                    role: "user",
                    content: context,
                },
            ],
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            max_tokens: self.config.max_tokens,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        })
    }
}

#[async_trait]
impl NarrativeGenerator for ChatCompletionsGenerator {
    #[instrument(skip(self, request), fields(model = %self.config.model, session_id = %request.context.session_id))]
    async fn generate(&self, request: &NarrativeRequest) -> Result<String, DomainError> {
        let body = self.build_request(request)?;
        let mut call = self.client.post(&self.config.url).json(&body);
        if !self.config.api_key.is_empty() {
            call = call.bearer_auth(&self.config.api_key);
        }

        let response = call.send().await.map_err(|e| {
            error!(error = %e, "chat completions request failed");
            DomainError::Generator(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, body = %body, "chat completions endpoint returned an error");
            return Err(DomainError::Generator(format!(
                "generator returned {status}"
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| {
            error!(error = %e, "chat completions response unreadable");
            DomainError::Generator(format!("unreadable response: {e}"))
        })?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| DomainError::Generator("response carried no content".to_owned()))?;
        debug!(response_len = content.len(), "generator replied");
        Ok(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::context::NarrativeContext;
    use tabletale_session::domain::state::SessionState;
    use uuid::Uuid;

    #[test]
    fn test_request_carries_contract_context_and_json_mode() {
        let generator = ChatCompletionsGenerator::new(ChatCompletionsConfig::new(
            "http://localhost:9/v1/chat/completions",
            "",
            "story-model",
        ));
        let state = SessionState::new(Uuid::new_v4());
        let request = NarrativeRequest::new(NarrativeContext::build(&state, &[], 12, 5));

        let body = serde_json::to_value(generator.build_request(&request).unwrap()).unwrap();

        assert_eq!(body["model"], "story-model");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["messages"][0]["role"], "system");
        assert!(
            body["messages"][0]["content"]
                .as_str()
                .unwrap()
                .contains("personal_narrations")
        );
        let user: serde_json::Value =
            serde_json::from_str(body["messages"][1]["content"].as_str().unwrap()).unwrap();
        assert_eq!(user["session_id"], state.session_id.to_string());
    }

    #[test]
    fn test_response_content_is_read_from_first_choice() {
        let parsed: ChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{"message": {"role": "assistant", "content": "{\"narration\": \"x\"}"}}]
        }))
        .unwrap();

        assert_eq!(
            parsed.choices[0].message.content.as_deref(),
            Some("{\"narration\": \"x\"}")
        );
    }
}
