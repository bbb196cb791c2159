//! Scene renders from an OpenAI-compatible images endpoint.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tabletale_core::error::DomainError;
use tracing::{error, instrument};

use crate::ports::SceneImageGenerator;

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    prompt: &'a str,
    n: u8,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    url: Option<String>,
}

/// Images endpoint client.
#[derive(Debug, Clone)]
pub struct HttpSceneImageGenerator {
    client: Client,
    url: String,
    api_key: String,
    size: String,
}

impl HttpSceneImageGenerator {
    /// Creates a client posting to `url`; an empty `api_key` sends no auth.
    #[must_use]
    pub fn new(url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            url: url.into(),
            api_key: api_key.into(),
            size: "1024x1024".to_owned(),
        }
    }
}

#[async_trait]
impl SceneImageGenerator for HttpSceneImageGenerator {
    #[instrument(skip(self, prompt), fields(prompt_len = prompt.len()))]
    async fn render(&self, prompt: &str) -> Result<String, DomainError> {
        let body = ImageRequest {
            prompt,
            n: 1,
            size: &self.size,
        };
        let mut call = self.client.post(&self.url).json(&body);
        if !self.api_key.is_empty() {
            call = call.bearer_auth(&self.api_key);
        }

        let response = call.send().await.map_err(|e| {
            error!(error = %e, "image request failed");
            DomainError::Generator(format!("image request failed: {e}"))
        })?;
        if !response.status().is_success() {
            let status = response.status();
            error!(%status, "image endpoint returned an error");
            return Err(DomainError::Generator(format!(
                "image endpoint returned {status}"
            )));
        }

        let parsed: ImageResponse = response
            .json()
            .await
            .map_err(|e| DomainError::Generator(format!("unreadable image response: {e}")))?;
        parsed
            .data
            .into_iter()
            .find_map(|d| d.url)
            .ok_or_else(|| DomainError::Generator("image response carried no url".to_owned()))
    }
}
