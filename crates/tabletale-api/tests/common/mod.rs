//! Shared test helpers for API integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use tabletale_api::config::AppConfig;
use tabletale_api::state::{AppState, Collaborators};
use tabletale_core::clock::Clock;
use tabletale_core::error::DomainError;
use tabletale_core::rng::DeterministicRng;
use tabletale_narrative::ports::{NarrativeGenerator, NarrativeRequest};
use tabletale_session::memory::InMemoryPersistentStore;
use tabletale_test_support::{FixedClock, SequenceRng};
use tower::ServiceExt;

/// Generator that always answers with the same text.
pub struct CannedGenerator(pub Result<String, DomainError>);

#[async_trait]
impl NarrativeGenerator for CannedGenerator {
    async fn generate(&self, _request: &NarrativeRequest) -> Result<String, DomainError> {
        self.0.clone()
    }
}

/// Config with only the generator URL set.
pub fn test_config() -> AppConfig {
    AppConfig::from_lookup(|key| match key {
        "NARRATIVE_API_URL" => Some("http://generator.test/v1/chat/completions".to_owned()),
        _ => None,
    })
    .unwrap()
}

/// Build the full app router around a canned generator reply and a fixed
/// dice sequence. Uses the same route structure as `main.rs`.
pub fn build_test_app(reply: Result<&str, DomainError>, rolls: Vec<u32>) -> Router {
    let clock: Arc<dyn Clock> = Arc::new(FixedClock::default());
    let rng: Arc<Mutex<dyn DeterministicRng>> = Arc::new(Mutex::new(SequenceRng::new(rolls)));
    let state = AppState::assemble(
        &test_config(),
        Collaborators {
            generator: Arc::new(CannedGenerator(reply.map(str::to_owned))),
            images: None,
            durable: Arc::new(InMemoryPersistentStore::new()),
            rng,
            clock,
        },
    );
    tabletale_api::app(state)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body_bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = if body_bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body_bytes).unwrap()
    };

    (status, json)
}

/// Send a request with a JSON body and return the response.
pub async fn send_json(
    app: Router,
    method: &str,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(body).unwrap()))
        .unwrap();
    send(app, request).await
}

/// Send a POST request with a JSON body and return the response.
pub async fn post_json(
    app: Router,
    uri: &str,
    body: &serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    send_json(app, "POST", uri, body).await
}

/// Send a bodiless request and return the response.
pub async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, serde_json::Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

/// Send a GET request and return the response.
pub async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
    call(app, "GET", uri).await
}
