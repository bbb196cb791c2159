//! Tabletale: HTTP and WebSocket surface over the turn engine.

use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod telemetry;

use crate::state::AppState;

/// Builds the full router.
pub fn app(state: AppState) -> Router {
    let sessions = routes::sessions::router()
        .merge(routes::turns::router())
        .merge(routes::events::router());

    // TODO: Replace CorsLayer::permissive() with configured origins once a browser client exists.
    Router::new()
        .merge(routes::health::router())
        .nest("/api/v1/sessions", sessions)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
