//! Tabletale API server entry point.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use sqlx::postgres::PgPoolOptions;
use tabletale_api::config::AppConfig;
use tabletale_api::error::AppError;
use tabletale_api::state::{AppState, Collaborators};
use tabletale_api::{app, telemetry};
use tabletale_core::clock::SystemClock;
use tabletale_core::rng::{DeterministicRng, SystemRng};
use tabletale_narrative::adapters::chat_completions::{
    ChatCompletionsConfig, ChatCompletionsGenerator,
};
use tabletale_narrative::adapters::images::HttpSceneImageGenerator;
use tabletale_narrative::ports::SceneImageGenerator;
use tabletale_session::memory::NullPersistentStore;
use tabletale_session::repository::PersistentStore;
use tabletale_state_store::pg_snapshot_store::PgSnapshotStore;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let config = AppConfig::from_env()?;
    let telemetry = telemetry::init(config.otlp_endpoint.as_deref())?;

    tracing::info!("Starting Tabletale API server");

    let durable: Arc<dyn PersistentStore> = match &config.database_url {
        Some(database_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(10)
                .connect(database_url)
                .await?;
            let store = PgSnapshotStore::new(pool);
            store.ensure_schema().await?;
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; ended sessions will not be kept");
            Arc::new(NullPersistentStore)
        }
    };

    let generator = Arc::new(ChatCompletionsGenerator::new(ChatCompletionsConfig::new(
        config.narrative.api_url.clone(),
        config.narrative.api_key.clone(),
        config.narrative.model.clone(),
    )));
    let images = config.images.as_ref().map(|images| {
        Arc::new(HttpSceneImageGenerator::new(
            images.api_url.clone(),
            images.api_key.clone(),
        )) as Arc<dyn SceneImageGenerator>
    });
    let rng: Arc<Mutex<dyn DeterministicRng>> = Arc::new(Mutex::new(SystemRng::new()));

    let app_state = AppState::assemble(
        &config,
        Collaborators {
            generator,
            images,
            durable,
            rng,
            clock: Arc::new(SystemClock),
        },
    );

    let addr: SocketAddr = config
        .bind_address()
        .parse()
        .map_err(|e| AppError::Config(format!("invalid HOST:PORT combination: {e}")))?;
    tracing::info!(%addr, "Listening");

    let sweep = app_state.spawn_expiry_sweep(config.sweep_interval);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(app_state)).await?;

    sweep.abort();
    telemetry.shutdown();
    Ok(())
}
