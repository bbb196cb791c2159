//! `PostgreSQL` implementation of the `PersistentStore` trait.

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use tracing::{debug, error, instrument};
use uuid::Uuid;

use tabletale_core::error::DomainError;
use tabletale_session::domain::state::SessionState;
use tabletale_session::repository::PersistentStore;

use crate::schema::CREATE_SNAPSHOTS_TABLE;

fn infrastructure(context: &str, e: &sqlx::Error) -> DomainError {
    error!(error = %e, "{context}");
    DomainError::Infrastructure(format!("{context}: {e}"))
}

/// PostgreSQL-backed session snapshots.
#[derive(Debug, Clone)]
pub struct PgSnapshotStore {
    pool: PgPool,
}

impl PgSnapshotStore {
    /// Creates a new `PgSnapshotStore` over an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Creates the snapshots table if it is missing.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if the DDL fails.
    pub async fn ensure_schema(&self) -> Result<(), DomainError> {
        sqlx::raw_sql(CREATE_SNAPSHOTS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(|e| infrastructure("snapshot schema setup failed", &e))?;
        Ok(())
    }
}

#[async_trait]
impl PersistentStore for PgSnapshotStore {
    #[instrument(skip(self))]
    async fn load(&self, session_id: Uuid) -> Result<Option<SessionState>, DomainError> {
        let row: Option<(Json<SessionState>,)> =
            sqlx::query_as("SELECT state FROM session_snapshots WHERE session_id = $1")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| infrastructure("snapshot load failed", &e))?;
        debug!(found = row.is_some(), "snapshot loaded");
        Ok(row.map(|(Json(state),)| state))
    }

    #[instrument(skip(self, state), fields(session_id = %state.session_id, turn_number = state.turn_number))]
    async fn save(&self, state: &SessionState) -> Result<(), DomainError> {
        let turn_number = i64::try_from(state.turn_number).map_err(|_| {
            DomainError::Validation(format!("turn number {} overflows", state.turn_number))
        })?;
        sqlx::query(
            r"
            INSERT INTO session_snapshots (session_id, turn_number, terminal, state, saved_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (session_id) DO UPDATE
            SET turn_number = EXCLUDED.turn_number,
                terminal    = EXCLUDED.terminal,
                state       = EXCLUDED.state,
                saved_at    = NOW()
            ",
        )
        .bind(state.session_id)
        .bind(turn_number)
        .bind(state.terminal)
        .bind(Json(state))
        .execute(&self.pool)
        .await
        .map_err(|e| infrastructure("snapshot save failed", &e))?;
        debug!("snapshot saved");
        Ok(())
    }
}
