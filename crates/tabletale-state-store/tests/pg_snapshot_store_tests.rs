//! Integration tests for `PgSnapshotStore`. Each test gets a fresh database
//! from `DATABASE_URL`.

use sqlx::PgPool;
use tabletale_session::domain::state::{CharacterSheet, PartyMember, SessionState};
use tabletale_session::repository::PersistentStore;
use tabletale_state_store::pg_snapshot_store::PgSnapshotStore;
use uuid::Uuid;

fn state_at(session_id: Uuid, turn_number: u64) -> SessionState {
    let mut state = SessionState::new(session_id);
    state.turn_number = turn_number;
    state.party.push(PartyMember {
        id: "p1".to_owned(),
        name: "Ilse".to_owned(),
        role: "scout".to_owned(),
        sheet: CharacterSheet::default(),
        memory: String::new(),
    });
    state
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs a PostgreSQL DATABASE_URL"]
async fn test_load_returns_none_for_unknown_session(pool: PgPool) {
    let store = PgSnapshotStore::new(pool);

    let loaded = store.load(Uuid::new_v4()).await.unwrap();

    assert!(loaded.is_none());
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs a PostgreSQL DATABASE_URL"]
async fn test_save_then_load_returns_whole_record(pool: PgPool) {
    let store = PgSnapshotStore::new(pool);
    let state = state_at(Uuid::new_v4(), 3);

    store.save(&state).await.unwrap();

    assert_eq!(store.load(state.session_id).await.unwrap(), Some(state));
}

#[sqlx::test(migrations = "../../migrations")]
#[ignore = "needs a PostgreSQL DATABASE_URL"]
async fn test_save_replaces_earlier_snapshot(pool: PgPool) {
    let store = PgSnapshotStore::new(pool.clone());
    let session_id = Uuid::new_v4();

    store.save(&state_at(session_id, 1)).await.unwrap();
    let mut later = state_at(session_id, 2);
    later.terminal = true;
    store.save(&later).await.unwrap();

    assert_eq!(store.load(session_id).await.unwrap(), Some(later));
    let (rows,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM session_snapshots WHERE session_id = $1")
            .bind(session_id)
            .fetch_one(&pool)
            .await
            .unwrap();
    assert_eq!(rows, 1);
}

#[sqlx::test(migrations = false)]
#[ignore = "needs a PostgreSQL DATABASE_URL"]
async fn test_ensure_schema_is_idempotent(pool: PgPool) {
    let store = PgSnapshotStore::new(pool);

    store.ensure_schema().await.unwrap();
    store.ensure_schema().await.unwrap();

    assert!(store.load(Uuid::new_v4()).await.unwrap().is_none());
}
