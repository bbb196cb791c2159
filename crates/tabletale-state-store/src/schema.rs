//! Snapshot store database schema.

/// SQL to create the snapshots table. Idempotent.
pub const CREATE_SNAPSHOTS_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS session_snapshots (
    session_id  UUID PRIMARY KEY,
    turn_number BIGINT NOT NULL,
    terminal    BOOLEAN NOT NULL DEFAULT FALSE,
    state       JSONB NOT NULL,
    saved_at    TIMESTAMPTZ NOT NULL DEFAULT NOW()
);

CREATE INDEX IF NOT EXISTS idx_session_snapshots_saved_at
    ON session_snapshots (saved_at);
";
