//! Tabletale: durable session snapshots.
//!
//! The PostgreSQL fallback behind the session cache: one JSONB row per
//! session, replaced on every save.

pub mod pg_snapshot_store;
pub mod schema;
