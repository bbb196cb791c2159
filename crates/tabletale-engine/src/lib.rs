//! Tabletale: Turn engine.
//!
//! The façade connection handlers call: it gates submissions, decides when
//! a turn is complete, runs at most one resolution per session at a time,
//! and broadcasts what happened.

pub mod config;
pub mod engine;
pub mod events;
pub mod guard;
pub mod membership;

pub use config::EngineConfig;
pub use engine::{
    EnginePorts, SessionPhase, Submission, SubmissionOutcome, TurnEngine, TurnOutcome,
    TurnResolution,
};
pub use events::{TurnEvent, TurnEventKind};
pub use guard::{ResolutionGuard, ResolutionLease, WritePermit};
pub use membership::{InMemoryRoomMembership, RoomMembershipProvider};
