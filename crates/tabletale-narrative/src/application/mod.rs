//! Application layer for Narrative resolution.

pub mod orchestrator;
