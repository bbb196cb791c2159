//! Tabletale: Narrative resolution.
//!
//! Builds a compact context from a session snapshot and its judged
//! contributions, asks an external narrative generator for the outcome,
//! and normalizes whatever comes back into a [`ResolutionResult`].
//!
//! [`ResolutionResult`]: tabletale_world_state::domain::resolution::ResolutionResult

pub mod adapters;
pub mod application;
pub mod domain;
pub mod ports;
