//! Tabletale: Session state context.
//!
//! Owns the authoritative shape of a game session (party, world, log,
//! scene) and the whole-record cache it lives in between turns. Other
//! contexts receive copies and hand back new copies; nothing here patches
//! a live record field by field.

pub mod application;
pub mod domain;
pub mod memory;
pub mod repository;
