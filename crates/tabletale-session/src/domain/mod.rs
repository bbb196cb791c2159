//! Domain model for the Session state context.

pub mod commands;
pub mod contribution;
pub mod scene;
pub mod state;
