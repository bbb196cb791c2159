//! Route modules.

pub mod events;
pub mod health;
pub mod sessions;
pub mod turns;
