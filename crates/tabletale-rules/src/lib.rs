//! Tabletale: Turn judge.
//!
//! Converts contributions into graded d20 stat checks and picks actions for
//! party members without a human at the controls.

pub mod application;
pub mod domain;
