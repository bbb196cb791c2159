//! Tabletale: Turn collector.
//!
//! Holds at most one contribution per participant for the turn in play and
//! answers whether everyone expected has contributed.

pub mod application;
pub mod domain;
pub mod memory;
pub mod repository;
