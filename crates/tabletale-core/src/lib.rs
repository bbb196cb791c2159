//! Tabletale Core: shared abstractions.
//!
//! This crate defines the traits and types every bounded context depends on:
//! time, randomness, the error taxonomy, commands and the event envelope.
//! It contains no infrastructure code.

pub mod clock;
pub mod command;
pub mod error;
pub mod event;
pub mod rng;
