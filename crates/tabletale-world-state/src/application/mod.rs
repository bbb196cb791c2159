//! Application layer for the State merger.

pub mod command_handlers;
