//! Application layer for the Turn collector.

pub mod collector;
