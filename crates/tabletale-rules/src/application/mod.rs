//! Application layer for the Turn judge.

pub mod judging;
