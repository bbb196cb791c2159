//! Resolution shape and the pure merge.

pub mod merge;
pub mod resolution;
