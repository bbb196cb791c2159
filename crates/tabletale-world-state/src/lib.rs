//! Tabletale: State merger.
//!
//! Turns a normalized resolution into the next authoritative session
//! record. The merge itself is pure; committing it re-reads the latest
//! record and refuses to write over a turn that has already moved on.

pub mod application;
pub mod domain;
