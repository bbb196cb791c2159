//! HTTP adapters for the generator ports.

pub mod chat_completions;
pub mod images;
