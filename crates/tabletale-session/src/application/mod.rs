//! Application services for the Session state context.

pub mod command_handlers;
pub mod query_handlers;
