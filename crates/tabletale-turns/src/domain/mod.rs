//! Turn buckets and progress.

pub mod bucket;
