//! Context assembly, output extraction and normalization.

pub mod context;
pub mod extraction;
pub mod normalize;
pub mod scene_proposal;
pub mod scene_prompt;
