//! Judgement rules and autonomous action choice.

pub mod autonomy;
pub mod judgement;
