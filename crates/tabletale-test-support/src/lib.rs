//! Shared test clocks and RNGs for the Tabletale turn engine.

mod clock;
mod rng;

pub use clock::{FixedClock, SteppingClock, fixed_time};
pub use rng::{MockRng, SequenceRng};
