//! Random number generator abstraction for determinism.
//!
//! In production, this wraps a real RNG. In tests and replays,
//! a seeded or recorded implementation is injected.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Abstraction over random number generation.
pub trait DeterministicRng: Send + Sync {
    /// Generate a random `u32` in the range `[min, max]` inclusive.
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32;

    /// Pick an index in `[0, len)`. Returns `None` when `len` is zero.
    fn pick_index(&mut self, len: usize) -> Option<usize> {
        let last = u32::try_from(len.checked_sub(1)?).unwrap_or(u32::MAX);
        let index = self.next_u32_range(0, last) as usize;
        Some(index.min(len - 1))
    }
}

/// Production RNG backed by an OS-seeded `StdRng`.
#[derive(Debug)]
pub struct SystemRng(StdRng);

impl SystemRng {
    /// Creates an RNG seeded from the operating system.
    #[must_use]
    pub fn new() -> Self {
        Self(StdRng::from_os_rng())
    }

    /// Creates an RNG with a fixed seed, for reproducible sessions.
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl Default for SystemRng {
    fn default() -> Self {
        Self::new()
    }
}

impl DeterministicRng for SystemRng {
    fn next_u32_range(&mut self, min: u32, max: u32) -> u32 {
        self.0.random_range(min..=max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_rng_stays_in_range() {
        let mut rng = SystemRng::seeded(7);
        for _ in 0..500 {
            let roll = rng.next_u32_range(1, 20);
            assert!((1..=20).contains(&roll));
        }
    }

    #[test]
    fn test_seeded_rng_is_reproducible() {
        let mut a = SystemRng::seeded(42);
        let mut b = SystemRng::seeded(42);
        let left: Vec<u32> = (0..10).map(|_| a.next_u32_range(1, 20)).collect();
        let right: Vec<u32> = (0..10).map(|_| b.next_u32_range(1, 20)).collect();
        assert_eq!(left, right);
    }

    #[test]
    fn test_pick_index_empty_is_none() {
        let mut rng = SystemRng::seeded(1);
        assert_eq!(rng.pick_index(0), None);
    }

    #[test]
    fn test_pick_index_single_is_zero() {
        let mut rng = SystemRng::seeded(1);
        assert_eq!(rng.pick_index(1), Some(0));
    }
}
