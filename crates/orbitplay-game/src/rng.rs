//! Deterministic seeded random number generator.
//!
//! The generator state is part of the serialized game state, so a restored
//! snapshot replays exactly the same spawns.

use serde::{Deserialize, Serialize};

/// xorshift32.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct XorShift {
    state: u32,
}

impl XorShift {
    /// A zero seed would lock the sequence at zero, so it is replaced by 1.
    pub fn new(seed: u64) -> Self {
        let folded = (seed ^ (seed >> 32)) as u32;
        Self {
            state: if folded == 0 { 1 } else { folded },
        }
    }

    pub fn next_u32(&mut self) -> u32 {
        let mut x = self.state;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.state = x;
        x
    }

    /// Uniform in `0..max`. `max == 0` yields 0.
    pub fn below(&mut self, max: u32) -> u32 {
        ((self.next_u32() as u64 * max as u64) >> 32) as u32
    }

    /// Uniform in `min..=max`.
    pub fn range(&mut self, min: i64, max: i64) -> i64 {
        if max <= min {
            return min;
        }
        let span = (max - min + 1).min(u32::MAX as i64) as u32;
        min + self.below(span) as i64
    }
}

impl Default for XorShift {
    fn default() -> Self {
        Self::new(1)
    }
}
