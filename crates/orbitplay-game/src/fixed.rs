//! Fixed-point helpers.
//!
//! World coordinates and velocities are `i64` in units of `1 / ONE`. Every
//! operation here is integer-only so both peers compute bit-identical results.

use serde::{Deserialize, Serialize};

pub const SHIFT: u32 = 8;
pub const ONE: i64 = 1 << SHIFT;

pub const fn from_int(v: i64) -> i64 {
    v << SHIFT
}

pub const fn to_int(v: i64) -> i64 {
    v >> SHIFT
}

/// Integer square root (floor).
pub fn isqrt(v: i64) -> i64 {
    if v <= 0 {
        return 0;
    }
    let v = v as u64;
    let mut x = (v as f64).sqrt() as u64;
    // Correct any rounding in the float estimate.
    while x * x > v {
        x -= 1;
    }
    while (x + 1) * (x + 1) <= v {
        x += 1;
    }
    x as i64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: i64,
    pub y: i64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0, y: 0 };

    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    pub fn add(self, o: Vec2) -> Vec2 {
        Vec2::new(self.x.wrapping_add(o.x), self.y.wrapping_add(o.y))
    }

    pub fn sub(self, o: Vec2) -> Vec2 {
        Vec2::new(self.x.wrapping_sub(o.x), self.y.wrapping_sub(o.y))
    }

    pub fn length_sq(self) -> i64 {
        self.x
            .saturating_mul(self.x)
            .saturating_add(self.y.saturating_mul(self.y))
    }

    pub fn length(self) -> i64 {
        isqrt(self.length_sq())
    }

    /// Rescale to `len`, keeping the direction. The zero vector stays zero.
    pub fn with_length(self, len: i64) -> Vec2 {
        let cur = self.length();
        if cur == 0 {
            return Vec2::ZERO;
        }
        let scale = |c: i64| (c as i128 * len as i128 / cur as i128) as i64;
        Vec2::new(scale(self.x), scale(self.y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isqrt_is_floor() {
        for v in [0i64, 1, 2, 3, 4, 15, 16, 17, 1 << 40, (1 << 40) + 1, i64::MAX] {
            let r = isqrt(v);
            assert!(r * r <= v, "{v}");
            assert!((r + 1).checked_mul(r + 1).is_none_or(|sq| sq > v), "{v}");
        }
        assert_eq!(isqrt(-4), 0);
    }

    #[test]
    fn with_length_keeps_direction() {
        let v = Vec2::new(3 * ONE, 4 * ONE).with_length(10 * ONE);
        assert_eq!(v, Vec2::new(6 * ONE, 8 * ONE));
        assert_eq!(Vec2::ZERO.with_length(ONE), Vec2::ZERO);
    }
}
