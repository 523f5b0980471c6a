//! Hybrid logical timestamps used for MVCC ordering.

use serde::{Deserialize, Serialize};

/// A hybrid logical timestamp: wall time in nanoseconds since the Unix
/// epoch plus a logical counter that disambiguates events sharing a wall
/// time. Ordering is lexicographic, which the field order gives us for free.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp {
    pub wall_time: i64,
    pub logical: i32,
}

impl Timestamp {
    /// Create a timestamp from its components.
    pub const fn new(wall_time: i64, logical: i32) -> Self {
        Self { wall_time, logical }
    }

    /// Zero timestamp used as a sentinel for "no data".
    pub const fn zero() -> Self {
        Self {
            wall_time: 0,
            logical: 0,
        }
    }

    /// True if this is the zero sentinel.
    pub const fn is_zero(self) -> bool {
        self.wall_time == 0 && self.logical == 0
    }

    /// Return this timestamp advanced by `ns` wall nanoseconds.
    ///
    /// The logical component is reset; callers use this to derive an
    /// uncertainty upper bound from a proposed commit timestamp.
    pub const fn add_wall(self, ns: i64) -> Self {
        Self {
            wall_time: self.wall_time.saturating_add(ns),
            logical: 0,
        }
    }

    /// Return the later of `self` and `other`.
    pub fn forward(self, other: Timestamp) -> Self {
        if other > self {
            other
        } else {
            self
        }
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.wall_time, self.logical)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_lexicographic() {
        let cases = [
            (Timestamp::new(1, 0), Timestamp::new(2, 0)),
            (Timestamp::new(1, 5), Timestamp::new(2, 0)),
            (Timestamp::new(2, 0), Timestamp::new(2, 1)),
            (Timestamp::zero(), Timestamp::new(0, 1)),
        ];
        for (lo, hi) in cases {
            assert!(lo < hi, "expected {lo} < {hi}");
        }
        assert_eq!(Timestamp::new(3, 4), Timestamp::new(3, 4));
    }

    #[test]
    fn forward_takes_the_later_value() {
        let a = Timestamp::new(10, 2);
        let b = Timestamp::new(10, 3);
        assert_eq!(a.forward(b), b);
        assert_eq!(b.forward(a), b);
    }

    #[test]
    fn add_wall_resets_logical() {
        let ts = Timestamp::new(100, 7).add_wall(50);
        assert_eq!(ts, Timestamp::new(150, 0));
    }
}
