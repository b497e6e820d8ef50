//! Miscellaneous utility structs and functions.

use std::fmt::Debug;

use cgmath::num_traits::Float;

/// A closed interval on the real number line, used for the extents of a box along one axis.
#[derive(Copy, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Interval<T> {
    pub min: T,
    pub max: T,
}

impl<T> Interval<T> {
    /// Creates a new interval.
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }
}

impl<T: PartialOrd> Interval<T> {
    /// Returns true if this interval overlaps with the other.
    /// Touching intervals do not overlap.
    pub fn overlaps(&self, other: &Self) -> bool {
        self.max > other.min && other.max > self.min
    }

    /// Returns true if this interval contains the value.
    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}

impl<T: Float> Interval<T> {
    /// Creates an interval with the given centre and radius.
    pub fn disc(centre: T, radius: T) -> Self {
        Self {
            min: centre - radius,
            max: centre + radius,
        }
    }

    /// Gets the magnitude of the interval.
    pub fn length(&self) -> T {
        self.max - self.min
    }

    /// Returns the centre/mid-point of the interval.
    pub fn midpoint(&self) -> T {
        T::from(0.5).unwrap() * (self.min + self.max)
    }

    /// Gets the end of the interval at the low (`false`) or high (`true`) side.
    pub fn end(&self, high: bool) -> T {
        if high {
            self.max
        } else {
            self.min
        }
    }

    /// Computes the distance between a point and the interval.
    /// Will be negative if the point is within the interval.
    pub fn distance(&self, value: T) -> T {
        T::max(value - self.max, self.min - value)
    }

    /// Clamps a value into the interval.
    pub fn clamp(&self, value: T) -> T {
        value.max(self.min).min(self.max)
    }

    /// Grows the interval by `amount` on both sides.
    pub fn expand(&self, amount: T) -> Self {
        Self::new(self.min - amount, self.max + amount)
    }

    /// The smallest interval containing both intervals.
    pub fn union(&self, other: &Self) -> Self {
        Self::new(self.min.min(other.min), self.max.max(other.max))
    }
}

impl<T: Float> std::ops::Add<T> for Interval<T> {
    type Output = Interval<T>;

    fn add(self, rhs: T) -> Self::Output {
        Self {
            min: self.min + rhs,
            max: self.max + rhs,
        }
    }
}

impl<T: Float> std::ops::Sub<T> for Interval<T> {
    type Output = Interval<T>;

    fn sub(self, rhs: T) -> Self::Output {
        Self {
            min: self.min - rhs,
            max: self.max - rhs,
        }
    }
}

impl<T: Debug> Debug for Interval<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Interval({:?}, {:?})", &self.min, &self.max)
    }
}

/// Iterates over `0..count`, starting at `start` and wrapping around.
pub fn rotated_range(count: usize, start: usize) -> impl Iterator<Item = usize> {
    (0..count)
        .map(move |i| i + start)
        .map(move |i| if i >= count { i - count } else { i })
}

/// A cheap deterministic hash of a float into `[0, 1)`.
pub fn rand_hash(to_hash: f64) -> f64 {
    (12345.6789 * to_hash).rem_euclid(1.0)
}

/// Like [rand_hash], but mapped into `[-1, 1)`.
pub fn signed_rand_hash(to_hash: f64) -> f64 {
    2.0 * rand_hash(to_hash) - 1.0
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rotated_range_wraps() {
        assert_eq!(rotated_range(6, 4).collect::<Vec<_>>(), [4, 5, 0, 1, 2, 3]);
        assert_eq!(rotated_range(3, 0).collect::<Vec<_>>(), [0, 1, 2]);
    }

    #[test]
    fn interval_overlap_is_strict() {
        let a = Interval::new(0.0, 1.0);
        assert!(a.overlaps(&Interval::new(0.5, 2.0)));
        assert!(!a.overlaps(&Interval::new(1.0, 2.0)));
        assert_eq!(a.distance(1.5), 0.5);
        assert_eq!(a.distance(0.25), -0.25);
    }

    #[test]
    fn hash_is_stable_and_bounded() {
        for i in 0..100 {
            let x = 0.37 * i as f64;
            let h = rand_hash(x);
            assert!((0.0..1.0).contains(&h));
            assert_eq!(h, rand_hash(x));
            assert!((-1.0..1.0).contains(&signed_rand_hash(x)));
        }
    }
}
