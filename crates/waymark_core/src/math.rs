//! Fixed-point math utilities for deterministic simulation.
//!
//! All movement and path costs use fixed-point arithmetic so that two
//! clients planning the same query get bit-identical results. Square roots
//! are computed on the raw integer representation, which makes them exact
//! (floor or ceiling) instead of iterative approximations.

use std::fmt;

use fixed::types::I32F32;
use serde::{Deserialize, Serialize};

/// Fixed-point number type for all simulation math.
///
/// Uses 32 bits for integer part and 32 bits for fractional part.
/// Range: approximately -2,147,483,648 to 2,147,483,647
/// Precision: approximately 0.00000000023
pub type Fixed = I32F32;

/// Fixed-point 2D vector on the ground plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vec2Fixed {
    /// X coordinate.
    #[serde(with = "fixed_serde")]
    pub x: Fixed,
    /// Y coordinate.
    #[serde(with = "fixed_serde")]
    pub y: Fixed,
}

/// Serde support for fixed-point numbers.
///
/// Serializes fixed-point numbers as their raw bit representation (i64)
/// to preserve exact precision across serialization boundaries.
pub mod fixed_serde {
    use super::Fixed;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a fixed-point number as its raw bit representation.
    pub fn serialize<S>(value: &Fixed, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        value.to_bits().serialize(serializer)
    }

    /// Deserialize a fixed-point number from its raw bit representation.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Fixed, D::Error>
    where
        D: Deserializer<'de>,
    {
        let bits = i64::deserialize(deserializer)?;
        Ok(Fixed::from_bits(bits))
    }
}

impl Vec2Fixed {
    /// Create a new fixed-point vector.
    #[must_use]
    pub const fn new(x: Fixed, y: Fixed) -> Self {
        Self { x, y }
    }

    /// Create a vector from integer coordinates.
    #[must_use]
    pub fn from_int(x: i32, y: i32) -> Self {
        Self::new(Fixed::from_num(x), Fixed::from_num(y))
    }

    /// Zero vector.
    pub const ZERO: Self = Self {
        x: Fixed::ZERO,
        y: Fixed::ZERO,
    };

    /// Calculate squared distance (avoids sqrt for comparisons).
    #[must_use]
    pub fn distance_squared(self, other: Self) -> Fixed {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        dx.saturating_mul(dx).saturating_add(dy.saturating_mul(dy))
    }

    /// Euclidean distance, rounded down to the nearest representable value.
    #[must_use]
    pub fn distance(self, other: Self) -> Fixed {
        length_floor(&[self.x - other.x, self.y - other.y])
    }

    /// Euclidean distance, rounded up to the nearest representable value.
    #[must_use]
    pub fn distance_ceil(self, other: Self) -> Fixed {
        length_ceil(&[self.x - other.x, self.y - other.y])
    }

    /// Midpoint between two vectors.
    #[must_use]
    pub fn midpoint(self, other: Self) -> Self {
        let two = Fixed::from_num(2);
        Self::new((self.x + other.x) / two, (self.y + other.y) / two)
    }

    /// Move toward `target` by at most `max_step`.
    ///
    /// Returns the new position and the distance actually covered. Lands
    /// exactly on `target` when it is within reach.
    #[must_use]
    pub fn move_towards(self, target: Self, max_step: Fixed) -> (Self, Fixed) {
        let dist = self.distance(target);
        if dist <= max_step {
            return (target, dist);
        }

        let ratio = max_step / dist;
        let delta = target - self;
        let next = Self::new(self.x + delta.x * ratio, self.y + delta.y * ratio);
        (next, max_step)
    }
}

impl fmt::Display for Vec2Fixed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}

impl std::ops::Add for Vec2Fixed {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

impl std::ops::Sub for Vec2Fixed {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self {
            x: self.x - rhs.x,
            y: self.y - rhs.y,
        }
    }
}

/// Square root rounded down.
#[must_use]
pub fn sqrt_floor(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }
    // sqrt(b * 2^-32) = sqrt(b * 2^32) * 2^-32
    let scaled = (value.to_bits() as u128) << 32;
    Fixed::from_bits(isqrt(scaled) as i64)
}

/// Square root rounded up.
#[must_use]
pub fn sqrt_ceil(value: Fixed) -> Fixed {
    if value <= Fixed::ZERO {
        return Fixed::ZERO;
    }
    let scaled = (value.to_bits() as u128) << 32;
    let root = isqrt(scaled);
    let root = if root * root < scaled { root + 1 } else { root };
    Fixed::from_bits(root as i64)
}

/// Length of a vector with any number of components, rounded down.
#[must_use]
pub fn length_floor(components: &[Fixed]) -> Fixed {
    let sum = sum_of_squared_bits(components);
    Fixed::from_bits(isqrt(sum) as i64)
}

/// Length of a vector with any number of components, rounded up.
#[must_use]
pub fn length_ceil(components: &[Fixed]) -> Fixed {
    let sum = sum_of_squared_bits(components);
    let root = isqrt(sum);
    let root = if root * root < sum { root + 1 } else { root };
    Fixed::from_bits(root as i64)
}

/// Squares of raw bits are the squared values scaled by 2^64, so the integer
/// root of their sum is the length in raw bits.
fn sum_of_squared_bits(components: &[Fixed]) -> u128 {
    components.iter().fold(0u128, |acc, c| {
        let bits = c.to_bits().unsigned_abs() as u128;
        acc.saturating_add(bits.saturating_mul(bits))
    })
}

/// Integer square root (floor) by Newton iteration from above.
fn isqrt(n: u128) -> u128 {
    if n < 2 {
        return n;
    }
    let bits = 128 - n.leading_zeros();
    let mut x = 1u128 << bits.div_ceil(2);
    loop {
        let y = (x + n / x) / 2;
        if y >= x {
            return x;
        }
        x = y;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed(n: i32) -> Fixed {
        Fixed::from_num(n)
    }

    #[test]
    fn test_vec2_distance_squared() {
        let a = Vec2Fixed::from_int(3, 0);
        let b = Vec2Fixed::from_int(0, 4);
        assert_eq!(a.distance_squared(b), fixed(25));
    }

    #[test]
    fn test_distance_exact_for_pythagorean_triple() {
        let a = Vec2Fixed::from_int(3, 0);
        let b = Vec2Fixed::from_int(0, 4);
        assert_eq!(a.distance(b), fixed(5));
        assert_eq!(a.distance_ceil(b), fixed(5));
    }

    #[test]
    fn test_floor_and_ceil_bracket_irrational_root() {
        let two = fixed(2);
        let lo = sqrt_floor(two);
        let hi = sqrt_ceil(two);
        assert_eq!(hi - lo, Fixed::DELTA);
        assert!(lo * lo <= two);
        assert!(lo > Fixed::from_num(1.4142135));
        assert!(hi < Fixed::from_num(1.4142136));
    }

    #[test]
    fn test_sqrt_of_non_positive_is_zero() {
        assert_eq!(sqrt_floor(Fixed::ZERO), Fixed::ZERO);
        assert_eq!(sqrt_ceil(fixed(-4)), Fixed::ZERO);
    }

    #[test]
    fn test_length_three_components() {
        // 2, 3, 6 -> 7
        assert_eq!(length_floor(&[fixed(2), fixed(-3), fixed(6)]), fixed(7));
        assert_eq!(length_ceil(&[fixed(2), fixed(3), fixed(6)]), fixed(7));
    }

    #[test]
    fn test_isqrt_small_values() {
        for n in 0u128..200 {
            let r = isqrt(n);
            assert!(r * r <= n && (r + 1) * (r + 1) > n, "isqrt({n}) = {r}");
        }
    }

    #[test]
    fn test_move_towards_partial_step() {
        let start = Vec2Fixed::ZERO;
        let target = Vec2Fixed::from_int(10, 0);
        let (next, covered) = start.move_towards(target, fixed(4));
        assert_eq!(next, Vec2Fixed::from_int(4, 0));
        assert_eq!(covered, fixed(4));
    }

    #[test]
    fn test_move_towards_snaps_to_target() {
        let start = Vec2Fixed::from_int(1, 1);
        let target = Vec2Fixed::from_int(2, 1);
        let (next, covered) = start.move_towards(target, fixed(5));
        assert_eq!(next, target);
        assert_eq!(covered, fixed(1));
    }

    #[test]
    fn test_fixed_determinism() {
        let a = Fixed::from_num(1) / Fixed::from_num(3);
        let b = Fixed::from_num(1) / Fixed::from_num(3);
        assert_eq!(a, b);
        assert_eq!(sqrt_floor(a), sqrt_floor(b));
    }
}
