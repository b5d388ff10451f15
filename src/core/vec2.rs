//! 2D Vector
//!
//! Floating-point vector used for positions, velocities and push vectors.
//! Every position that reaches the world goes through [`Vec2::is_valid_position`].

use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};
use serde::{Serialize, Deserialize};

/// Largest coordinate magnitude (exclusive) accepted as a live position.
pub const POSITION_BOUND: f64 = 1e6;

/// 2D vector with `f64` components.
#[derive(Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec2 {
    /// X component
    pub x: f64,
    /// Y component
    pub y: f64,
}

impl Vec2 {
    /// Zero vector
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    /// Create a new vector.
    #[inline]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector pointing along `angle` (radians).
    #[inline]
    pub fn from_angle(angle: f64) -> Self {
        Self::new(angle.cos(), angle.sin())
    }

    /// Squared length (avoids sqrt - prefer this for comparisons).
    #[inline]
    pub fn length_squared(self) -> f64 {
        self.x * self.x + self.y * self.y
    }

    /// Length (magnitude).
    #[inline]
    pub fn length(self) -> f64 {
        self.length_squared().sqrt()
    }

    /// Distance to another point.
    #[inline]
    pub fn distance(self, other: Self) -> f64 {
        (self - other).length()
    }

    /// Angle of the vector from `self` to `target`, in radians.
    #[inline]
    pub fn angle_to(self, target: Self) -> f64 {
        (target.y - self.y).atan2(target.x - self.x)
    }

    /// Check if this is the zero vector.
    #[inline]
    pub fn is_zero(self) -> bool {
        self.x == 0.0 && self.y == 0.0
    }

    /// Check if both components are finite and strictly inside the
    /// `POSITION_BOUND` box.
    #[inline]
    pub fn is_valid_position(self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.x.abs() < POSITION_BOUND
            && self.y.abs() < POSITION_BOUND
    }
}

impl Add for Vec2 {
    type Output = Self;
    #[inline]
    fn add(self, other: Self) -> Self {
        Self::new(self.x + other.x, self.y + other.y)
    }
}

impl AddAssign for Vec2 {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.x += other.x;
        self.y += other.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;
    #[inline]
    fn sub(self, other: Self) -> Self {
        Self::new(self.x - other.x, self.y - other.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Self;
    #[inline]
    fn mul(self, scalar: f64) -> Self {
        Self::new(self.x * scalar, self.y * scalar)
    }
}

impl Neg for Vec2 {
    type Output = Self;
    #[inline]
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y)
    }
}

impl fmt::Debug for Vec2 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Vec2({:.2}, {:.2})", self.x, self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distance() {
        let a = Vec2::new(0.0, 0.0);
        let b = Vec2::new(3.0, 4.0);
        assert!((a.distance(b) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_angle_to() {
        let a = Vec2::new(10.0, 10.0);
        assert!((a.angle_to(Vec2::new(20.0, 10.0))).abs() < 1e-9);
        let up = a.angle_to(Vec2::new(10.0, 20.0));
        assert!((up - std::f64::consts::FRAC_PI_2).abs() < 1e-9);
    }

    #[test]
    fn test_valid_position() {
        assert!(Vec2::new(500.0, 300.0).is_valid_position());
        assert!(Vec2::new(-999_999.0, 999_999.0).is_valid_position());
        assert!(!Vec2::new(1e6, 0.0).is_valid_position());
        assert!(!Vec2::new(0.0, -1e6).is_valid_position());
        assert!(!Vec2::new(f64::NAN, 0.0).is_valid_position());
        assert!(!Vec2::new(0.0, f64::INFINITY).is_valid_position());
    }

    #[test]
    fn test_operators() {
        let mut v = Vec2::new(1.0, 2.0);
        v += Vec2::new(1.0, 1.0) * 2.0;
        assert_eq!(v, Vec2::new(3.0, 4.0));
        assert_eq!(-v, Vec2::new(-3.0, -4.0));
        assert_eq!(v - v, Vec2::ZERO);
        assert!(Vec2::ZERO.is_zero());
    }
}
