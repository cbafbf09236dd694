//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! It avoids SIMD/unsafe and focuses on stable semantics.

use std::ops::{Add, AddAssign, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

/// 3D vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z
    }

    pub fn len_sq(self) -> f32 {
        self.dot(self)
    }

    pub fn len(self) -> f32 {
        self.len_sq().sqrt()
    }

    /// Euclidean distance between two points.
    pub fn distance(self, to: Self) -> f32 {
        (to - self).len()
    }

    pub fn lerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        Self::new(
            self.x + (to.x - self.x) * t,
            self.y + (to.y - self.y) * t,
            self.z + (to.z - self.z) * t,
        )
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Self) {
        *self = *self + rhs;
    }
}

impl Sub for Vec3 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;

    fn mul(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

impl Neg for Vec3 {
    type Output = Self;

    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

/// Rotation quaternion, stored `xyzw`.
///
/// Every operation that blends or integrates returns a unit quaternion; callers
/// constructing one by hand should go through [`Quat::normalized`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quat {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Default for Quat {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Quat {
    pub const IDENTITY: Self = Self {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle` radians about `axis` (need not be unit length).
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let len = axis.len();
        if len <= f32::EPSILON {
            return Self::IDENTITY;
        }
        let (s, c) = (angle * 0.5).sin_cos();
        let a = axis * (s / len);
        Self::new(a.x, a.y, a.z, c)
    }

    pub fn dot(self, rhs: Self) -> f32 {
        self.x * rhs.x + self.y * rhs.y + self.z * rhs.z + self.w * rhs.w
    }

    pub fn norm(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Unit-length copy. Degenerate input collapses to identity.
    pub fn normalized(self) -> Self {
        let n = self.norm();
        if n <= f32::EPSILON || !n.is_finite() {
            return Self::IDENTITY;
        }
        Self::new(self.x / n, self.y / n, self.z / n, self.w / n)
    }

    fn scale(self, s: f32) -> Self {
        Self::new(self.x * s, self.y * s, self.z * s, self.w * s)
    }

    fn plus(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z, self.w + rhs.w)
    }

    /// Hamilton product `self * rhs`.
    pub fn mul_quat(self, rhs: Self) -> Self {
        Self::new(
            self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        )
    }

    /// Spherical interpolation along the shortest arc, renormalized.
    pub fn slerp(self, to: Self, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mut to = to;
        let mut cos = self.dot(to);
        if cos < 0.0 {
            to = to.scale(-1.0);
            cos = -cos;
        }

        // Nearly parallel: fall back to nlerp to avoid dividing by ~0.
        if cos > 0.9995 {
            return self.scale(1.0 - t).plus(to.scale(t)).normalized();
        }

        let theta = cos.clamp(-1.0, 1.0).acos();
        let sin = theta.sin();
        let a = ((1.0 - t) * theta).sin() / sin;
        let b = (t * theta).sin() / sin;
        self.scale(a).plus(to.scale(b)).normalized()
    }

    /// Advances the rotation by angular velocity `omega` (rad/s) over `dt`.
    pub fn integrate(self, omega: Vec3, dt: f32) -> Self {
        if dt == 0.0 || omega.len_sq() == 0.0 {
            return self.normalized();
        }
        let spin = Quat::new(omega.x, omega.y, omega.z, 0.0).mul_quat(self);
        self.plus(spin.scale(0.5 * dt)).normalized()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite() && self.w.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-5
    }

    #[test]
    fn vec3_lerp_midpoint() {
        let a = Vec3::new(0.0, 0.0, 0.0);
        let b = Vec3::new(2.0, 4.0, 6.0);
        let mid = a.lerp(b, 0.5);
        assert_eq!(mid, Vec3::new(1.0, 2.0, 3.0));
    }

    #[test]
    fn vec3_distance() {
        let a = Vec3::new(1.0, 1.0, 1.0);
        let b = Vec3::new(4.0, 5.0, 1.0);
        assert!(approx(a.distance(b), 5.0));
    }

    #[test]
    fn slerp_endpoints_and_unit_norm() {
        let a = Quat::IDENTITY;
        let b = Quat::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), std::f32::consts::FRAC_PI_2);
        assert_eq!(a.slerp(b, 0.0), a);
        let end = a.slerp(b, 1.0);
        assert!(approx(end.dot(b).abs(), 1.0));

        let mid = a.slerp(b, 0.5);
        assert!(approx(mid.norm(), 1.0));
        let expected = Quat::from_axis_angle(Vec3::new(0.0, 0.0, 1.0), std::f32::consts::FRAC_PI_4);
        assert!(approx(mid.dot(expected).abs(), 1.0));
    }

    #[test]
    fn slerp_takes_shortest_arc() {
        let a = Quat::IDENTITY;
        let b = Quat::new(0.0, 0.0, 0.0, -1.0);
        let mid = a.slerp(b, 0.5);
        assert!(approx(mid.dot(a).abs(), 1.0));
    }

    #[test]
    fn integrate_keeps_unit_norm() {
        let mut q = Quat::IDENTITY;
        for _ in 0..100 {
            q = q.integrate(Vec3::new(0.3, 1.2, -0.7), 1.0 / 60.0);
        }
        assert!(approx(q.norm(), 1.0));
    }

    #[test]
    fn normalized_degenerate_is_identity() {
        assert_eq!(Quat::new(0.0, 0.0, 0.0, 0.0).normalized(), Quat::IDENTITY);
    }
}
