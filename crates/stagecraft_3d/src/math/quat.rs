//! Quaternion rotations

use serde::{Deserialize, Serialize};

use super::Vec3;

/// Unit quaternion representing a 3D rotation
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
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
    /// Identity quaternion (no rotation)
    pub const IDENTITY: Quat = Quat {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Create from Euler angles in radians, XYZ order
    pub fn from_euler(x: f32, y: f32, z: f32) -> Self {
        let (sx, cx) = (x * 0.5).sin_cos();
        let (sy, cy) = (y * 0.5).sin_cos();
        let (sz, cz) = (z * 0.5).sin_cos();

        Self {
            x: sx * cy * cz + cx * sy * sz,
            y: cx * sy * cz - sx * cy * sz,
            z: cx * cy * sz + sx * sy * cz,
            w: cx * cy * cz - sx * sy * sz,
        }
    }

    /// Create from axis-angle representation
    pub fn from_axis_angle(axis: Vec3, angle: f32) -> Self {
        let len = axis.length();
        if len < 1e-6 {
            return Self::IDENTITY;
        }

        let (s, c) = (angle * 0.5).sin_cos();
        let axis = axis / len;
        Self::new(axis.x * s, axis.y * s, axis.z * s, c)
    }

    pub fn normalize(&self) -> Self {
        let len = self.dot(*self).sqrt();
        if len < 1e-6 {
            return Self::IDENTITY;
        }
        Self::new(self.x / len, self.y / len, self.z / len, self.w / len)
    }

    /// Conjugate (the inverse of a unit quaternion)
    pub fn conjugate(&self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    pub fn dot(&self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w
    }

    /// Hamilton product: applying the result rotates by `other` then `self`
    pub fn mul(&self, other: &Self) -> Self {
        Self {
            x: self.w * other.x + self.x * other.w + self.y * other.z - self.z * other.y,
            y: self.w * other.y - self.x * other.z + self.y * other.w + self.z * other.x,
            z: self.w * other.z + self.x * other.y - self.y * other.x + self.z * other.w,
            w: self.w * other.w - self.x * other.x - self.y * other.y - self.z * other.z,
        }
    }

    /// Rotate a vector by this quaternion
    pub fn rotate_vec3(&self, v: Vec3) -> Vec3 {
        let q = Vec3::new(self.x, self.y, self.z);
        let t = q.cross(v) * 2.0;
        v + t * self.w + q.cross(t)
    }

    /// Euler angles (radians, XYZ order) of this rotation
    pub fn to_euler(&self) -> Vec3 {
        let m11 = 1.0 - 2.0 * (self.y * self.y + self.z * self.z);
        let m12 = 2.0 * (self.x * self.y - self.w * self.z);
        let m13 = 2.0 * (self.x * self.z + self.w * self.y);
        let m22 = 1.0 - 2.0 * (self.x * self.x + self.z * self.z);
        let m23 = 2.0 * (self.y * self.z - self.w * self.x);
        let m32 = 2.0 * (self.y * self.z + self.w * self.x);
        let m33 = 1.0 - 2.0 * (self.x * self.x + self.y * self.y);

        let y = m13.clamp(-1.0, 1.0).asin();
        if m13.abs() < 0.999_999 {
            Vec3::new((-m23).atan2(m33), y, (-m12).atan2(m11))
        } else {
            Vec3::new(m32.atan2(m22), y, 0.0)
        }
    }

    pub fn approx_eq(&self, other: Self, epsilon: f32) -> bool {
        // q and -q encode the same rotation
        (self.dot(other).abs() - 1.0).abs() <= epsilon
    }
}

impl std::ops::Mul for Quat {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        Quat::mul(&self, &rhs)
    }
}
