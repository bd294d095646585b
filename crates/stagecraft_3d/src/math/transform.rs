//! Translation, rotation and scale

use serde::{Deserialize, Serialize};

use super::{Quat, Vec3};

/// A TRS transform, local to a parent frame
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Transform = Transform {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Self::IDENTITY
        }
    }

    pub fn with_rotation(mut self, rotation: Quat) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_scale(mut self, scale: Vec3) -> Self {
        self.scale = scale;
        self
    }

    /// Map a point from this frame into the parent frame
    pub fn transform_point(&self, point: Vec3) -> Vec3 {
        self.position + self.rotation.rotate_vec3(point.mul_elem(self.scale))
    }

    /// `child` expressed in this transform's parent frame
    ///
    /// Non-uniform scale combined with rotation is approximated component-wise.
    pub fn compose(&self, child: &Transform) -> Transform {
        Transform {
            position: self.transform_point(child.position),
            rotation: (self.rotation * child.rotation).normalize(),
            scale: self.scale.mul_elem(child.scale),
        }
    }

    /// Express `self` (a world transform) in the frame of `parent` (also world)
    pub fn relative_to(&self, parent: &Transform) -> Transform {
        let inv = parent.rotation.conjugate();
        Transform {
            position: inv
                .rotate_vec3(self.position - parent.position)
                .div_elem(parent.scale),
            rotation: (inv * self.rotation).normalize(),
            scale: self.scale.div_elem(parent.scale),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_compose_then_relative_is_identity() {
        let parent = Transform::from_position(Vec3::new(1.0, 2.0, 3.0))
            .with_rotation(Quat::from_axis_angle(Vec3::Y, FRAC_PI_2))
            .with_scale(Vec3::splat(2.0));
        let child = Transform::from_position(Vec3::new(0.5, 0.0, -1.0))
            .with_rotation(Quat::from_euler(0.1, 0.2, 0.3));

        let world = parent.compose(&child);
        let back = world.relative_to(&parent);

        assert!(back.position.approx_eq(child.position, 1e-4));
        assert!(back.rotation.approx_eq(child.rotation, 1e-4));
        assert!(back.scale.approx_eq(child.scale, 1e-4));
    }

    #[test]
    fn test_relative_to_translated_parent() {
        let parent = Transform::from_position(Vec3::new(2.0, 0.0, 0.0));
        let world = Transform::from_position(Vec3::new(1.0, 0.0, 0.0));

        let local = world.relative_to(&parent);
        assert!(local.position.approx_eq(Vec3::new(-1.0, 0.0, 0.0), 1e-6));
    }
}
