//! Ray queries against pickable scene nodes

use super::NodeId;
use crate::math::Vec3;

/// Ray for raycasting
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Ray {
    /// Ray origin
    pub origin: Vec3,
    /// Ray direction (normalized)
    pub direction: Vec3,
}

impl Ray {
    /// Create a new ray; the direction is normalized
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        let direction = if direction.length() > 1e-4 {
            direction.normalize()
        } else {
            Vec3::Z
        };
        Self { origin, direction }
    }

    /// Get point along ray at distance t
    pub fn point_at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    /// Distance to the first intersection with a sphere
    pub fn intersect_sphere(&self, center: Vec3, radius: f32) -> Option<f32> {
        let oc = self.origin - center;
        let b = oc.dot(self.direction);
        let c = oc.dot(oc) - radius * radius;
        let disc = b * b - c;
        if disc < 0.0 {
            return None;
        }

        let root = disc.sqrt();
        [-b - root, -b + root].into_iter().find(|t| *t >= 0.0)
    }

    /// Distance to an infinite plane through `point` with `normal`
    pub fn intersect_plane(&self, point: Vec3, normal: Vec3) -> Option<f32> {
        let denom = normal.dot(self.direction);
        if denom.abs() < 1e-6 {
            return None;
        }
        let t = (point - self.origin).dot(normal) / denom;
        (t >= 0.0).then_some(t)
    }
}

/// Shape used when a node is hit-tested
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PickShape {
    /// Sphere of the given radius (scaled by the node's largest scale axis)
    Sphere(f32),
    /// Infinite plane through the node, normal along the node's local +Y
    Plane,
}

/// Which nodes a raycast considers
#[derive(Clone, Debug, Default)]
pub struct RayFilter {
    /// Tested even when not selectable (editor helpers)
    pub include: Vec<NodeId>,
    /// Never reported
    pub exclude: Vec<NodeId>,
}

impl RayFilter {
    pub fn include(mut self, node: NodeId) -> Self {
        self.include.push(node);
        self
    }

    pub fn exclude(mut self, node: NodeId) -> Self {
        self.exclude.push(node);
        self
    }
}

/// Raycast hit result
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RayHit {
    /// Node that was hit
    pub node: NodeId,
    /// Hit position in world space
    pub point: Vec3,
    /// Distance from ray origin
    pub distance: f32,
}
