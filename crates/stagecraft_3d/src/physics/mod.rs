//! Physics collaborator interface
//!
//! The stage never simulates anything itself. Actors and joints live in an
//! external engine reached through [`PhysicsBackend`]; the stage only holds
//! opaque handles and decides when objects are created and destroyed.
//!
//! [`HeadlessPhysics`] is a bookkeeping backend (handle allocation, live
//! object tables, parameter validation) used when no engine is linked and as
//! the test double.

mod headless;

pub use headless::{ActorRecord, HeadlessPhysics, JointRecord};

use serde::{Deserialize, Serialize};
use std::any::Any;
use std::f32::consts::FRAC_PI_2;
use thiserror::Error;

use crate::math::{Quat, Transform, Vec3};

/// Handle to an actor in the physics backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ActorHandle(pub(crate) u64);

/// Handle to a joint in the physics backend
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct JointHandle(pub(crate) u64);

/// How an actor participates in the simulation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActorKind {
    /// Simulated body
    Dynamic,
    /// Immovable collider
    Static,
}

/// Joint constraint types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JointKind {
    /// Ball joint with an optional limit cone
    Spherical,
    /// Configurable six-degree-of-freedom joint
    D6,
    /// Bodies move together
    Fixed,
    /// Rotation around one axis
    Revolute,
    /// Translation along one axis
    Prismatic,
    /// Keeps the anchors within a distance
    Distance,
}

impl JointKind {
    pub fn name(&self) -> &'static str {
        match self {
            JointKind::Spherical => "spherical",
            JointKind::D6 => "d6",
            JointKind::Fixed => "fixed",
            JointKind::Revolute => "revolute",
            JointKind::Prismatic => "prismatic",
            JointKind::Distance => "distance",
        }
    }
}

/// Joint frame relative to one actor
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct JointPose {
    pub position: Vec3,
    pub rotation: Quat,
}

impl JointPose {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    /// Half-distance frame of a transform local to the attached body
    pub fn half_distance(local: &Transform) -> Self {
        Self::new(local.position * 0.5, local.rotation)
    }
}

/// Angular limit cone of a spherical joint (radians)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LimitCone {
    pub y_angle: f32,
    pub z_angle: f32,
    pub contact_distance: f32,
}

impl Default for LimitCone {
    fn default() -> Self {
        Self {
            y_angle: FRAC_PI_2,
            z_angle: FRAC_PI_2,
            contact_distance: 0.05,
        }
    }
}

/// Live object counts reported by a backend
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PhysicsStats {
    pub actors: usize,
    pub joints: usize,
}

/// Errors reported by a physics backend
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PhysicsError {
    #[error("actor {0:?} does not exist")]
    UnknownActor(ActorHandle),

    /// Also reported when a joint is destroyed twice
    #[error("joint {0:?} does not exist")]
    UnknownJoint(JointHandle),

    #[error("{parameter} is not supported by {kind:?} joints")]
    Unsupported {
        kind: JointKind,
        parameter: &'static str,
    },

    #[error("invalid {parameter}: {value}")]
    InvalidParameter { parameter: &'static str, value: f32 },
}

/// Physics backend trait
///
/// Implement this trait to connect a physics engine.
pub trait PhysicsBackend {
    /// Backend name
    fn name(&self) -> &'static str;

    /// Create an actor at a world pose
    fn create_actor(&mut self, kind: ActorKind, pose: &Transform) -> Result<ActorHandle, PhysicsError>;

    /// Destroy an actor
    fn destroy_actor(&mut self, actor: ActorHandle) -> Result<(), PhysicsError>;

    /// Create a joint between two actors, each with a local frame
    fn create_joint(
        &mut self,
        kind: JointKind,
        actor_a: ActorHandle,
        pose_a: &JointPose,
        actor_b: ActorHandle,
        pose_b: &JointPose,
    ) -> Result<JointHandle, PhysicsError>;

    /// Limit the swing of a spherical or D6 joint
    fn set_limit_cone(&mut self, joint: JointHandle, cone: LimitCone) -> Result<(), PhysicsError>;

    /// Limit the separation of a D6 or distance joint
    fn set_distance_limit(&mut self, joint: JointHandle, distance: f32) -> Result<(), PhysicsError>;

    /// Lower/upper limit of a revolute (angle) or prismatic (offset) joint
    fn set_limits(&mut self, joint: JointHandle, lower: f32, upper: f32) -> Result<(), PhysicsError>;

    /// Destroy a joint
    fn destroy_joint(&mut self, joint: JointHandle) -> Result<(), PhysicsError>;

    /// Advance the simulation
    fn step(&mut self, dt: f32);

    fn stats(&self) -> PhysicsStats;

    /// Access the concrete backend
    fn as_any(&self) -> &dyn Any;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cone() {
        let cone = LimitCone::default();
        assert!((cone.y_angle - FRAC_PI_2).abs() < 1e-6);
        assert!((cone.contact_distance - 0.05).abs() < 1e-6);
    }

    #[test]
    fn test_half_distance_pose() {
        let local = Transform::from_position(Vec3::new(-1.0, 0.0, 0.0));
        let pose = JointPose::half_distance(&local);
        assert_eq!(pose.position, Vec3::new(-0.5, 0.0, 0.0));
        assert_eq!(pose.rotation, Quat::IDENTITY);
    }
}
