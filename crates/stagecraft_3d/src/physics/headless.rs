//! Bookkeeping physics backend

use rustc_hash::FxHashMap;
use std::any::Any;
use std::f32::consts::PI;

use super::{
    ActorHandle, ActorKind, JointHandle, JointKind, JointPose, LimitCone, PhysicsBackend,
    PhysicsError, PhysicsStats,
};
use crate::math::Transform;

/// An actor known to the headless backend
#[derive(Clone, Debug)]
pub struct ActorRecord {
    pub kind: ActorKind,
    pub pose: Transform,
}

/// A joint known to the headless backend, with the parameters applied so far
#[derive(Clone, Debug)]
pub struct JointRecord {
    pub kind: JointKind,
    pub actors: (ActorHandle, ActorHandle),
    pub poses: (JointPose, JointPose),
    pub limit_cone: Option<LimitCone>,
    pub distance_limit: Option<f32>,
    pub limits: Option<(f32, f32)>,
}

/// Physics backend without a simulation
pub struct HeadlessPhysics {
    actors: FxHashMap<u64, ActorRecord>,
    joints: FxHashMap<u64, JointRecord>,
    next_handle: u64,
    elapsed: f32,
}

impl HeadlessPhysics {
    pub fn new() -> Self {
        Self {
            actors: FxHashMap::default(),
            joints: FxHashMap::default(),
            next_handle: 1,
            elapsed: 0.0,
        }
    }

    pub fn actor(&self, handle: ActorHandle) -> Option<&ActorRecord> {
        self.actors.get(&handle.0)
    }

    pub fn joint(&self, handle: JointHandle) -> Option<&JointRecord> {
        self.joints.get(&handle.0)
    }

    /// Simulated time accumulated by `step`
    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    fn allocate(&mut self) -> u64 {
        let id = self.next_handle;
        self.next_handle += 1;
        id
    }

    fn joint_mut(&mut self, handle: JointHandle) -> Result<&mut JointRecord, PhysicsError> {
        self.joints
            .get_mut(&handle.0)
            .ok_or(PhysicsError::UnknownJoint(handle))
    }
}

impl Default for HeadlessPhysics {
    fn default() -> Self {
        Self::new()
    }
}

fn require(kind: JointKind, allowed: &[JointKind], parameter: &'static str) -> Result<(), PhysicsError> {
    if allowed.contains(&kind) {
        Ok(())
    } else {
        Err(PhysicsError::Unsupported { kind, parameter })
    }
}

fn non_negative(parameter: &'static str, value: f32) -> Result<(), PhysicsError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(PhysicsError::InvalidParameter { parameter, value })
    }
}

impl PhysicsBackend for HeadlessPhysics {
    fn name(&self) -> &'static str {
        "headless"
    }

    fn create_actor(&mut self, kind: ActorKind, pose: &Transform) -> Result<ActorHandle, PhysicsError> {
        let id = self.allocate();
        self.actors.insert(id, ActorRecord { kind, pose: *pose });
        tracing::trace!(actor = id, ?kind, "actor created");
        Ok(ActorHandle(id))
    }

    fn destroy_actor(&mut self, actor: ActorHandle) -> Result<(), PhysicsError> {
        self.actors
            .remove(&actor.0)
            .map(|_| ())
            .ok_or(PhysicsError::UnknownActor(actor))
    }

    fn create_joint(
        &mut self,
        kind: JointKind,
        actor_a: ActorHandle,
        pose_a: &JointPose,
        actor_b: ActorHandle,
        pose_b: &JointPose,
    ) -> Result<JointHandle, PhysicsError> {
        for actor in [actor_a, actor_b] {
            if !self.actors.contains_key(&actor.0) {
                return Err(PhysicsError::UnknownActor(actor));
            }
        }

        let id = self.allocate();
        self.joints.insert(
            id,
            JointRecord {
                kind,
                actors: (actor_a, actor_b),
                poses: (*pose_a, *pose_b),
                limit_cone: None,
                distance_limit: None,
                limits: None,
            },
        );
        tracing::trace!(joint = id, kind = kind.name(), "joint created");
        Ok(JointHandle(id))
    }

    fn set_limit_cone(&mut self, joint: JointHandle, cone: LimitCone) -> Result<(), PhysicsError> {
        let record = self.joint_mut(joint)?;
        require(record.kind, &[JointKind::Spherical, JointKind::D6], "limit cone")?;
        for (parameter, angle) in [("cone y angle", cone.y_angle), ("cone z angle", cone.z_angle)] {
            if !(angle > 0.0 && angle <= PI) {
                return Err(PhysicsError::InvalidParameter { parameter, value: angle });
            }
        }
        non_negative("contact distance", cone.contact_distance)?;
        record.limit_cone = Some(cone);
        Ok(())
    }

    fn set_distance_limit(&mut self, joint: JointHandle, distance: f32) -> Result<(), PhysicsError> {
        let record = self.joint_mut(joint)?;
        require(record.kind, &[JointKind::D6, JointKind::Distance], "distance limit")?;
        non_negative("distance limit", distance)?;
        record.distance_limit = Some(distance);
        Ok(())
    }

    fn set_limits(&mut self, joint: JointHandle, lower: f32, upper: f32) -> Result<(), PhysicsError> {
        let record = self.joint_mut(joint)?;
        require(record.kind, &[JointKind::Revolute, JointKind::Prismatic], "limits")?;
        if lower > upper {
            return Err(PhysicsError::InvalidParameter {
                parameter: "lower limit",
                value: lower,
            });
        }
        record.limits = Some((lower, upper));
        Ok(())
    }

    fn destroy_joint(&mut self, joint: JointHandle) -> Result<(), PhysicsError> {
        match self.joints.remove(&joint.0) {
            Some(record) => {
                tracing::trace!(joint = joint.0, kind = record.kind.name(), "joint destroyed");
                Ok(())
            }
            None => Err(PhysicsError::UnknownJoint(joint)),
        }
    }

    fn step(&mut self, dt: f32) {
        self.elapsed += dt;
    }

    fn stats(&self) -> PhysicsStats {
        PhysicsStats {
            actors: self.actors.len(),
            joints: self.joints.len(),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
