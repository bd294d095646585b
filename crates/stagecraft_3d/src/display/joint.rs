//! Physics joints between two scene objects
//!
//! A joint is a scene node that names two endpoint objects. Its attach
//! effect runs whenever an endpoint, an endpoint's actor, the manual-position
//! flag or physics readiness changes:
//!
//! 1. Unless the user placed the joint, move it to the centroid of the
//!    endpoints' world positions.
//! 2. Hold both endpoints through the world and remember the joint's parent.
//!    The first hold on a body records its physics mode and makes it dynamic
//!    (a body that already is gets its actor rebuilt instead). Later holds,
//!    from this joint's next run or from other joints, leave the body alone.
//! 3. Defer the attachment to the commit phase, after every effect of the
//!    pass has run and the endpoint actors exist. The commit reparents the
//!    joint under each endpoint in turn, uses half of the resulting local
//!    position as that side's frame, puts the joint back under its parent
//!    and creates the native joint.
//!
//! Teardown cancels the pending commit, destroys the native joint and
//! returns the joint to its parent. Holds outlive a single run: each run
//! takes its new holds before dropping the previous ones, and the last
//! release of a body restores the mode recorded by its first hold.

use smallvec::SmallVec;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use stagecraft_core::{Effect, EffectResult, EffectScope, ReactiveGraph, Signal, Subscription};

use super::physics_object::{BodyBinding, PhysicsMode};
use super::positioned::{Positioned, TransformField};
use crate::engine::{TransformControlsEvent, TransformPhase};
use crate::error::Result;
use crate::math::Vec3;
use crate::physics::{JointHandle, JointKind, JointPose, LimitCone, PhysicsError};
use crate::scene::{NodeId, SceneGraph};
use crate::stage::Stage;
use crate::world::SharedWorld;

/// Progress of a joint's attachment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AttachmentState {
    /// Endpoints unresolved or physics not ready
    #[default]
    Idle,
    /// Endpoints prepared, native joint waiting for the commit phase
    PendingFrame,
    /// Native joint exists
    Committed,
    /// The last attachment was undone
    TornDown,
}

#[derive(Clone, Copy, Debug)]
struct JointCells {
    from: Signal<Option<NodeId>>,
    to: Signal<Option<NodeId>>,
    manual: Signal<bool>,
    refresh: Signal<u64>,
    state: Signal<AttachmentState>,
    native: Signal<Option<JointHandle>>,
    limit_cone: Signal<Option<LimitCone>>,
    distance_limit: Signal<Option<f32>>,
    limits: Signal<Option<(f32, f32)>>,
}

impl JointCells {
    fn new(
        graph: &mut ReactiveGraph,
        kind: JointKind,
        from: Option<NodeId>,
        to: Option<NodeId>,
    ) -> Self {
        let cone = (kind == JointKind::Spherical).then(LimitCone::default);
        Self {
            from: graph.create_signal(from),
            to: graph.create_signal(to),
            manual: graph.create_signal(false),
            refresh: graph.create_signal(0),
            state: graph.create_signal(AttachmentState::Idle),
            native: graph.create_signal(None),
            limit_cone: graph.create_signal(cone),
            distance_limit: graph.create_signal(None),
            limits: graph.create_signal(None),
        }
    }

    /// Pin the joint where the user put it and rebuild
    fn mark_manual(&self, graph: &mut ReactiveGraph) {
        graph.set(self.manual, true);
        graph.update(self.refresh, |n| n + 1);
    }

    fn dispose(self, graph: &mut ReactiveGraph) {
        graph.dispose_signal(self.from);
        graph.dispose_signal(self.to);
        graph.dispose_signal(self.manual);
        graph.dispose_signal(self.refresh);
        graph.dispose_signal(self.state);
        graph.dispose_signal(self.native);
        graph.dispose_signal(self.limit_cone);
        graph.dispose_signal(self.distance_limit);
        graph.dispose_signal(self.limits);
    }
}

/// Endpoints a joint currently holds
type Holds = Rc<RefCell<SmallVec<[NodeId; 2]>>>;

#[derive(Clone)]
struct AttachContext {
    kind: JointKind,
    node: NodeId,
    cells: JointCells,
    world: SharedWorld,
    physics_ready: Signal<bool>,
    holds: Holds,
}

/// A physics joint between two [`PhysicsObject`](super::PhysicsObject)s
pub struct Joint {
    kind: JointKind,
    positioned: Positioned,
    cells: JointCells,
    holds: Holds,
    attach: Effect,
    limits: Effect,
    subscription: Subscription,
}

impl Joint {
    pub fn new(stage: &mut Stage, kind: JointKind) -> Result<Self> {
        Self::build(stage, kind, None, None)
    }

    /// Joint with both endpoints set
    ///
    /// The attach body runs before this returns; the native joint is created
    /// by the commit phase of the next tick.
    pub fn between(stage: &mut Stage, kind: JointKind, from: NodeId, to: NodeId) -> Result<Self> {
        Self::build(stage, kind, Some(from), Some(to))
    }

    fn build(
        stage: &mut Stage,
        kind: JointKind,
        from: Option<NodeId>,
        to: Option<NodeId>,
    ) -> Result<Self> {
        let world = stage.world().clone();
        let node = world
            .borrow_mut()
            .scene
            .insert(format!("{} joint", kind.name()));
        let physics_ready = stage.state().physics_ready;

        let graph = stage.graph_mut();
        let cells = JointCells::new(graph, kind, from, to);
        let positioned = Positioned::new(world.clone(), node);
        positioned.on_write(move |graph, field| {
            if matches!(field, TransformField::Position | TransformField::Rotation) {
                cells.mark_manual(graph);
            }
        });

        let holds = Holds::default();
        let context = AttachContext {
            kind,
            node,
            cells,
            world: world.clone(),
            physics_ready,
            holds: holds.clone(),
        };
        let attach = graph.create_effect_labeled("joint attach", move |cx| attach_body(cx, &context))?;

        let limits_world = world.clone();
        let limits = graph.create_effect_labeled("joint limits", move |cx| {
            let Some(handle) = cx.get(cells.native).flatten() else {
                return Ok(());
            };
            let cone = cx.get(cells.limit_cone).flatten();
            let distance = cx.get(cells.distance_limit).flatten();
            let limits = cx.get(cells.limits).flatten();

            let mut w = limits_world.borrow_mut();
            let Some(physics) = w.physics_mut() else {
                return Ok(());
            };
            if let Some(cone) = cone {
                physics.set_limit_cone(handle, cone)?;
            }
            if let Some(distance) = distance {
                physics.set_distance_limit(handle, distance)?;
            }
            if let Some((lower, upper)) = limits {
                physics.set_limits(handle, lower, upper)?;
            }
            Ok(())
        })?;

        let subscription =
            stage
                .events_mut()
                .transform_controls
                .subscribe(move |graph, event: &TransformControlsEvent| {
                    if event.target == node && event.phase == TransformPhase::End {
                        cells.mark_manual(graph);
                    }
                });

        Ok(Self {
            kind,
            positioned,
            cells,
            holds,
            attach,
            limits,
            subscription,
        })
    }

    pub fn spherical(stage: &mut Stage) -> Result<Self> {
        Self::new(stage, JointKind::Spherical)
    }

    pub fn d6(stage: &mut Stage) -> Result<Self> {
        Self::new(stage, JointKind::D6)
    }

    pub fn fixed(stage: &mut Stage) -> Result<Self> {
        Self::new(stage, JointKind::Fixed)
    }

    pub fn revolute(stage: &mut Stage) -> Result<Self> {
        Self::new(stage, JointKind::Revolute)
    }

    pub fn prismatic(stage: &mut Stage) -> Result<Self> {
        Self::new(stage, JointKind::Prismatic)
    }

    pub fn distance(stage: &mut Stage) -> Result<Self> {
        Self::new(stage, JointKind::Distance)
    }

    pub fn kind(&self) -> JointKind {
        self.kind
    }

    pub fn node(&self) -> NodeId {
        self.positioned.node()
    }

    pub fn positioned(&self) -> &Positioned {
        &self.positioned
    }

    pub fn from(&self, graph: &ReactiveGraph) -> Option<NodeId> {
        graph.get_untracked(self.cells.from).flatten()
    }

    pub fn to(&self, graph: &ReactiveGraph) -> Option<NodeId> {
        graph.get_untracked(self.cells.to).flatten()
    }

    pub fn set_from(&self, graph: &mut ReactiveGraph, from: Option<NodeId>) {
        graph.set(self.cells.from, from);
    }

    pub fn set_to(&self, graph: &mut ReactiveGraph, to: Option<NodeId>) {
        graph.set(self.cells.to, to);
    }

    /// Place the joint by hand; it stops following the endpoints' centroid
    pub fn set_position(&self, graph: &mut ReactiveGraph, position: Vec3) -> Result<()> {
        self.positioned.set_position(graph, position)
    }

    pub fn set_x(&self, graph: &mut ReactiveGraph, x: f32) -> Result<()> {
        self.positioned.set_x(graph, x)
    }

    pub fn set_y(&self, graph: &mut ReactiveGraph, y: f32) -> Result<()> {
        self.positioned.set_y(graph, y)
    }

    pub fn set_z(&self, graph: &mut ReactiveGraph, z: f32) -> Result<()> {
        self.positioned.set_z(graph, z)
    }

    pub fn is_manual(&self, graph: &ReactiveGraph) -> bool {
        graph.get_untracked(self.cells.manual).unwrap_or(false)
    }

    /// Swing limit (spherical and D6 joints)
    pub fn set_limit_cone(&self, graph: &mut ReactiveGraph, cone: Option<LimitCone>) {
        graph.set(self.cells.limit_cone, cone);
    }

    /// Separation limit (D6 and distance joints)
    pub fn set_distance_limit(&self, graph: &mut ReactiveGraph, distance: Option<f32>) {
        graph.set(self.cells.distance_limit, distance);
    }

    /// Angle or offset range (revolute and prismatic joints)
    pub fn set_limits(&self, graph: &mut ReactiveGraph, limits: Option<(f32, f32)>) {
        graph.set(self.cells.limits, limits);
    }

    pub fn state(&self, graph: &ReactiveGraph) -> AttachmentState {
        graph.get_untracked(self.cells.state).unwrap_or_default()
    }

    /// Live native joint
    pub fn native(&self, graph: &ReactiveGraph) -> Option<JointHandle> {
        graph.get_untracked(self.cells.native).flatten()
    }

    /// Detach and remove the joint node
    ///
    /// Endpoint holds are released even if the teardown fails.
    pub fn dispose(self, stage: &mut Stage) -> Result<()> {
        stage.events_mut().transform_controls.unsubscribe(self.subscription);

        let world = self.positioned.world().clone();
        let graph = stage.graph_mut();
        graph.dispose_effect(self.limits)?;
        let detached = graph.dispose_effect(self.attach);
        release_holds(graph, &world, self.holds.take());
        detached?;
        self.cells.dispose(graph);

        world.borrow_mut().scene.remove(self.node());
        Ok(())
    }
}

fn attach_body(cx: &mut EffectScope<'_>, ctx: &AttachContext) -> EffectResult {
    let cells = ctx.cells;
    let from = cx.get(cells.from).flatten();
    let to = cx.get(cells.to).flatten();
    let manual = cx.get(cells.manual).unwrap_or(false);
    let _ = cx.get(cells.refresh);
    let ready = cx.get(ctx.physics_ready).unwrap_or(false);

    let (Some(from), Some(to)) = (from, to) else {
        release_holds(cx.graph(), &ctx.world, ctx.holds.take());
        cx.set(cells.state, AttachmentState::Idle);
        return Ok(());
    };
    if !ready {
        release_holds(cx.graph(), &ctx.world, ctx.holds.take());
        cx.set(cells.state, AttachmentState::Idle);
        return Ok(());
    }

    let bodies = {
        let w = ctx.world.borrow();
        w.scene
            .contains(ctx.node)
            .then(|| w.body(from).zip(w.body(to)))
    };
    let Some(bodies) = bodies else {
        release_holds(cx.graph(), &ctx.world, ctx.holds.take());
        return Ok(());
    };
    let Some((from_body, to_body)) = bodies else {
        tracing::warn!(?from, ?to, "joint endpoint is not a physics object");
        release_holds(cx.graph(), &ctx.world, ctx.holds.take());
        cx.set(cells.state, AttachmentState::Idle);
        return Ok(());
    };

    if !manual {
        let mut w = ctx.world.borrow_mut();
        let centroid = Vec3::centroid(&[w.scene.world_position(from)?, w.scene.world_position(to)?]);
        w.scene.set_world_position(ctx.node, centroid)?;
    }

    let prior_parent = ctx.world.borrow().scene.parent(ctx.node);
    let mut held: SmallVec<[NodeId; 2]> = SmallVec::new();
    hold(cx, &ctx.world, from, from_body);
    held.push(from);
    if to != from {
        hold(cx, &ctx.world, to, to_body);
        held.push(to);
    }
    let previous = ctx.holds.replace(held);
    release_holds(cx.graph(), &ctx.world, previous);

    // A replaced actor invalidates the native joint
    let _ = cx.get(from_body.actor);
    let _ = cx.get(to_body.actor);
    cx.set(cells.state, AttachmentState::PendingFrame);

    // Filled by the commit; emptied when the token is cancelled
    let live: Rc<Cell<Option<JointHandle>>> = Rc::new(Cell::new(None));
    let destroy_failed: Rc<Cell<Option<PhysicsError>>> = Rc::new(Cell::new(None));

    {
        let world = ctx.world.clone();
        let node = ctx.node;
        let destroy_failed = destroy_failed.clone();
        cx.on_cleanup(move |graph| {
            graph.set(cells.native, None);
            restore_parent(&mut world.borrow_mut().scene, node, prior_parent)?;
            graph.set(cells.state, AttachmentState::TornDown);

            match destroy_failed.take() {
                Some(err) => Err(err.into()),
                None => Ok(()),
            }
        });
    }

    let token = {
        let world = ctx.world.clone();
        let live = live.clone();
        let kind = ctx.kind;
        let node = ctx.node;
        cx.defer(move |graph| {
            let actors = graph
                .get_untracked(from_body.actor)
                .flatten()
                .zip(graph.get_untracked(to_body.actor).flatten());
            let Some((actor_a, actor_b)) = actors else {
                tracing::warn!(?node, "joint endpoints have no physics actors");
                return Ok(());
            };

            let handle = {
                let mut w = world.borrow_mut();
                w.scene.attach(Some(from), node)?;
                let pose_a = JointPose::half_distance(&w.scene.local_transform(node)?);
                w.scene.attach(Some(to), node)?;
                let pose_b = JointPose::half_distance(&w.scene.local_transform(node)?);
                restore_parent(&mut w.scene, node, prior_parent)?;

                w.require_physics()?
                    .create_joint(kind, actor_a, &pose_a, actor_b, &pose_b)?
            };
            live.set(Some(handle));
            tracing::debug!(?node, ?handle, kind = kind.name(), "joint attached");

            graph.set(cells.native, Some(handle));
            graph.set(cells.state, AttachmentState::Committed);
            Ok(())
        })
    };

    // The token is cancelled first during teardown, before the cleanup above
    let world = ctx.world.clone();
    token.on_cancel(move || {
        let Some(handle) = live.take() else {
            return;
        };
        let mut w = world.borrow_mut();
        let Some(physics) = w.physics_mut() else {
            return;
        };
        if let Err(err) = physics.destroy_joint(handle) {
            tracing::error!(?handle, error = %err, "failed to destroy joint");
            destroy_failed.set(Some(err));
        }
    });
    Ok(())
}

/// Hold an endpoint; the first hold forces it dynamic, or rebuilds its
/// actor if it already is
fn hold(cx: &mut EffectScope<'_>, world: &SharedWorld, node: NodeId, body: BodyBinding) {
    let mode = cx.get_untracked(body.mode).unwrap_or_default();
    if !world.borrow_mut().hold_body(node, mode) {
        return;
    }
    if mode == PhysicsMode::Dynamic {
        cx.graph().update(body.refresh, |n| n + 1);
    } else {
        cx.set(body.mode, PhysicsMode::Dynamic);
    }
}

/// Release holds, restoring the recorded mode of bodies nobody holds anymore
fn release_holds(graph: &mut ReactiveGraph, world: &SharedWorld, held: SmallVec<[NodeId; 2]>) {
    for node in held {
        let restore = {
            let mut w = world.borrow_mut();
            let prior = w.release_body(node);
            // The endpoint may have been disposed since the joint attached
            prior.zip(w.body(node))
        };
        if let Some((prior, body)) = restore {
            graph.set(body.mode, prior);
        }
    }
}

fn restore_parent(scene: &mut SceneGraph, node: NodeId, prior: Option<NodeId>) -> Result<()> {
    if !scene.contains(node) {
        return Ok(());
    }
    let target = prior.filter(|parent| scene.contains(*parent));
    if scene.parent(node) != target {
        scene.attach(target, node)?;
    }
    Ok(())
}
