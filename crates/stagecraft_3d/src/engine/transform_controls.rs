//! Transform gizmo and drag lifecycle

use serde::{Deserialize, Serialize};
use stagecraft_core::{Effect, Emitter, ReactiveGraph};

use crate::error::{Result, StageError};
use crate::math::Vec3;
use crate::scene::NodeId;
use crate::state::{GizmoMode, StageState, TransformSpace};
use crate::world::SharedWorld;

/// Gizmo axis a drag is constrained to
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    pub fn unit(&self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
            Axis::Z => Vec3::Z,
        }
    }
}

/// Where the gizmo is attached and how it behaves
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Gizmo {
    pub target: NodeId,
    pub mode: GizmoMode,
    pub space: TransformSpace,
    /// Translation step, if snapping to a grid
    pub step: Option<f32>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransformPhase {
    Start,
    Move,
    End,
}

/// Emitted on the stage's `transform_controls` emitter during a drag
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TransformControlsEvent {
    pub phase: TransformPhase,
    pub target: NodeId,
    pub axis: Option<Axis>,
}

#[derive(Clone, Copy, Debug)]
struct Drag {
    target: NodeId,
    axis: Option<Axis>,
}

/// Keeps the gizmo on the selection target
pub struct TransformControls {
    effect: Effect,
    drag: Option<Drag>,
}

impl TransformControls {
    pub fn new(graph: &mut ReactiveGraph, world: SharedWorld, state: StageState) -> Result<Self> {
        let effect = graph.create_effect_labeled("transform controls", move |cx| {
            let target = cx.get(state.selection_target).flatten();
            let mode = cx.get(state.editor_mode).unwrap_or_default();
            let space = cx.get(state.transform_space).unwrap_or_default();
            let step = cx.get(state.transform_snap).flatten();

            let (Some(target), Some(mode)) = (target, mode.gizmo_mode()) else {
                return Ok(());
            };

            let gizmo = Gizmo {
                target,
                mode,
                space,
                step,
            };
            let attach_world = world.clone();
            let token = cx.defer(move |_| {
                let mut w = attach_world.borrow_mut();
                if !w.scene.contains(gizmo.target) {
                    tracing::warn!(target = ?gizmo.target, "selection target is gone, gizmo not attached");
                    return Ok(());
                }
                w.gizmo = Some(gizmo);
                tracing::debug!(target = ?gizmo.target, mode = ?gizmo.mode, "gizmo attached");
                Ok(())
            });

            let detach_world = world.clone();
            token.on_cancel(move || {
                let mut w = detach_world.borrow_mut();
                if w.gizmo.is_some_and(|g| g.target == target) {
                    w.gizmo = None;
                }
            });
            Ok(())
        })?;

        Ok(Self { effect, drag: None })
    }

    /// Target and axis of the drag in progress
    pub fn drag(&self) -> Option<(NodeId, Option<Axis>)> {
        self.drag.map(|d| (d.target, d.axis))
    }

    /// Start dragging the gizmo's target
    pub(crate) fn begin_drag(
        &mut self,
        graph: &mut ReactiveGraph,
        world: &SharedWorld,
        state: StageState,
        events: &Emitter<TransformControlsEvent>,
        axis: Option<Axis>,
    ) -> Result<Option<NodeId>> {
        let Some(gizmo) = world.borrow().gizmo else {
            return Ok(None);
        };
        if let Some(previous) = self.drag.take() {
            tracing::warn!(target = ?previous.target, "drag restarted without an end");
        }

        self.drag = Some(Drag {
            target: gizmo.target,
            axis,
        });
        graph.set(state.dragging, true);
        events.emit(
            graph,
            &TransformControlsEvent {
                phase: TransformPhase::Start,
                target: gizmo.target,
                axis,
            },
        );
        Ok(Some(gizmo.target))
    }

    /// Move the dragged target towards a world position
    ///
    /// Only the drag axis component is applied for axis drags; the gizmo's
    /// step rounds the moved components.
    pub(crate) fn drag_to(
        &mut self,
        world: &SharedWorld,
        position: Vec3,
    ) -> Result<Option<(NodeId, Option<Axis>)>> {
        let Some(drag) = self.drag else {
            return Ok(None);
        };

        let mut w = world.borrow_mut();
        if !w.scene.contains(drag.target) {
            return Err(StageError::UnknownNode(drag.target));
        }
        let current = w.scene.world_position(drag.target)?;
        let step = w.gizmo.and_then(|g| g.step);

        let mut next = match drag.axis {
            Some(Axis::X) => Vec3::new(position.x, current.y, current.z),
            Some(Axis::Y) => Vec3::new(current.x, position.y, current.z),
            Some(Axis::Z) => Vec3::new(current.x, current.y, position.z),
            None => position,
        };
        if let Some(step) = step.filter(|s| *s > 0.0) {
            let snap = |v: f32| (v / step).round() * step;
            next = match drag.axis {
                Some(Axis::X) => Vec3::new(snap(next.x), next.y, next.z),
                Some(Axis::Y) => Vec3::new(next.x, snap(next.y), next.z),
                Some(Axis::Z) => Vec3::new(next.x, next.y, snap(next.z)),
                None => Vec3::new(snap(next.x), snap(next.y), snap(next.z)),
            };
        }
        w.scene.set_world_position(drag.target, next)?;
        Ok(Some((drag.target, drag.axis)))
    }

    pub(crate) fn end_drag(
        &mut self,
        graph: &mut ReactiveGraph,
        state: StageState,
        events: &Emitter<TransformControlsEvent>,
    ) -> Option<NodeId> {
        let drag = self.drag.take()?;
        graph.set(state.dragging, false);
        events.emit(
            graph,
            &TransformControlsEvent {
                phase: TransformPhase::End,
                target: drag.target,
                axis: drag.axis,
            },
        );
        Some(drag.target)
    }

    pub fn dispose(self, graph: &mut ReactiveGraph) -> Result<()> {
        graph.dispose_effect(self.effect)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StageConfig;
    use crate::render::HeadlessRenderer;
    use crate::state::EditorMode;
    use crate::world::World;

    fn setup() -> (ReactiveGraph, SharedWorld, StageState, TransformControls) {
        let mut graph = ReactiveGraph::new();
        let world = World::new(Box::new(HeadlessRenderer::new())).shared();
        let state = StageState::new(&mut graph, &StageConfig::default());
        let controls = TransformControls::new(&mut graph, world.clone(), state).unwrap();
        (graph, world, state, controls)
    }

    #[test]
    fn test_gizmo_follows_selection_and_mode() {
        let (mut graph, world, state, _controls) = setup();
        let target = world.borrow_mut().scene.insert("box");

        graph.set(state.selection_target, Some(target));
        graph.tick().unwrap();
        assert!(world.borrow().gizmo().is_none());

        graph.set(state.editor_mode, EditorMode::Path);
        graph.tick().unwrap();
        let gizmo = *world.borrow().gizmo().unwrap();
        assert_eq!(gizmo.target, target);
        assert_eq!(gizmo.mode, GizmoMode::Translate);

        graph.set(state.selection_target, None);
        graph.tick().unwrap();
        assert!(world.borrow().gizmo().is_none());
    }

    #[test]
    fn test_selection_burst_attaches_once() {
        let (mut graph, world, state, _controls) = setup();
        let a = world.borrow_mut().scene.insert("a");
        let b = world.borrow_mut().scene.insert("b");
        graph.set(state.editor_mode, EditorMode::Rotate);

        graph.set(state.selection_target, Some(a));
        graph.set(state.selection_target, Some(b));
        let report = graph.tick().unwrap();

        assert_eq!(report.effects_run, 1);
        assert_eq!(world.borrow().gizmo().map(|g| g.target), Some(b));
    }

    #[test]
    fn test_drag_emits_phases_and_snaps_to_step() {
        let (mut graph, world, state, mut controls) = setup();
        let target = world.borrow_mut().scene.insert("box");
        graph.set(state.selection_target, Some(target));
        graph.set(state.editor_mode, EditorMode::Translate);
        graph.set(state.transform_snap, Some(0.5));
        graph.tick().unwrap();

        let mut events = Emitter::new();
        let phases = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let seen = phases.clone();
        events.subscribe(move |_, e: &TransformControlsEvent| seen.borrow_mut().push(e.phase));

        assert_eq!(
            controls
                .begin_drag(&mut graph, &world, state, &events, Some(Axis::X))
                .unwrap(),
            Some(target)
        );
        assert_eq!(graph.get(state.dragging), Some(true));

        controls.drag_to(&world, Vec3::new(1.3, 9.0, 9.0)).unwrap();
        assert_eq!(
            world.borrow().scene.world_position(target).unwrap(),
            Vec3::new(1.5, 0.0, 0.0)
        );

        assert_eq!(controls.end_drag(&mut graph, state, &events), Some(target));
        assert_eq!(graph.get(state.dragging), Some(false));
        assert_eq!(*phases.borrow(), vec![TransformPhase::Start, TransformPhase::End]);
    }
}
