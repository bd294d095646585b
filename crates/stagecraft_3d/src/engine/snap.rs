//! Raycast snapping for gizmo drags
//!
//! While a target is selected and snapping is on, a 3x3x3 lattice of anchor
//! nodes hangs off the target. After each drag update the system casts two
//! rays from the target and moves it onto a close enough hit.

use std::cell::RefCell;
use std::rc::Rc;
use stagecraft_core::{Effect, ReactiveGraph};

use super::transform_controls::Axis;
use crate::config::SnapConfig;
use crate::error::Result;
use crate::math::Vec3;
use crate::scene::{NodeId, Ray, RayFilter};
use crate::state::StageState;
use crate::world::SharedWorld;

const LATTICE: [f32; 3] = [-1.0, 0.0, 1.0];

pub struct SnapSystem {
    effect: Effect,
    config: SnapConfig,
    anchors: Rc<RefCell<Vec<NodeId>>>,
}

impl SnapSystem {
    pub fn new(
        graph: &mut ReactiveGraph,
        world: SharedWorld,
        state: StageState,
        config: SnapConfig,
    ) -> Result<Self> {
        let anchors: Rc<RefCell<Vec<NodeId>>> = Rc::default();
        let offset = config.anchor_offset;

        let effect_anchors = anchors.clone();
        let effect = graph.create_effect_labeled("snap anchors", move |cx| {
            let target = cx.get(state.selection_target).flatten();
            let enabled = cx.get(state.snapping).unwrap_or(false);
            let (Some(target), true) = (target, enabled) else {
                return Ok(());
            };

            let created = {
                let mut w = world.borrow_mut();
                if !w.scene.contains(target) {
                    return Ok(());
                }
                let mut created = Vec::with_capacity(27);
                for x in LATTICE {
                    for y in LATTICE {
                        for z in LATTICE {
                            let anchor = w.scene.insert_child(target, "snap anchor")?;
                            w.scene.set_position(anchor, Vec3::new(x, y, z) * offset)?;
                            if let Some(node) = w.scene.get_mut(anchor) {
                                node.visible = false;
                            }
                            created.push(anchor);
                        }
                    }
                }
                created
            };
            *effect_anchors.borrow_mut() = created;

            let world = world.clone();
            let anchors = effect_anchors.clone();
            cx.on_cleanup(move |_| {
                let mut w = world.borrow_mut();
                for anchor in anchors.borrow_mut().drain(..) {
                    w.scene.remove(anchor);
                }
                Ok(())
            });
            Ok(())
        })?;

        Ok(Self {
            effect,
            config,
            anchors,
        })
    }

    /// Anchor nodes currently parented to the target
    pub fn anchors(&self) -> Vec<NodeId> {
        self.anchors.borrow().clone()
    }

    /// Snap `target` onto the nearest hit along the drag directions
    ///
    /// Axis drags cast along the axis both ways, free drags cast up and
    /// down. The editor plane only takes part in Y drags and the target never
    /// hits itself. Returns the new world position if the target moved.
    pub fn try_snap(
        &self,
        world: &SharedWorld,
        target: NodeId,
        axis: Option<Axis>,
    ) -> Result<Option<Vec3>> {
        let mut w = world.borrow_mut();
        let direction = axis.map_or(Vec3::Y, |a| a.unit());

        let mut filter = RayFilter::default().exclude(target);
        if axis == Some(Axis::Y) {
            if let Some(plane) = w.editor_plane() {
                filter = filter.include(plane);
            }
        }

        let mut snapped = None;
        for direction in [direction, -direction] {
            let origin = w.scene.world_position(target)?;
            let Some(hit) = w.scene.raycast(&Ray::new(origin, direction), &filter).into_iter().next()
            else {
                continue;
            };
            if origin.distance(hit.point) > self.config.max_distance {
                continue;
            }
            w.scene.set_world_position(target, hit.point)?;
            tracing::trace!(?target, node = ?hit.node, "snapped");
            snapped = Some(hit.point);
        }
        Ok(snapped)
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
    use crate::scene::PickShape;
    use crate::world::World;

    struct Fixture {
        graph: ReactiveGraph,
        world: SharedWorld,
        state: StageState,
        snap: SnapSystem,
        target: NodeId,
    }

    fn fixture(target_at: Vec3) -> Fixture {
        let mut graph = ReactiveGraph::new();
        let world = World::new(Box::new(HeadlessRenderer::new())).shared();
        let state = StageState::new(&mut graph, &StageConfig::default());
        let snap = SnapSystem::new(&mut graph, world.clone(), state, SnapConfig::default()).unwrap();

        let target = {
            let mut w = world.borrow_mut();
            let plane = w.scene.insert("editor plane");
            w.scene.get_mut(plane).unwrap().pick = Some(PickShape::Plane);
            w.editor_plane = Some(plane);

            let target = w.scene.insert("target");
            w.scene.set_position(target, target_at).unwrap();
            let node = w.scene.get_mut(target).unwrap();
            node.pick = Some(PickShape::Sphere(0.5));
            node.selectable = true;
            target
        };
        Fixture {
            graph,
            world,
            state,
            snap,
            target,
        }
    }

    #[test]
    fn test_anchors_follow_selection_and_toggle() {
        let mut f = fixture(Vec3::ZERO);
        f.graph.set(f.state.selection_target, Some(f.target));
        f.graph.set(f.state.snapping, true);
        f.graph.tick().unwrap();

        let anchors = f.snap.anchors();
        assert_eq!(anchors.len(), 27);
        {
            let w = f.world.borrow();
            assert_eq!(w.scene.get(f.target).unwrap().children().len(), 27);
            let corner = w.scene.local_transform(anchors[0]).unwrap().position;
            assert_eq!(corner, Vec3::new(-0.5, -0.5, -0.5));
        }

        f.graph.set(f.state.snapping, false);
        f.graph.tick().unwrap();
        assert!(f.snap.anchors().is_empty());
        assert!(f.world.borrow().scene.get(f.target).unwrap().children().is_empty());
    }

    #[test]
    fn test_y_drag_snaps_to_editor_plane() {
        let f = fixture(Vec3::new(0.0, 0.5, 0.0));

        let snapped = f.snap.try_snap(&f.world, f.target, Some(Axis::Y)).unwrap();
        assert_eq!(snapped, Some(Vec3::ZERO));
        assert_eq!(f.world.borrow().scene.world_position(f.target).unwrap(), Vec3::ZERO);
    }

    #[test]
    fn test_plane_ignored_off_the_y_axis() {
        let f = fixture(Vec3::new(0.0, 0.5, 0.0));
        assert_eq!(f.snap.try_snap(&f.world, f.target, None).unwrap(), None);
    }

    #[test]
    fn test_far_hits_do_not_snap() {
        let f = fixture(Vec3::new(0.0, 3.0, 0.0));
        assert_eq!(f.snap.try_snap(&f.world, f.target, Some(Axis::Y)).unwrap(), None);
        assert_eq!(
            f.world.borrow().scene.world_position(f.target).unwrap(),
            Vec3::new(0.0, 3.0, 0.0)
        );
    }

    #[test]
    fn test_snaps_to_selectable_neighbour() {
        let f = fixture(Vec3::ZERO);
        {
            let mut w = f.world.borrow_mut();
            let wall = w.scene.insert("wall");
            w.scene.set_position(wall, Vec3::new(1.0, 0.0, 0.0)).unwrap();
            let node = w.scene.get_mut(wall).unwrap();
            node.pick = Some(PickShape::Sphere(0.5));
            node.selectable = true;
        }

        let snapped = f.snap.try_snap(&f.world, f.target, Some(Axis::X)).unwrap().unwrap();
        assert!(snapped.approx_eq(Vec3::new(0.5, 0.0, 0.0), 1e-5));
    }
}
