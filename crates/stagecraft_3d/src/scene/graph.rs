//! Arena scene graph
//!
//! Nodes are addressed by [`NodeId`]; relations are stored as ids so any
//! holder can resolve a possibly removed node at use time.

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;

use super::query::{PickShape, Ray, RayFilter, RayHit};
use crate::error::{Result, StageError};
use crate::math::{Quat, Transform, Vec3};
use crate::render::MaterialHandle;

new_key_type! {
    /// Handle to a node in the scene graph
    pub struct NodeId;
}

/// A node in the scene graph
#[derive(Clone, Debug)]
pub struct SceneNode {
    pub name: String,
    parent: Option<NodeId>,
    children: SmallVec<[NodeId; 4]>,
    /// Transform relative to the parent (or the world for roots)
    pub transform: Transform,
    pub visible: bool,
    pub material: Option<MaterialHandle>,
    pub pick: Option<PickShape>,
    /// Whether raycasts consider this node without an explicit include
    pub selectable: bool,
}

impl SceneNode {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: None,
            children: SmallVec::new(),
            transform: Transform::IDENTITY,
            visible: true,
            material: None,
            pick: None,
            selectable: false,
        }
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Check if this is a root node
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// Scene graph arena
#[derive(Default)]
pub struct SceneGraph {
    nodes: SlotMap<NodeId, SceneNode>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a root node
    pub fn insert(&mut self, name: impl Into<String>) -> NodeId {
        self.nodes.insert(SceneNode::new(name))
    }

    /// Insert a node under `parent` with an identity local transform
    pub fn insert_child(&mut self, parent: NodeId, name: impl Into<String>) -> Result<NodeId> {
        if !self.nodes.contains_key(parent) {
            return Err(StageError::UnknownNode(parent));
        }
        let id = self.insert(name);
        self.link(Some(parent), id);
        Ok(id)
    }

    /// Remove a node and its whole subtree; returns the removed ids
    pub fn remove(&mut self, id: NodeId) -> Vec<NodeId> {
        if !self.nodes.contains_key(id) {
            return Vec::new();
        }
        self.unlink(id);

        let mut removed = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.remove(next) {
                stack.extend(node.children);
                removed.push(next);
            }
        }
        removed
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.nodes.get(id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.nodes.get_mut(id)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id).and_then(|n| n.parent)
    }

    /// Iterate over all nodes
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &SceneNode)> {
        self.nodes.iter()
    }

    /// The node itself followed by its ancestors up to the root
    pub fn self_and_ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.contains(id).then_some(id), move |current| {
            self.parent(*current)
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Reparent keeping the local transform (the node moves with its new parent)
    pub fn add(&mut self, parent: Option<NodeId>, child: NodeId) -> Result<()> {
        self.check_reparent(parent, child)?;
        self.unlink(child);
        self.link(parent, child);
        Ok(())
    }

    /// Reparent keeping the world transform (the local transform is rewritten)
    pub fn attach(&mut self, parent: Option<NodeId>, child: NodeId) -> Result<()> {
        self.check_reparent(parent, child)?;
        let world = self.world_transform(child)?;
        let local = match parent {
            Some(p) => world.relative_to(&self.world_transform(p)?),
            None => world,
        };

        self.unlink(child);
        self.link(parent, child);
        self.node_mut(child)?.transform = local;
        Ok(())
    }

    /// Local transform of a node
    pub fn local_transform(&self, id: NodeId) -> Result<Transform> {
        self.node(id).map(|n| n.transform)
    }

    /// World transform, composed from the root down
    pub fn world_transform(&self, id: NodeId) -> Result<Transform> {
        let mut chain: SmallVec<[Transform; 8]> = SmallVec::new();
        let mut current = Some(id);
        while let Some(next) = current {
            let node = self.node(next)?;
            chain.push(node.transform);
            current = node.parent;
        }

        Ok(chain
            .iter()
            .rev()
            .fold(Transform::IDENTITY, |acc, local| acc.compose(local)))
    }

    pub fn world_position(&self, id: NodeId) -> Result<Vec3> {
        self.world_transform(id).map(|t| t.position)
    }

    pub fn set_transform(&mut self, id: NodeId, transform: Transform) -> Result<()> {
        self.node_mut(id)?.transform = transform;
        Ok(())
    }

    pub fn set_position(&mut self, id: NodeId, position: Vec3) -> Result<()> {
        self.node_mut(id)?.transform.position = position;
        Ok(())
    }

    pub fn set_rotation(&mut self, id: NodeId, rotation: Quat) -> Result<()> {
        self.node_mut(id)?.transform.rotation = rotation;
        Ok(())
    }

    pub fn set_scale(&mut self, id: NodeId, scale: Vec3) -> Result<()> {
        self.node_mut(id)?.transform.scale = scale;
        Ok(())
    }

    /// Move a node so its world position becomes `position`
    pub fn set_world_position(&mut self, id: NodeId, position: Vec3) -> Result<()> {
        let local = match self.parent(id) {
            Some(parent) => {
                let parent = self.world_transform(parent)?;
                parent
                    .rotation
                    .conjugate()
                    .rotate_vec3(position - parent.position)
                    .div_elem(parent.scale)
            }
            None => position,
        };
        self.set_position(id, local)
    }

    /// Hit-test every pickable node; hits are sorted nearest first
    pub fn raycast(&self, ray: &Ray, filter: &RayFilter) -> Vec<RayHit> {
        let mut hits: Vec<RayHit> = self
            .nodes
            .iter()
            .filter(|(id, node)| {
                node.visible
                    && !filter.exclude.contains(id)
                    && (node.selectable || filter.include.contains(id))
            })
            .filter_map(|(id, node)| {
                let shape = node.pick?;
                let world = self.world_transform(id).ok()?;
                let distance = match shape {
                    PickShape::Sphere(radius) => {
                        let scale = world.scale.x.max(world.scale.y).max(world.scale.z);
                        ray.intersect_sphere(world.position, radius * scale)?
                    }
                    PickShape::Plane => {
                        let normal = world.rotation.rotate_vec3(Vec3::Y);
                        ray.intersect_plane(world.position, normal)?
                    }
                };
                Some(RayHit {
                    node: id,
                    point: ray.point_at(distance),
                    distance,
                })
            })
            .collect();

        hits.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        hits
    }

    fn node(&self, id: NodeId) -> Result<&SceneNode> {
        self.nodes.get(id).ok_or(StageError::UnknownNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut SceneNode> {
        self.nodes.get_mut(id).ok_or(StageError::UnknownNode(id))
    }

    fn check_reparent(&self, parent: Option<NodeId>, child: NodeId) -> Result<()> {
        self.node(child)?;
        let mut current = parent;
        while let Some(ancestor) = current {
            if ancestor == child {
                return Err(StageError::CyclicParent {
                    child,
                    parent: parent.unwrap_or(ancestor),
                });
            }
            current = self.node(ancestor)?.parent;
        }
        Ok(())
    }

    fn unlink(&mut self, child: NodeId) {
        let Some(parent) = self.nodes.get_mut(child).and_then(|n| n.parent.take()) else {
            return;
        };
        if let Some(parent) = self.nodes.get_mut(parent) {
            parent.children.retain(|c| *c != child);
        }
    }

    fn link(&mut self, parent: Option<NodeId>, child: NodeId) {
        if let Some(p) = parent {
            if let Some(node) = self.nodes.get_mut(p) {
                node.children.push(child);
            }
        }
        if let Some(node) = self.nodes.get_mut(child) {
            node.parent = parent;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_world_transform_follows_parent() {
        let mut scene = SceneGraph::new();
        let parent = scene.insert("parent");
        scene.set_position(parent, Vec3::new(1.0, 0.0, 0.0)).unwrap();
        let child = scene.insert_child(parent, "child").unwrap();
        scene.set_position(child, Vec3::new(0.0, 2.0, 0.0)).unwrap();

        assert_eq!(scene.world_position(child).unwrap(), Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_attach_keeps_world_transform() {
        let mut scene = SceneGraph::new();
        let body = scene.insert("body");
        scene
            .set_transform(
                body,
                Transform::from_position(Vec3::new(2.0, 0.0, 0.0))
                    .with_rotation(Quat::from_axis_angle(Vec3::Y, FRAC_PI_2)),
            )
            .unwrap();
        let joint = scene.insert("joint");
        scene.set_position(joint, Vec3::new(1.0, 0.0, 0.0)).unwrap();

        scene.attach(Some(body), joint).unwrap();

        assert_eq!(scene.parent(joint), Some(body));
        assert!(scene
            .world_position(joint)
            .unwrap()
            .approx_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5));
        // (-1, 0, 0) in world, seen from a body rotated 90 degrees about Y
        assert!(scene
            .local_transform(joint)
            .unwrap()
            .position
            .approx_eq(Vec3::new(0.0, 0.0, -1.0), 1e-5));
    }

    #[test]
    fn test_add_keeps_local_transform() {
        let mut scene = SceneGraph::new();
        let a = scene.insert("a");
        scene.set_position(a, Vec3::new(5.0, 0.0, 0.0)).unwrap();
        let b = scene.insert("b");
        scene.set_position(b, Vec3::new(1.0, 0.0, 0.0)).unwrap();

        scene.add(Some(a), b).unwrap();
        assert_eq!(scene.world_position(b).unwrap(), Vec3::new(6.0, 0.0, 0.0));
        assert_eq!(scene.get(a).unwrap().children(), &[b]);
    }

    #[test]
    fn test_cycles_are_rejected() {
        let mut scene = SceneGraph::new();
        let a = scene.insert("a");
        let b = scene.insert_child(a, "b").unwrap();

        assert!(matches!(
            scene.attach(Some(b), a),
            Err(StageError::CyclicParent { .. })
        ));
        assert!(matches!(scene.add(Some(a), a), Err(StageError::CyclicParent { .. })));
    }

    #[test]
    fn test_remove_drops_subtree() {
        let mut scene = SceneGraph::new();
        let root = scene.insert("root");
        let a = scene.insert_child(root, "a").unwrap();
        let b = scene.insert_child(a, "b").unwrap();

        let removed = scene.remove(a);
        assert_eq!(removed.len(), 2);
        assert!(!scene.contains(b));
        assert!(scene.get(root).unwrap().children().is_empty());
        assert!(matches!(scene.world_position(b), Err(StageError::UnknownNode(_))));
    }

    #[test]
    fn test_set_world_position_under_scaled_parent() {
        let mut scene = SceneGraph::new();
        let parent = scene.insert("parent");
        scene
            .set_transform(
                parent,
                Transform::from_position(Vec3::new(1.0, 1.0, 1.0)).with_scale(Vec3::splat(2.0)),
            )
            .unwrap();
        let child = scene.insert_child(parent, "child").unwrap();

        scene.set_world_position(child, Vec3::new(3.0, 1.0, 1.0)).unwrap();
        assert!(scene
            .local_transform(child)
            .unwrap()
            .position
            .approx_eq(Vec3::new(1.0, 0.0, 0.0), 1e-5));
    }

    #[test]
    fn test_raycast_filters_and_sorts() {
        let mut scene = SceneGraph::new();
        let near = scene.insert("near");
        scene.set_position(near, Vec3::new(2.0, 0.0, 0.0)).unwrap();
        let far = scene.insert("far");
        scene.set_position(far, Vec3::new(6.0, 0.0, 0.0)).unwrap();
        let hidden = scene.insert("not selectable");
        scene.set_position(hidden, Vec3::new(4.0, 0.0, 0.0)).unwrap();
        for id in [near, far, hidden] {
            let node = scene.get_mut(id).unwrap();
            node.pick = Some(PickShape::Sphere(0.5));
            node.selectable = id != hidden;
        }

        let ray = Ray::new(Vec3::ZERO, Vec3::X);
        let hits = scene.raycast(&ray, &RayFilter::default());
        assert_eq!(hits.iter().map(|h| h.node).collect::<Vec<_>>(), vec![near, far]);
        assert!((hits[0].distance - 1.5).abs() < 1e-5);

        let hits = scene.raycast(&ray, &RayFilter::default().exclude(near).include(hidden));
        assert_eq!(hits.iter().map(|h| h.node).collect::<Vec<_>>(), vec![hidden, far]);
    }
}
