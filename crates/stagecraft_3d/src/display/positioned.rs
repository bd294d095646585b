//! Transform access for display objects
//!
//! A [`Positioned`] wraps a scene node. Its setters mutate the node first,
//! then run the write hooks registered by the owning object in registration
//! order. Internal bookkeeping that moves a node goes through the scene graph
//! directly and does not run hooks.

use std::cell::RefCell;
use std::rc::Rc;
use stagecraft_core::ReactiveGraph;

use crate::error::Result;
use crate::math::{Quat, Vec3};
use crate::scene::NodeId;
use crate::world::SharedWorld;

/// Which part of the transform a setter wrote
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TransformField {
    Position,
    Rotation,
    Scale,
}

type WriteHook = Rc<dyn Fn(&mut ReactiveGraph, TransformField)>;

/// Node transform with post-write hooks
#[derive(Clone)]
pub struct Positioned {
    node: NodeId,
    world: SharedWorld,
    hooks: Rc<RefCell<Vec<WriteHook>>>,
}

impl Positioned {
    pub fn new(world: SharedWorld, node: NodeId) -> Self {
        Self {
            node,
            world,
            hooks: Rc::new(RefCell::new(Vec::new())),
        }
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn world(&self) -> &SharedWorld {
        &self.world
    }

    /// Append a hook that runs after every setter
    pub fn on_write<F>(&self, hook: F)
    where
        F: Fn(&mut ReactiveGraph, TransformField) + 'static,
    {
        self.hooks.borrow_mut().push(Rc::new(hook));
    }

    pub fn position(&self) -> Result<Vec3> {
        Ok(self.world.borrow().scene.local_transform(self.node)?.position)
    }

    pub fn world_position(&self) -> Result<Vec3> {
        self.world.borrow().scene.world_position(self.node)
    }

    pub fn rotation(&self) -> Result<Quat> {
        Ok(self.world.borrow().scene.local_transform(self.node)?.rotation)
    }

    pub fn scale(&self) -> Result<Vec3> {
        Ok(self.world.borrow().scene.local_transform(self.node)?.scale)
    }

    pub fn set_position(&self, graph: &mut ReactiveGraph, position: Vec3) -> Result<()> {
        self.world.borrow_mut().scene.set_position(self.node, position)?;
        self.after_write(graph, TransformField::Position);
        Ok(())
    }

    pub fn set_x(&self, graph: &mut ReactiveGraph, x: f32) -> Result<()> {
        let p = self.position()?;
        self.set_position(graph, Vec3::new(x, p.y, p.z))
    }

    pub fn set_y(&self, graph: &mut ReactiveGraph, y: f32) -> Result<()> {
        let p = self.position()?;
        self.set_position(graph, Vec3::new(p.x, y, p.z))
    }

    pub fn set_z(&self, graph: &mut ReactiveGraph, z: f32) -> Result<()> {
        let p = self.position()?;
        self.set_position(graph, Vec3::new(p.x, p.y, z))
    }

    pub fn set_rotation(&self, graph: &mut ReactiveGraph, rotation: Quat) -> Result<()> {
        self.world.borrow_mut().scene.set_rotation(self.node, rotation)?;
        self.after_write(graph, TransformField::Rotation);
        Ok(())
    }

    /// Rotation from XYZ euler angles in degrees
    pub fn set_rotation_degrees(&self, graph: &mut ReactiveGraph, degrees: Vec3) -> Result<()> {
        let rotation = Quat::from_euler(
            degrees.x.to_radians(),
            degrees.y.to_radians(),
            degrees.z.to_radians(),
        );
        self.set_rotation(graph, rotation)
    }

    pub fn set_scale(&self, graph: &mut ReactiveGraph, scale: Vec3) -> Result<()> {
        self.world.borrow_mut().scene.set_scale(self.node, scale)?;
        self.after_write(graph, TransformField::Scale);
        Ok(())
    }

    fn after_write(&self, graph: &mut ReactiveGraph, field: TransformField) {
        let hooks = self.hooks.borrow().clone();
        for hook in hooks {
            hook(graph, field);
        }
    }
}
