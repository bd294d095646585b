//! Scene objects backed by a physics actor

use serde::{Deserialize, Serialize};
use stagecraft_core::{Effect, ReactiveGraph, Signal};

use super::positioned::Positioned;
use crate::error::{Result, StageError};
use crate::physics::{ActorHandle, ActorKind};
use crate::scene::NodeId;
use crate::stage::Stage;
use crate::world::SharedWorld;

/// How an object takes part in the simulation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PhysicsMode {
    #[default]
    Off,
    Dynamic,
    Static,
}

impl PhysicsMode {
    fn actor_kind(&self) -> Option<ActorKind> {
        match self {
            PhysicsMode::Off => None,
            PhysicsMode::Dynamic => Some(ActorKind::Dynamic),
            PhysicsMode::Static => Some(ActorKind::Static),
        }
    }
}

/// Physics cells of an object, looked up by node through the world
#[derive(Clone, Copy, Debug)]
pub struct BodyBinding {
    pub mode: Signal<PhysicsMode>,
    /// Bumped to rebuild the actor without changing the mode
    pub refresh: Signal<u64>,
    /// Live actor, maintained by the object's effect
    pub actor: Signal<Option<ActorHandle>>,
}

/// A positioned object with an optional physics actor
pub struct PhysicsObject {
    positioned: Positioned,
    binding: BodyBinding,
    effect: Effect,
}

impl PhysicsObject {
    pub fn new(stage: &mut Stage, name: &str) -> Result<Self> {
        let world = stage.world().clone();
        let node = world.borrow_mut().scene.insert(name);
        let physics_ready = stage.state().physics_ready;
        Self::attach(stage.graph_mut(), world, physics_ready, node)
    }

    /// Bind physics cells to an existing node
    pub fn attach(
        graph: &mut ReactiveGraph,
        world: SharedWorld,
        physics_ready: Signal<bool>,
        node: NodeId,
    ) -> Result<Self> {
        if !world.borrow().scene.contains(node) {
            return Err(StageError::UnknownNode(node));
        }

        let binding = BodyBinding {
            mode: graph.create_signal(PhysicsMode::Off),
            refresh: graph.create_signal(0),
            actor: graph.create_signal(None),
        };
        world.borrow_mut().register_body(node, binding);

        let effect_world = world.clone();
        let effect = graph.create_effect_labeled("physics actor", move |cx| {
            let mode = cx.get(binding.mode).unwrap_or_default();
            let _ = cx.get(binding.refresh);
            let ready = cx.get(physics_ready).unwrap_or(false);

            let Some(kind) = mode.actor_kind() else {
                return Ok(());
            };
            if !ready {
                return Ok(());
            }

            let actor = {
                let mut w = effect_world.borrow_mut();
                let pose = w.scene.world_transform(node)?;
                w.require_physics()?.create_actor(kind, &pose)?
            };
            tracing::debug!(?node, ?actor, ?mode, "created physics actor");
            cx.set(binding.actor, Some(actor));

            let world = effect_world.clone();
            cx.on_cleanup(move |graph| {
                graph.set(binding.actor, None);
                let mut w = world.borrow_mut();
                if let Some(physics) = w.physics_mut() {
                    physics.destroy_actor(actor)?;
                }
                Ok(())
            });
            Ok(())
        })?;

        Ok(Self {
            positioned: Positioned::new(world, node),
            binding,
            effect,
        })
    }

    pub fn node(&self) -> NodeId {
        self.positioned.node()
    }

    pub fn positioned(&self) -> &Positioned {
        &self.positioned
    }

    pub fn binding(&self) -> BodyBinding {
        self.binding
    }

    pub fn physics(&self, graph: &ReactiveGraph) -> PhysicsMode {
        graph.get_untracked(self.binding.mode).unwrap_or_default()
    }

    pub fn set_physics(&self, graph: &mut ReactiveGraph, mode: PhysicsMode) {
        graph.set(self.binding.mode, mode);
    }

    /// Rebuild the actor with the current mode
    pub fn refresh_physics(&self, graph: &mut ReactiveGraph) {
        graph.update(self.binding.refresh, |n| n + 1);
    }

    /// Live actor, if the object is simulated
    pub fn actor(&self, graph: &ReactiveGraph) -> Option<ActorHandle> {
        graph.get_untracked(self.binding.actor).flatten()
    }

    /// Destroy the actor and remove the object's node
    pub fn dispose(self, graph: &mut ReactiveGraph) -> Result<()> {
        graph.dispose_effect(self.effect)?;
        graph.dispose_signal(self.binding.mode);
        graph.dispose_signal(self.binding.refresh);
        graph.dispose_signal(self.binding.actor);

        let node = self.positioned.node();
        let mut w = self.positioned.world().borrow_mut();
        w.unregister_body(node);
        w.scene.remove(node);
        Ok(())
    }
}
