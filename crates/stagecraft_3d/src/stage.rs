//! The stage: one reactive graph, one world and the systems that drive them
//!
//! # Example
//!
//! ```rust,ignore
//! use stagecraft_3d::prelude::*;
//!
//! let mut stage = Stage::new(StageConfig::default(), Box::new(HeadlessRenderer::new()))?;
//! stage.set_physics_backend(Box::new(HeadlessPhysics::new()))?;
//!
//! let joint = Joint::spherical(&mut stage)?;
//! stage.frame(0.0)?;
//! ```

use stagecraft_core::{Cancellable, Effect, Emitter, ReactiveGraph, TickReport};

use crate::config::StageConfig;
use crate::engine::{
    renderer_effect, Axis, EventLoop, FrameOutcome, SnapSystem, TransformControls,
    TransformControlsEvent, TransformPhase,
};
use crate::error::Result;
use crate::math::Vec3;
use crate::physics::PhysicsBackend;
use crate::render::RenderBackend;
use crate::scene::{NodeId, PickShape};
use crate::state::{EditorMode, StageState, TransformSpace};
use crate::world::{SharedWorld, World};

/// Event emitters owned by the stage
#[derive(Default)]
pub struct StageEvents {
    pub transform_controls: Emitter<TransformControlsEvent>,
}

/// What one call to [`Stage::frame`] did
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameReport {
    pub frame: FrameOutcome,
    pub tick: TickReport,
    /// A frame was drawn
    pub rendered: bool,
}

/// The runtime context
///
/// Owns the reactive graph and the shared world. Display objects take
/// `&mut Stage` when they are built and the host drives everything else
/// through [`Stage::frame`].
pub struct Stage {
    config: StageConfig,
    graph: ReactiveGraph,
    world: SharedWorld,
    state: StageState,
    events: StageEvents,
    event_loop: EventLoop,
    renderer: Effect,
    transform_controls: TransformControls,
    snap: SnapSystem,
}

impl Stage {
    /// Build a stage around a render backend
    ///
    /// Physics is absent until [`Stage::set_physics_backend`] installs one.
    pub fn new(config: StageConfig, renderer: Box<dyn RenderBackend>) -> Result<Self> {
        let mut graph = ReactiveGraph::with_max_passes(config.reactive.max_passes);

        let world = World::new(renderer).shared();
        {
            let mut w = world.borrow_mut();
            let plane = w.scene.insert("editor plane");
            if let Some(node) = w.scene.get_mut(plane) {
                node.pick = Some(PickShape::Plane);
            }
            w.editor_plane = Some(plane);
        }

        let state = StageState::new(&mut graph, &config);
        let renderer = renderer_effect(&mut graph, world.clone(), state, config.renderer.shadows)?;
        let transform_controls = TransformControls::new(&mut graph, world.clone(), state)?;
        let snap = SnapSystem::new(&mut graph, world.clone(), state, config.snap.clone())?;
        let event_loop = EventLoop::new(config.governor.clone(), &config.event_loop);

        let mut stage = Self {
            config,
            graph,
            world,
            state,
            events: StageEvents::default(),
            event_loop,
            renderer,
            transform_controls,
            snap,
        };
        stage.tick()?;

        tracing::info!(
            backend = stage.world.borrow().renderer().name(),
            "stage initialized"
        );
        Ok(stage)
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    pub fn graph(&self) -> &ReactiveGraph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut ReactiveGraph {
        &mut self.graph
    }

    pub fn world(&self) -> &SharedWorld {
        &self.world
    }

    pub fn state(&self) -> StageState {
        self.state
    }

    pub fn events(&self) -> &StageEvents {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut StageEvents {
        &mut self.events
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    pub fn snap(&self) -> &SnapSystem {
        &self.snap
    }

    /// Flush pending effects and commits
    pub fn tick(&mut self) -> Result<TickReport> {
        Ok(self.graph.tick()?)
    }

    // =========================================================================
    // Physics
    // =========================================================================

    /// Install a physics backend and mark physics ready
    ///
    /// A backend already in place is torn down first so every actor and
    /// joint it holds is released through it. Returns the replaced backend.
    pub fn set_physics_backend(
        &mut self,
        backend: Box<dyn PhysicsBackend>,
    ) -> Result<Option<Box<dyn PhysicsBackend>>> {
        let previous = self.remove_physics_backend()?;

        let name = backend.name();
        self.world.borrow_mut().set_physics(Some(backend));
        self.graph.set(self.state.physics_ready, true);
        self.tick()?;

        tracing::info!(backend = name, "physics ready");
        Ok(previous)
    }

    /// Mark physics not ready, let dependents tear down, then take the backend
    pub fn remove_physics_backend(&mut self) -> Result<Option<Box<dyn PhysicsBackend>>> {
        if self.graph.set(self.state.physics_ready, false) {
            self.tick()?;
        }
        Ok(self.world.borrow_mut().set_physics(None))
    }

    // =========================================================================
    // Editor state
    // =========================================================================

    pub fn select(&mut self, target: Option<NodeId>) {
        self.graph.set(self.state.selection_target, target);
    }

    pub fn set_editor_mode(&mut self, mode: EditorMode) {
        self.graph.set(self.state.editor_mode, mode);
    }

    pub fn set_transform_space(&mut self, space: TransformSpace) {
        self.graph.set(self.state.transform_space, space);
    }

    pub fn set_transform_snap(&mut self, step: Option<f32>) {
        self.graph.set(self.state.transform_snap, step);
    }

    pub fn set_snapping(&mut self, snapping: bool) {
        self.graph.set(self.state.snapping, snapping);
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.graph.set(self.state.paused, paused);
    }

    pub fn set_transparent_background(&mut self, transparent: bool) {
        self.graph.set(self.state.transparent_background, transparent);
    }

    pub fn pixel_ratio(&self) -> f32 {
        self.graph
            .get_untracked(self.state.pixel_ratio)
            .unwrap_or(self.config.renderer.initial_pixel_ratio)
    }

    // =========================================================================
    // Gizmo drags
    // =========================================================================

    /// Start dragging the gizmo target; `None` drags freely
    ///
    /// Returns the dragged node, or `None` when no gizmo is attached.
    pub fn begin_drag(&mut self, axis: Option<Axis>) -> Result<Option<NodeId>> {
        self.transform_controls.begin_drag(
            &mut self.graph,
            &self.world,
            self.state,
            &self.events.transform_controls,
            axis,
        )
    }

    /// Move the dragged node, snapping it when snapping is on
    ///
    /// Returns the node's world position after the move.
    pub fn drag_to(&mut self, position: Vec3) -> Result<Option<Vec3>> {
        let Some((target, axis)) = self.transform_controls.drag_to(&self.world, position)? else {
            return Ok(None);
        };
        if self.graph.get_untracked(self.state.snapping).unwrap_or(false) {
            self.snap.try_snap(&self.world, target, axis)?;
        }

        self.events.transform_controls.emit(
            &mut self.graph,
            &TransformControlsEvent {
                phase: TransformPhase::Move,
                target,
                axis,
            },
        );
        let position = self.world.borrow().scene.world_position(target)?;
        Ok(Some(position))
    }

    /// Finish the drag in progress
    pub fn end_drag(&mut self) -> Option<NodeId> {
        self.transform_controls
            .end_drag(&mut self.graph, self.state, &self.events.transform_controls)
    }

    // =========================================================================
    // Frame loop
    // =========================================================================

    /// See [`EventLoop::add_loop`]
    pub fn add_loop<F>(&mut self, callback: F) -> Cancellable
    where
        F: FnMut(&mut ReactiveGraph, f32) + 'static,
    {
        self.event_loop.add_loop(callback)
    }

    /// See [`EventLoop::add_timer`]
    pub fn add_timer<F>(&mut self, interval_ms: f64, repeat: Option<u32>, callback: F) -> Cancellable
    where
        F: FnMut(&mut ReactiveGraph, f32) + 'static,
    {
        self.event_loop.add_timer(interval_ms, repeat, callback)
    }

    /// Advance one display frame at `now_ms`
    ///
    /// Runs loop callbacks, applies the governor's decision to the pixel
    /// ratio, steps physics, flushes the graph and draws. Physics and drawing
    /// only happen on frames where callbacks ran.
    pub fn frame(&mut self, now_ms: f64) -> Result<FrameReport> {
        let paused = self.graph.get_untracked(self.state.paused).unwrap_or(false);
        let outcome = self.event_loop.advance(now_ms, paused, &mut self.graph);

        if let Some(scale) = outcome.governor.and_then(|d| d.scale) {
            self.graph.update(self.state.pixel_ratio, |ratio| ratio * scale);
        }

        if let Some(elapsed) = outcome.elapsed_ms {
            if let Some(physics) = self.world.borrow_mut().physics_mut() {
                physics.step(elapsed / 1000.0);
            }
        }

        let tick = self.tick()?;

        let renderer = self.graph.get_untracked(self.state.renderer).flatten();
        let rendered = match (outcome.ran_callbacks, renderer) {
            (true, Some(handle)) => {
                let pixel_ratio = self.pixel_ratio();
                self.world.borrow_mut().render(handle, pixel_ratio)?;
                true
            }
            _ => false,
        };

        Ok(FrameReport {
            frame: outcome,
            tick,
            rendered,
        })
    }

    /// Dispose the stage's own effects and state
    ///
    /// Display objects should be disposed before this; anything they still
    /// hold in the pools is logged.
    pub fn shutdown(mut self) -> Result<()> {
        self.remove_physics_backend()?;
        self.snap.dispose(&mut self.graph)?;
        self.transform_controls.dispose(&mut self.graph)?;
        self.graph.dispose_effect(self.renderer)?;
        self.state.dispose(&mut self.graph);

        let w = self.world.borrow();
        let (textures, materials) = (w.texture_pool().len(), w.material_pool().len());
        if textures + materials > 0 {
            tracing::warn!(textures, materials, "stage shut down with pooled resources alive");
        }
        tracing::info!("stage shut down");
        Ok(())
    }
}
