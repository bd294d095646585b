//! # Stagecraft 3D
//!
//! The reactive scene layer of Stagecraft.
//!
//! This crate provides:
//! - **Stage**: the context object owning the reactive graph and the world
//! - **Display objects**: positioned nodes, physics bodies, textured
//!   materials and physics joints, each driven by effects
//! - **Engine systems**: renderer lifetime, frame loop with a resolution
//!   governor, transform gizmo and raycast snapping
//! - **Backends**: narrow render and physics traits with headless
//!   implementations for tests and tools
//! - **Files**: the file-system capability behind the editor's file browser
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use stagecraft_3d::prelude::*;
//!
//! let mut stage = Stage::new(StageConfig::default(), Box::new(HeadlessRenderer::new()))?;
//! stage.set_physics_backend(Box::new(HeadlessPhysics::new()))?;
//!
//! let a = PhysicsObject::new(&mut stage, "a")?;
//! let b = PhysicsObject::new(&mut stage, "b")?;
//! b.positioned().set_x(stage.graph_mut(), 2.0)?;
//!
//! let joint = Joint::spherical(&mut stage)?;
//! joint.set_from(stage.graph_mut(), Some(a.node()));
//! joint.set_to(stage.graph_mut(), Some(b.node()));
//! stage.frame(0.0)?;
//! ```

// Configuration
pub mod config;

// Errors
pub mod error;

// Math
pub mod math;

// Scene graph
pub mod scene;

// Native collaborators
pub mod physics;
pub mod render;

// File-system capability
pub mod files;

// Shared state and world
pub mod state;
pub mod world;

// Display objects
pub mod display;

// Engine systems
pub mod engine;

// Stage
pub mod stage;

// Prelude for common imports
pub mod prelude;

// Re-export core types at crate root
pub use config::StageConfig;
pub use display::{Joint, MaterialParams, PhysicsMode, PhysicsObject, Positioned, TexturedMaterial};
pub use error::{Result, StageError};
pub use math::{Quat, Transform, Vec3};
pub use scene::{NodeId, SceneGraph};
pub use stage::{FrameReport, Stage, StageEvents};
pub use state::{EditorMode, StageState};
pub use world::{SharedWorld, World};
