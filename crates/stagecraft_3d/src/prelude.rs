//! Prelude module for common imports
//!
//! ```rust,ignore
//! use stagecraft_3d::prelude::*;
//! ```

// Core runtime
pub use stagecraft_core::{Cancellable, Emitter, ReactiveGraph, Signal, TickReport};

// Stage
pub use crate::config::StageConfig;
pub use crate::error::{Result, StageError};
pub use crate::stage::{FrameReport, Stage};
pub use crate::state::{EditorMode, GizmoMode, StageState, TransformSpace};
pub use crate::world::{SharedWorld, World};

// Math
pub use crate::math::{Quat, Transform, Vec3};

// Scene
pub use crate::scene::{NodeId, PickShape, Ray, RayFilter, SceneGraph};

// Display objects
pub use crate::display::{
    AttachmentState, Joint, MaterialParams, PhysicsMode, PhysicsObject, Positioned,
    TexturedMaterial, TransformField,
};

// Engine
pub use crate::engine::{Axis, TransformControlsEvent, TransformPhase};

// Backends
pub use crate::physics::{HeadlessPhysics, JointKind, LimitCone, PhysicsBackend};
pub use crate::render::{HeadlessRenderer, RenderBackend};

// Files
pub use crate::files::{FileBrowser, FileSystem, FsError, MemoryFs, NativeFs};
