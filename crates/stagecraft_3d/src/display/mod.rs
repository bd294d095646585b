//! Display objects
//!
//! Scene-facing wrappers around nodes: transform setters with write hooks,
//! physics-backed objects, pooled materials and joints. Each object owns
//! its cells and effects and releases them in `dispose`.

mod joint;
mod material;
mod physics_object;
mod positioned;

pub use joint::{AttachmentState, Joint};
pub use material::{MaterialParams, TexturedMaterial};
pub use physics_object::{BodyBinding, PhysicsMode, PhysicsObject};
pub use positioned::{Positioned, TransformField};
