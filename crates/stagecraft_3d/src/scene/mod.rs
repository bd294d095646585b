//! Scene graph
//!
//! An arena of nodes with local transforms, plus ray queries used by the
//! editor (selection and snapping).

mod graph;
mod query;

pub use graph::{NodeId, SceneGraph, SceneNode};
pub use query::{PickShape, Ray, RayFilter, RayHit};
