//! Stage error types

use stagecraft_core::{PoolError, ReactiveError};
use thiserror::Error;

use crate::config::ConfigError;
use crate::files::FsError;
use crate::physics::PhysicsError;
use crate::render::RenderError;
use crate::scene::NodeId;

/// Stage error type
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Reactive(#[from] ReactiveError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("physics: {0}")]
    Physics(#[from] PhysicsError),

    #[error("renderer: {0}")]
    Render(#[from] RenderError),

    #[error("file system: {0}")]
    Fs(#[from] FsError),

    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("no physics backend is installed")]
    PhysicsUnavailable,

    #[error("scene node {0:?} does not exist")]
    UnknownNode(NodeId),

    #[error("cannot parent {child:?} under its own descendant {parent:?}")]
    CyclicParent { child: NodeId, parent: NodeId },
}

/// Result type for stage operations
pub type Result<T> = std::result::Result<T, StageError>;
