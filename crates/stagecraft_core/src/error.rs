//! Core error types

use thiserror::Error;

use crate::pool::ResourceKind;
use crate::reactive::EffectId;

/// Boxed error returned by effect bodies, cleanups and deferred commits
pub type BoxError = Box<dyn std::error::Error + 'static>;

/// Errors surfaced by the reactive scheduler
#[derive(Error, Debug)]
pub enum ReactiveError {
    /// An effect body returned an error
    #[error("effect {effect:?} failed: {source}")]
    EffectFailed {
        effect: EffectId,
        #[source]
        source: BoxError,
    },

    /// A cleanup registered by an effect returned an error
    #[error("teardown of effect {effect:?} failed: {source}")]
    TeardownFailed {
        effect: EffectId,
        #[source]
        source: BoxError,
    },

    /// Deferred commit work returned an error
    #[error("deferred commit of effect {effect:?} failed: {source}")]
    CommitFailed {
        effect: EffectId,
        #[source]
        source: BoxError,
    },

    /// Effects kept dirtying each other past the pass limit
    #[error("reactive graph did not settle after {0} passes")]
    Unsettled(usize),

    /// The effect handle does not refer to a registered effect
    #[error("effect {0:?} is not registered")]
    UnknownEffect(EffectId),
}

/// Errors surfaced by the resource pool
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Release of a signature with no live entry (double release or a
    /// bookkeeping bug in the caller)
    #[error("release of {kind:?} resource `{signature}` that is not acquired")]
    NotAcquired { kind: ResourceKind, signature: String },

    /// Parameters could not be serialized into a signature
    #[error("failed to build resource signature: {0}")]
    Signature(String),
}

/// Result type for scheduler operations
pub type Result<T> = std::result::Result<T, ReactiveError>;
