//! Stagecraft Core Runtime
//!
//! This crate provides the foundational primitives for the Stagecraft scene
//! runtime:
//!
//! - **Reactive Cells**: Versioned signals with tracked reads
//! - **Effect Scheduler**: Coalesced re-runs with teardown and a commit phase
//! - **Cancellation**: Tokens that guard deferred work
//! - **Resource Pool**: Reference-counted sharing keyed by parameter signature
//!
//! # Example
//!
//! ```rust
//! use stagecraft_core::reactive::ReactiveGraph;
//!
//! let mut graph = ReactiveGraph::new();
//!
//! // Create a signal
//! let count = graph.create_signal(0i32);
//!
//! // Create a derived value
//! let doubled = graph.create_derived(move |g| {
//!     g.get(count).unwrap_or(0) * 2
//! });
//!
//! // Create an effect
//! let _effect = graph.create_effect(move |cx| {
//!     println!("Count is now: {:?}", cx.get(count));
//!     Ok(())
//! });
//!
//! // Update the signal; effects re-run on the next tick
//! graph.set(count, 5);
//! graph.tick().unwrap();
//! assert_eq!(graph.get_derived(doubled), Some(10));
//! ```

pub mod cancel;
pub mod error;
pub mod events;
pub mod pool;
pub mod reactive;

pub use cancel::Cancellable;
pub use error::{BoxError, PoolError, ReactiveError, Result};
pub use events::{Emitter, Subscription};
pub use pool::{signature_of, PoolStats, Release, ResourceKind, ResourcePool};
pub use reactive::{
    Cleanup, Derived, DerivedId, Effect, EffectId, EffectResult, EffectScope, ReactiveGraph,
    ReactiveStats, Signal, SignalId, TickReport, DEFAULT_MAX_PASSES,
};
