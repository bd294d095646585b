//! Fine-grained reactive cells and the effect scheduler
//!
//! A push-pull hybrid in the spirit of Leptos/SolidJS signals:
//! - Signals push invalidation to the effects that read them
//! - Derived values pull (lazily recompute) when a dependency version moved
//! - Effects are queued on write and re-run once per [`ReactiveGraph::tick`]
//!
//! # Teardown
//!
//! Every effect invocation can register cleanups through its
//! [`EffectScope`]. Together they form the effect's teardown, which always
//! runs to completion (last registered first) before the body runs again and
//! when the effect is disposed.
//!
//! # Commit phase
//!
//! Work that must observe the settled result of every other effect in the
//! same pass (reparenting, native object creation) is deferred with
//! [`EffectScope::defer`]. The scheduler runs it after all dirty bodies of a
//! pass, unless the returned [`Cancellable`] was cancelled in between. The
//! token is cancelled automatically when the effect tears down.
//!
//! ```
//! use stagecraft_core::reactive::ReactiveGraph;
//!
//! let mut graph = ReactiveGraph::new();
//! let count = graph.create_signal(0i32);
//!
//! let _effect = graph
//!     .create_effect(move |cx| {
//!         let value = cx.get(count).unwrap_or(0);
//!         cx.on_cleanup(move |_| {
//!             println!("releasing resources built for {value}");
//!             Ok(())
//!         });
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! graph.set(count, 1);
//! graph.set(count, 2);
//! // One teardown and one re-run for both writes.
//! graph.tick().unwrap();
//! ```

use slotmap::{new_key_type, SlotMap};
use smallvec::SmallVec;
use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::cancel::Cancellable;
use crate::error::{BoxError, ReactiveError, Result};

new_key_type! {
    /// Unique identifier for a signal
    pub struct SignalId;
    /// Unique identifier for a derived/computed value
    pub struct DerivedId;
    /// Unique identifier for an effect
    pub struct EffectId;
}

/// Default number of effect/commit passes a tick may take before it is
/// considered a feedback loop
pub const DEFAULT_MAX_PASSES: usize = 64;

/// Result returned by effect bodies, cleanups and deferred commits
pub type EffectResult = std::result::Result<(), BoxError>;

/// A single teardown step registered by an effect invocation
pub type Cleanup = Box<dyn FnOnce(&mut ReactiveGraph) -> EffectResult>;

type EffectBody = Box<dyn FnMut(&mut EffectScope<'_>) -> EffectResult>;
type CommitFn = Box<dyn FnOnce(&mut ReactiveGraph) -> EffectResult>;
type ComputeFn = Rc<dyn Fn(&ReactiveGraph) -> Box<dyn Any>>;

/// A reactive signal handle (cheap to copy)
#[derive(Debug)]
pub struct Signal<T> {
    id: SignalId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Signal<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Signal<T> {}

impl<T> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<T> Eq for Signal<T> {}

impl<T> Signal<T> {
    /// Get the signal's internal ID
    pub fn id(&self) -> SignalId {
        self.id
    }
}

/// A derived/computed value handle
#[derive(Debug)]
pub struct Derived<T> {
    id: DerivedId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Derived<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Derived<T> {}

impl<T> Derived<T> {
    pub fn id(&self) -> DerivedId {
        self.id
    }
}

/// An effect handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Effect {
    id: EffectId,
}

impl Effect {
    pub fn id(&self) -> EffectId {
        self.id
    }
}

/// Internal signal node storage
struct SignalNode {
    /// The signal value (type-erased)
    value: Box<dyn Any>,
    /// Version counter for change detection
    version: u64,
    /// Effects to mark dirty on change
    subscribers: SmallVec<[EffectId; 4]>,
}

/// Internal derived node storage
struct DerivedNode {
    /// Cached value (if computed)
    value: RefCell<Option<Box<dyn Any>>>,
    /// The compute function
    compute: ComputeFn,
    /// Signals read by the last computation, with the version seen
    dependencies: RefCell<SmallVec<[(SignalId, u64); 4]>>,
}

/// Internal effect node storage
struct EffectNode {
    /// The effect body; taken out while it runs
    body: Option<EffectBody>,
    /// Teardown of the last invocation, in registration order
    cleanups: Vec<Cleanup>,
    /// Signals read by the last invocation
    dependencies: SmallVec<[SignalId; 4]>,
    /// Whether the effect is queued for a re-run
    dirty: bool,
    /// Completed body invocations
    runs: u64,
    /// Name used in traces
    label: &'static str,
}

struct PendingCommit {
    effect: EffectId,
    token: Cancellable,
    run: CommitFn,
}

/// Outcome of a [`ReactiveGraph::tick`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Effect/commit passes taken to settle
    pub passes: usize,
    /// Effect bodies re-run
    pub effects_run: usize,
    /// Deferred commits executed
    pub commits_run: usize,
    /// Deferred commits dropped because their token was cancelled
    pub commits_skipped: usize,
}

/// The reactive graph that owns all signals, derived values and effects
pub struct ReactiveGraph {
    signals: SlotMap<SignalId, SignalNode>,
    derived: SlotMap<DerivedId, DerivedNode>,
    effects: SlotMap<EffectId, EffectNode>,
    /// Dirty effects in the order they were dirtied
    pending_effects: VecDeque<EffectId>,
    /// Deferred work for the commit phase
    commits: Vec<PendingCommit>,
    /// Dependency frames for the effect/derived currently evaluating
    tracking: RefCell<Vec<SmallVec<[SignalId; 8]>>>,
    /// Global version counter
    global_version: u64,
    /// True while a tick is draining
    flushing: bool,
    max_passes: usize,
    ticks: u64,
}

impl ReactiveGraph {
    /// Create a new reactive graph
    pub fn new() -> Self {
        Self::with_max_passes(DEFAULT_MAX_PASSES)
    }

    /// Create a graph with a custom pass limit per tick
    pub fn with_max_passes(max_passes: usize) -> Self {
        Self {
            signals: SlotMap::with_key(),
            derived: SlotMap::with_key(),
            effects: SlotMap::with_key(),
            pending_effects: VecDeque::new(),
            commits: Vec::new(),
            tracking: RefCell::new(Vec::new()),
            global_version: 0,
            flushing: false,
            max_passes: max_passes.max(1),
            ticks: 0,
        }
    }

    // =========================================================================
    // SIGNALS
    // =========================================================================

    /// Create a new signal with an initial value
    pub fn create_signal<T: 'static>(&mut self, initial: T) -> Signal<T> {
        let id = self.signals.insert(SignalNode {
            value: Box::new(initial),
            version: 0,
            subscribers: SmallVec::new(),
        });
        Signal {
            id,
            _marker: PhantomData,
        }
    }

    /// Get the current value of a signal
    ///
    /// If called while an effect body or a derived computation runs, the
    /// signal is recorded as one of its dependencies.
    pub fn get<T: Clone + 'static>(&self, signal: Signal<T>) -> Option<T> {
        self.track(signal.id);
        self.get_untracked(signal)
    }

    /// Get the current value without tracking it as a dependency
    pub fn get_untracked<T: Clone + 'static>(&self, signal: Signal<T>) -> Option<T> {
        self.signals
            .get(signal.id)
            .and_then(|node| node.value.downcast_ref::<T>().cloned())
    }

    /// Set the value of a signal
    ///
    /// A value equal to the stored one is ignored. Otherwise every dependent
    /// effect is marked dirty and queued for the next [`tick`](Self::tick);
    /// nothing runs inside `set`. Returns whether a change was recorded.
    pub fn set<T: PartialEq + 'static>(&mut self, signal: Signal<T>, value: T) -> bool {
        match self.signals.get_mut(signal.id) {
            Some(node) => {
                if node.value.downcast_ref::<T>() == Some(&value) {
                    return false;
                }
                node.value = Box::new(value);
            }
            None => {
                tracing::warn!(signal = ?signal.id, "write to disposed signal ignored");
                return false;
            }
        }
        self.notify(signal.id);
        true
    }

    /// Update a signal using a function
    pub fn update<T, F>(&mut self, signal: Signal<T>, f: F) -> bool
    where
        T: Clone + PartialEq + 'static,
        F: FnOnce(T) -> T,
    {
        match self.get_untracked(signal) {
            Some(current) => self.set(signal, f(current)),
            None => false,
        }
    }

    /// Notify dependents of a signal without comparing values
    pub fn trigger<T: 'static>(&mut self, signal: Signal<T>) {
        if self.signals.contains_key(signal.id) {
            self.notify(signal.id);
        }
    }

    /// Remove a signal; its former subscribers are never notified again
    pub fn dispose_signal<T: 'static>(&mut self, signal: Signal<T>) {
        if let Some(node) = self.signals.remove(signal.id) {
            for effect in node.subscribers {
                if let Some(effect) = self.effects.get_mut(effect) {
                    effect.dependencies.retain(|dep| *dep != signal.id);
                }
            }
        }
    }

    /// Get the version of a signal (for change detection)
    pub fn signal_version(&self, id: SignalId) -> Option<u64> {
        self.signals.get(id).map(|n| n.version)
    }

    // =========================================================================
    // DERIVED VALUES
    // =========================================================================

    /// Create a derived (computed) value
    pub fn create_derived<T, F>(&mut self, compute: F) -> Derived<T>
    where
        T: Clone + 'static,
        F: Fn(&ReactiveGraph) -> T + 'static,
    {
        let compute: ComputeFn = Rc::new(move |graph: &ReactiveGraph| -> Box<dyn Any> {
            Box::new(compute(graph))
        });

        let id = self.derived.insert(DerivedNode {
            value: RefCell::new(None),
            compute,
            dependencies: RefCell::new(SmallVec::new()),
        });

        Derived {
            id,
            _marker: PhantomData,
        }
    }

    /// Get the value of a derived, recomputing if any dependency changed
    ///
    /// Readers inside an effect become dependent on the derived value's
    /// underlying signals.
    pub fn get_derived<T: Clone + 'static>(&self, derived: Derived<T>) -> Option<T> {
        let node = self.derived.get(derived.id)?;

        let stale = node.value.borrow().is_none()
            || node
                .dependencies
                .borrow()
                .iter()
                .any(|&(id, version)| self.signal_version(id) != Some(version));

        if stale {
            let compute = node.compute.clone();
            self.tracking.borrow_mut().push(SmallVec::new());
            let value = compute(self);
            let deps = self.tracking.borrow_mut().pop().unwrap_or_default();

            *node.dependencies.borrow_mut() = deps
                .iter()
                .filter_map(|&id| self.signal_version(id).map(|v| (id, v)))
                .collect();
            *node.value.borrow_mut() = Some(value);
        }

        for &(id, _) in node.dependencies.borrow().iter() {
            self.track(id);
        }

        node.value
            .borrow()
            .as_ref()
            .and_then(|cached| cached.downcast_ref::<T>().cloned())
    }

    /// Remove a derived value
    pub fn dispose_derived<T>(&mut self, derived: Derived<T>) {
        self.derived.remove(derived.id);
    }

    // =========================================================================
    // EFFECTS
    // =========================================================================

    /// Create an effect and run it once immediately
    ///
    /// If the first run fails the effect is torn down and removed, and the
    /// error is returned.
    pub fn create_effect<F>(&mut self, body: F) -> Result<Effect>
    where
        F: FnMut(&mut EffectScope<'_>) -> EffectResult + 'static,
    {
        self.create_effect_labeled("effect", body)
    }

    /// Create an effect with a label used in traces
    pub fn create_effect_labeled<F>(&mut self, label: &'static str, body: F) -> Result<Effect>
    where
        F: FnMut(&mut EffectScope<'_>) -> EffectResult + 'static,
    {
        let id = self.effects.insert(EffectNode {
            body: Some(Box::new(body)),
            cleanups: Vec::new(),
            dependencies: SmallVec::new(),
            dirty: true,
            runs: 0,
            label,
        });
        tracing::trace!(effect = ?id, label, "effect created");

        if let Err(err) = self.run_effect(id) {
            if let Err(teardown) = self.dispose_effect(Effect { id }) {
                tracing::error!(effect = ?id, label, error = %teardown, "teardown after failed first run");
            }
            return Err(err);
        }

        Ok(Effect { id })
    }

    /// Tear down an effect and remove it from the graph
    ///
    /// Disposing an effect twice is reported as [`ReactiveError::UnknownEffect`].
    pub fn dispose_effect(&mut self, effect: Effect) -> Result<()> {
        let Some(node) = self.effects.remove(effect.id) else {
            tracing::error!(effect = ?effect.id, "dispose of unknown effect");
            return Err(ReactiveError::UnknownEffect(effect.id));
        };

        for dep in &node.dependencies {
            if let Some(sig) = self.signals.get_mut(*dep) {
                sig.subscribers.retain(|s| *s != effect.id);
            }
        }
        self.pending_effects.retain(|id| *id != effect.id);
        tracing::trace!(effect = ?effect.id, label = node.label, "effect disposed");

        self.run_cleanups(node.cleanups)
            .map_err(|source| ReactiveError::TeardownFailed {
                effect: effect.id,
                source,
            })
    }

    /// Whether the effect is still registered
    pub fn contains_effect(&self, effect: Effect) -> bool {
        self.effects.contains_key(effect.id)
    }

    /// Number of completed body invocations of an effect
    pub fn effect_runs(&self, effect: Effect) -> Option<u64> {
        self.effects.get(effect.id).map(|n| n.runs)
    }

    // =========================================================================
    // SCHEDULING
    // =========================================================================

    /// Settle the graph
    ///
    /// Each pass tears down and re-runs every dirty effect, then runs the
    /// commit phase. Passes repeat until nothing is dirty and no commit is
    /// pending. A tick requested while one is already draining (from inside
    /// a body or commit) is coalesced into the running one.
    ///
    /// The first failing body, teardown or commit stops the tick and is
    /// returned; work still queued stays queued for the next tick.
    pub fn tick(&mut self) -> Result<TickReport> {
        if self.flushing {
            return Ok(TickReport::default());
        }
        self.flushing = true;
        let result = self.flush();
        self.flushing = false;
        self.ticks += 1;
        result
    }

    /// Whether any effect or commit is waiting for a tick
    pub fn has_pending(&self) -> bool {
        !self.pending_effects.is_empty() || !self.commits.is_empty()
    }

    fn flush(&mut self) -> Result<TickReport> {
        let mut report = TickReport::default();

        for _ in 0..self.max_passes {
            if !self.has_pending() {
                return Ok(report);
            }
            report.passes += 1;

            while let Some(id) = self.pending_effects.pop_front() {
                if self.run_effect(id)? {
                    report.effects_run += 1;
                }
            }

            let mut commits = std::mem::take(&mut self.commits).into_iter();
            while let Some(PendingCommit { effect, token, run }) = commits.next() {
                if token.is_done() {
                    tracing::trace!(effect = ?effect, "cancelled commit skipped");
                    report.commits_skipped += 1;
                    continue;
                }
                if let Err(source) = run(self) {
                    let rest: Vec<PendingCommit> = commits.collect();
                    self.commits.splice(0..0, rest);
                    return Err(ReactiveError::CommitFailed { effect, source });
                }
                report.commits_run += 1;
            }
        }

        if self.has_pending() {
            tracing::error!(passes = self.max_passes, "reactive graph did not settle");
            Err(ReactiveError::Unsettled(self.max_passes))
        } else {
            Ok(report)
        }
    }

    /// Run a single dirty effect: teardown first, then the body
    fn run_effect(&mut self, id: EffectId) -> Result<bool> {
        let (mut body, cleanups, label) = match self.effects.get_mut(id) {
            Some(node) if node.dirty => {
                node.dirty = false;
                match node.body.take() {
                    Some(body) => (body, std::mem::take(&mut node.cleanups), node.label),
                    None => return Ok(false),
                }
            }
            _ => return Ok(false),
        };

        if let Err(source) = self.run_cleanups(cleanups) {
            if let Some(node) = self.effects.get_mut(id) {
                node.body = Some(body);
            }
            return Err(ReactiveError::TeardownFailed { effect: id, source });
        }

        tracing::trace!(effect = ?id, label, "effect run");
        self.tracking.borrow_mut().push(SmallVec::new());
        let mut scope = EffectScope {
            graph: self,
            effect: id,
            cleanups: Vec::new(),
        };
        let result = body(&mut scope);
        let EffectScope { cleanups, .. } = scope;
        let deps = self.tracking.borrow_mut().pop().unwrap_or_default();

        if self.effects.contains_key(id) {
            self.resubscribe(id, &deps);
            if let Some(node) = self.effects.get_mut(id) {
                node.body = Some(body);
                node.cleanups = cleanups;
                node.runs += 1;
            }
        } else {
            // Disposed from inside its own body: release what it just built.
            drop(body);
            self.run_cleanups(cleanups)
                .map_err(|source| ReactiveError::TeardownFailed { effect: id, source })?;
        }

        result.map_err(|source| ReactiveError::EffectFailed { effect: id, source })?;
        Ok(true)
    }

    /// Run cleanups last-registered first; all run even if one fails
    fn run_cleanups(&mut self, cleanups: Vec<Cleanup>) -> EffectResult {
        let mut first_error = None;
        for cleanup in cleanups.into_iter().rev() {
            if let Err(err) = cleanup(self) {
                tracing::warn!(error = %err, "cleanup failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn resubscribe(&mut self, id: EffectId, deps: &[SignalId]) {
        let old = match self.effects.get_mut(id) {
            Some(node) => std::mem::take(&mut node.dependencies),
            None => return,
        };

        for dep in old.iter().filter(|dep| !deps.contains(dep)) {
            if let Some(sig) = self.signals.get_mut(*dep) {
                sig.subscribers.retain(|s| *s != id);
            }
        }

        let mut kept: SmallVec<[SignalId; 4]> = SmallVec::new();
        for &dep in deps {
            if let Some(sig) = self.signals.get_mut(dep) {
                if !sig.subscribers.contains(&id) {
                    sig.subscribers.push(id);
                }
                kept.push(dep);
            }
        }

        if let Some(node) = self.effects.get_mut(id) {
            node.dependencies = kept;
        }
    }

    fn track(&self, id: SignalId) {
        if let Some(frame) = self.tracking.borrow_mut().last_mut() {
            if !frame.contains(&id) {
                frame.push(id);
            }
        }
    }

    fn notify(&mut self, id: SignalId) {
        let subscribers = match self.signals.get_mut(id) {
            Some(node) => {
                node.version += 1;
                node.subscribers.clone()
            }
            None => return,
        };
        self.global_version += 1;

        for sub in subscribers {
            self.mark_dirty(sub);
        }
    }

    /// Mark an effect dirty and queue it (once per tick)
    fn mark_dirty(&mut self, id: EffectId) {
        if let Some(node) = self.effects.get_mut(id) {
            if !node.dirty {
                node.dirty = true;
                self.pending_effects.push_back(id);
            }
        }
    }

    fn push_commit(&mut self, effect: EffectId, token: Cancellable, run: CommitFn) {
        self.commits.push(PendingCommit { effect, token, run });
    }

    /// Get statistics about the reactive graph
    pub fn stats(&self) -> ReactiveStats {
        ReactiveStats {
            signal_count: self.signals.len(),
            derived_count: self.derived.len(),
            effect_count: self.effects.len(),
            pending_effects: self.pending_effects.len(),
            pending_commits: self.commits.len(),
            global_version: self.global_version,
            ticks: self.ticks,
        }
    }
}

impl Default for ReactiveGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the reactive graph
#[derive(Debug, Clone)]
pub struct ReactiveStats {
    pub signal_count: usize,
    pub derived_count: usize,
    pub effect_count: usize,
    pub pending_effects: usize,
    pub pending_commits: usize,
    pub global_version: u64,
    pub ticks: u64,
}

// =============================================================================
// EFFECT SCOPE - what an effect body sees while it runs
// =============================================================================

/// Access to the graph from inside an effect body
///
/// Reads through the scope are tracked as dependencies of the running
/// effect. Cleanups registered here become the effect's teardown.
pub struct EffectScope<'a> {
    graph: &'a mut ReactiveGraph,
    effect: EffectId,
    cleanups: Vec<Cleanup>,
}

impl EffectScope<'_> {
    /// The effect currently running
    pub fn effect_id(&self) -> EffectId {
        self.effect
    }

    /// Tracked read
    pub fn get<T: Clone + 'static>(&self, signal: Signal<T>) -> Option<T> {
        self.graph.get(signal)
    }

    /// Untracked read
    pub fn get_untracked<T: Clone + 'static>(&self, signal: Signal<T>) -> Option<T> {
        self.graph.get_untracked(signal)
    }

    /// Tracked read of a derived value
    pub fn get_derived<T: Clone + 'static>(&self, derived: Derived<T>) -> Option<T> {
        self.graph.get_derived(derived)
    }

    /// Write a signal; dependents re-run later in the same tick
    pub fn set<T: PartialEq + 'static>(&mut self, signal: Signal<T>, value: T) -> bool {
        self.graph.set(signal, value)
    }

    /// Force a change notification
    pub fn trigger<T: 'static>(&mut self, signal: Signal<T>) {
        self.graph.trigger(signal)
    }

    /// Register a teardown step. Steps run last-registered first.
    pub fn on_cleanup<F>(&mut self, cleanup: F)
    where
        F: FnOnce(&mut ReactiveGraph) -> EffectResult + 'static,
    {
        self.cleanups.push(Box::new(cleanup));
    }

    /// Defer work to the commit phase of the current pass
    ///
    /// The returned token is cancelled when this invocation tears down; a
    /// cancelled commit never runs. Whatever the commit creates should
    /// register its release on the token.
    pub fn defer<F>(&mut self, commit: F) -> Cancellable
    where
        F: FnOnce(&mut ReactiveGraph) -> EffectResult + 'static,
    {
        let token = Cancellable::new();
        self.graph
            .push_commit(self.effect, token.clone(), Box::new(commit));

        let cancel = token.clone();
        self.on_cleanup(move |_| {
            cancel.cancel();
            Ok(())
        });
        token
    }

    /// Direct access to the graph (signal creation, nested effects)
    pub fn graph(&mut self) -> &mut ReactiveGraph {
        self.graph
    }
}
