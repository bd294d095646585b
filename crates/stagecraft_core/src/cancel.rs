//! Cancellation tokens
//!
//! A [`Cancellable`] is a shared done-flag with an ordered list of callbacks
//! that run when it is cancelled. Deferred commit work checks the flag before
//! running, and whatever the commit creates registers its release with
//! [`Cancellable::on_cancel`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

type CancelCallback = Box<dyn FnOnce()>;

#[derive(Default)]
struct CancelState {
    done: bool,
    callbacks: Vec<CancelCallback>,
}

/// Shared cancellation handle (cheap to clone)
#[derive(Clone, Default)]
pub struct Cancellable {
    state: Rc<RefCell<CancelState>>,
}

impl Cancellable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether [`cancel`](Self::cancel) has been called
    pub fn is_done(&self) -> bool {
        self.state.borrow().done
    }

    /// Cancel the handle and run registered callbacks in registration order.
    ///
    /// Idempotent: only the first call runs callbacks.
    pub fn cancel(&self) {
        let callbacks = {
            let mut state = self.state.borrow_mut();
            if state.done {
                return;
            }
            state.done = true;
            std::mem::take(&mut state.callbacks)
        };
        for callback in callbacks {
            callback();
        }
    }

    /// Register a callback to run on cancellation.
    ///
    /// If the handle is already cancelled the callback runs immediately.
    pub fn on_cancel<F>(&self, callback: F)
    where
        F: FnOnce() + 'static,
    {
        {
            let mut state = self.state.borrow_mut();
            if !state.done {
                state.callbacks.push(Box::new(callback));
                return;
            }
        }
        callback();
    }
}

impl fmt::Debug for Cancellable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("Cancellable")
            .field("done", &state.done)
            .field("callbacks", &state.callbacks.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_cancel_runs_callbacks_once() {
        let runs = Rc::new(Cell::new(0));
        let handle = Cancellable::new();

        let runs_clone = runs.clone();
        handle.on_cancel(move || runs_clone.set(runs_clone.get() + 1));

        assert!(!handle.is_done());
        handle.cancel();
        handle.cancel();

        assert!(handle.is_done());
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn test_on_cancel_after_done_runs_immediately() {
        let handle = Cancellable::new();
        handle.cancel();

        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();
        handle.on_cancel(move || ran_clone.set(true));

        assert!(ran.get());
    }

    #[test]
    fn test_clones_share_state() {
        let handle = Cancellable::new();
        let other = handle.clone();
        other.cancel();
        assert!(handle.is_done());
    }
}
