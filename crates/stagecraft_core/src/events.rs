//! Synchronous event emitters
//!
//! Listeners receive the graph so they can write signals in response to an
//! event; the writes are picked up by the next tick.

use std::rc::Rc;

use crate::reactive::ReactiveGraph;

type Listener<E> = Rc<dyn Fn(&mut ReactiveGraph, &E)>;

/// Handle returned by [`Emitter::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription(u64);

/// An ordered list of listeners for one event type
pub struct Emitter<E> {
    listeners: Vec<(Subscription, Listener<E>)>,
    next_id: u64,
}

impl<E> Emitter<E> {
    pub fn new() -> Self {
        Self {
            listeners: Vec::new(),
            next_id: 0,
        }
    }

    /// Register a listener; listeners run in subscription order
    pub fn subscribe<F>(&mut self, listener: F) -> Subscription
    where
        F: Fn(&mut ReactiveGraph, &E) + 'static,
    {
        let id = Subscription(self.next_id);
        self.next_id += 1;
        self.listeners.push((id, Rc::new(listener)));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, subscription: Subscription) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(id, _)| *id != subscription);
        self.listeners.len() != before
    }

    /// Call every listener with the event
    pub fn emit(&self, graph: &mut ReactiveGraph, event: &E) {
        let listeners: Vec<Listener<E>> = self.listeners.iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(graph, event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}

impl<E> Default for Emitter<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_emit_reaches_listeners_in_order() {
        let mut graph = ReactiveGraph::new();
        let seen = graph.create_signal(Vec::<String>::new());
        let mut emitter: Emitter<&'static str> = Emitter::new();

        emitter.subscribe(move |g, e| {
            g.update(seen, |mut v| {
                v.push(format!("first {e}"));
                v
            });
        });
        emitter.subscribe(move |g, e| {
            g.update(seen, |mut v| {
                v.push(format!("second {e}"));
                v
            });
        });

        emitter.emit(&mut graph, &"end");
        assert_eq!(graph.get(seen).unwrap(), vec!["first end", "second end"]);
    }

    #[test]
    fn test_unsubscribe() {
        let mut graph = ReactiveGraph::new();
        let hits = graph.create_signal(0u32);
        let mut emitter: Emitter<()> = Emitter::new();

        let sub = emitter.subscribe(move |g, _| {
            g.update(hits, |n| n + 1);
        });
        emitter.emit(&mut graph, &());
        assert!(emitter.unsubscribe(sub));
        assert!(!emitter.unsubscribe(sub));
        emitter.emit(&mut graph, &());

        assert_eq!(graph.get(hits), Some(1));
        assert!(emitter.is_empty());
    }
}
