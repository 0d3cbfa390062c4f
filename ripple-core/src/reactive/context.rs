//! Reactive Context
//!
//! The reactive context tracks which computation is currently running.
//! This enables automatic dependency tracking: when a container is read,
//! the registry subscribes the computation on top of the stack.
//!
//! # Implementation
//!
//! Each runtime owns one stack. Running a computation pushes it and the
//! returned [`ContextGuard`] pops it again, even when the body panics. Nested
//! computations therefore restore the correct outer context on exit.
//!
//! Tracking can be paused with a nestable counter. Entering a computation
//! saves the counter and resets it to zero so the body always tracks; the
//! guard restores the saved value.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use super::subscriber::{Subscriber, SubscriberId};

#[derive(Default)]
pub(crate) struct ContextStack {
    stack: RefCell<Vec<Rc<dyn Subscriber>>>,
    paused: Cell<u32>,
}

impl ContextStack {
    /// Enter the context of `subscriber`.
    pub(crate) fn enter(&self, subscriber: Rc<dyn Subscriber>) -> ContextGuard<'_> {
        let id = subscriber.subscriber_id();
        self.stack.borrow_mut().push(subscriber);
        let paused = self.paused.replace(0);

        ContextGuard {
            context: self,
            id,
            paused,
        }
    }

    /// The computation on top of the stack, if any.
    pub(crate) fn current(&self) -> Option<Rc<dyn Subscriber>> {
        self.stack.borrow().last().cloned()
    }

    pub(crate) fn current_id(&self) -> Option<SubscriberId> {
        self.stack.borrow().last().map(|entry| entry.subscriber_id())
    }

    /// Whether `id` is running, at any depth.
    pub(crate) fn contains(&self, id: SubscriberId) -> bool {
        self.stack
            .borrow()
            .iter()
            .any(|entry| entry.subscriber_id() == id)
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.borrow().len()
    }

    /// Reads register dependencies only when this is true.
    pub(crate) fn is_tracking(&self) -> bool {
        self.paused.get() == 0 && self.depth() > 0
    }

    pub(crate) fn pause(&self) -> PauseTracking<'_> {
        self.paused.set(self.paused.get() + 1);
        PauseTracking { context: self }
    }
}

/// Guard that pops the context when dropped.
pub(crate) struct ContextGuard<'a> {
    context: &'a ContextStack,
    id: SubscriberId,
    paused: u32,
}

impl Drop for ContextGuard<'_> {
    fn drop(&mut self) {
        let popped = self.context.stack.borrow_mut().pop();
        self.context.paused.set(self.paused);

        if let Some(entry) = popped {
            debug_assert_eq!(
                entry.subscriber_id(),
                self.id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.id,
                entry.subscriber_id()
            );
        }
    }
}

/// Scoped switch that turns tracking off until dropped.
///
/// Guards nest: tracking resumes once every guard is gone.
#[must_use = "tracking resumes as soon as the guard is dropped"]
pub struct PauseTracking<'a> {
    context: &'a ContextStack,
}

impl Drop for PauseTracking<'_> {
    fn drop(&mut self) {
        let paused = self.context.paused.get();
        self.context.paused.set(paused.saturating_sub(1));
    }
}
