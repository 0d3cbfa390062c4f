//! Subscriber types for the reactive system.
//!
//! A subscriber is any computation that reads reactive state: plain effects,
//! watchers and memos. Buckets in the registry hold subscribers behind the
//! [`Subscriber`] trait so they can be notified without knowing the value type
//! the computation produces.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use super::registry::{Bucket, DebugEvent};

/// Unique identifier for a subscriber.
///
/// Ids are handed out by a runtime in creation order, so they double as the
/// ordering key of the scheduler: a computation created earlier flushes
/// earlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Take the next id from a runtime-local counter.
    pub(crate) fn next(counter: &Cell<u64>) -> Self {
        let id = counter.get();
        counter.set(id + 1);
        Self(id)
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl From<u64> for SubscriberId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A computation that can be subscribed to dependency buckets.
pub(crate) trait Subscriber {
    /// Get the subscriber ID.
    fn subscriber_id(&self) -> SubscriberId;

    /// Whether the computation may be triggered by its own writes.
    fn allow_recurse(&self) -> bool;

    /// `false` once the computation has been stopped.
    fn is_active(&self) -> bool;

    /// Remember a bucket this subscriber was just added to.
    fn record_dependency(&self, bucket: &Rc<Bucket>);

    /// Debug hook fired when a new subscription is made.
    fn on_track(&self, event: &DebugEvent);

    /// One of the dependencies changed: schedule or re-run.
    fn notify(&self, event: &DebugEvent);
}
