use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexSet;

use super::{impl_container_handle, MapKey};
use crate::reactive::registry::{Key, TargetHandle, TrackOp, TriggerOp};
use crate::reactive::runtime::Runtime;
use crate::reactive::traverse::{Seen, Traverse};

/// A reactive set, iterated in insertion order.
///
/// ```rust
/// use ripple_core::{Runtime, Set};
///
/// let runtime = Runtime::new();
/// let tags = Set::new(&runtime);
///
/// assert!(tags.insert("draft"));
/// assert!(!tags.insert("draft"));
/// assert!(tags.contains(&"draft"));
/// ```
pub struct Set<T> {
    inner: Rc<SetInner<T>>,
}

struct SetInner<T> {
    members: RefCell<IndexSet<T>>,
    handle: TargetHandle,
}

impl_container_handle!(Set<T>);

impl Runtime {
    pub fn set<T: MapKey>(&self) -> Set<T> {
        Set::new(self)
    }
}

impl<T: MapKey> Set<T> {
    pub fn new(runtime: &Runtime) -> Self {
        Self::from_values(runtime, std::iter::empty())
    }

    pub fn from_values(runtime: &Runtime, values: impl IntoIterator<Item = T>) -> Self {
        Self {
            inner: Rc::new(SetInner {
                members: RefCell::new(values.into_iter().collect()),
                handle: TargetHandle::new(runtime),
            }),
        }
    }

    pub fn contains(&self, value: &T) -> bool {
        self.inner.handle.track(TrackOp::Has, value.to_key());
        self.inner.members.borrow().contains(value)
    }

    pub fn len(&self) -> usize {
        self.inner.handle.track(TrackOp::Iterate, Key::Iterate);
        self.inner.members.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn values(&self) -> Vec<T> {
        self.inner.handle.track(TrackOp::Iterate, Key::Iterate);
        self.inner.members.borrow().iter().cloned().collect()
    }

    /// Returns `false` if the value was already present.
    pub fn insert(&self, value: T) -> bool {
        let key = value.to_key();
        if !self.inner.members.borrow_mut().insert(value) {
            return false;
        }
        self.inner.handle.trigger(TriggerOp::Add, &[key, Key::Iterate]);
        true
    }

    /// Returns `false` if the value was absent.
    pub fn remove(&self, value: &T) -> bool {
        if !self.inner.members.borrow_mut().shift_remove(value) {
            return false;
        }
        self.inner
            .handle
            .trigger(TriggerOp::Delete, &[value.to_key(), Key::Iterate]);
        true
    }

    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.inner.members.borrow_mut());
        if !removed.is_empty() {
            self.inner.handle.trigger(TriggerOp::Clear, &[]);
        }
        drop(removed);
    }
}

impl<T: MapKey + Traverse> Traverse for Set<T> {
    fn traverse(&self, seen: &mut Seen) {
        if !seen.insert(self.id()) {
            return;
        }
        self.inner.handle.track(TrackOp::Iterate, Key::Iterate);
        for value in self.inner.members.borrow().iter() {
            value.traverse(seen);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for Set<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.members.try_borrow() {
            Ok(members) => f.debug_set().entries(members.iter()).finish(),
            Err(_) => f.write_str("Set(<borrowed>)"),
        }
    }
}
