use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::impl_container_handle;
use crate::reactive::compare::has_changed;
use crate::reactive::registry::{Key, TargetHandle, TrackOp, TriggerOp};
use crate::reactive::runtime::Runtime;
use crate::reactive::traverse::{Seen, Traverse};

/// A reactive ordered sequence.
///
/// Index reads subscribe to that position, `len` to the length, and whole
/// reads (`to_vec`, `with`) to the structure. Writes notify exactly the
/// positions they move, plus the length when it changes.
///
/// ```rust
/// use ripple_core::{List, Runtime};
///
/// let runtime = Runtime::new();
/// let list = List::new(&runtime, vec![1, 2]);
/// list.push(3);
///
/// assert_eq!(list.to_vec(), vec![1, 2, 3]);
/// assert_eq!(list.pop(), Some(3));
/// assert_eq!(list.len(), 2);
/// ```
pub struct List<T> {
    inner: Rc<ListInner<T>>,
}

struct ListInner<T> {
    items: RefCell<Vec<T>>,
    handle: TargetHandle,
}

impl_container_handle!(List<T>);

impl Runtime {
    pub fn list<T: 'static>(&self, items: Vec<T>) -> List<T> {
        List::new(self, items)
    }
}

impl<T: 'static> List<T> {
    pub fn new(runtime: &Runtime, items: Vec<T>) -> Self {
        Self {
            inner: Rc::new(ListInner {
                items: RefCell::new(items),
                handle: TargetHandle::new(runtime),
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.handle.track(TrackOp::Get, Key::Length);
        self.inner.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the whole sequence by reference.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        self.track_all();
        f(&self.inner.items.borrow())
    }

    pub fn push(&self, value: T) {
        let index = {
            let mut items = self.inner.items.borrow_mut();
            items.push(value);
            items.len() - 1
        };
        self.inner
            .handle
            .trigger(TriggerOp::Add, &[Key::Index(index), Key::Length, Key::Iterate]);
    }

    pub fn pop(&self) -> Option<T> {
        let (value, index) = {
            let mut items = self.inner.items.borrow_mut();
            let value = items.pop()?;
            (value, items.len())
        };
        self.inner
            .handle
            .trigger(TriggerOp::Delete, &[Key::Index(index), Key::Length, Key::Iterate]);
        Some(value)
    }

    /// Insert at `index`, shifting later items. Returns `false` when
    /// `index > len`.
    pub fn insert(&self, index: usize, value: T) -> bool {
        let len = {
            let mut items = self.inner.items.borrow_mut();
            if index > items.len() {
                return false;
            }
            items.insert(index, value);
            items.len()
        };
        self.trigger_range(TriggerOp::Add, index, len);
        true
    }

    /// Remove the item at `index`, shifting later items.
    pub fn remove(&self, index: usize) -> Option<T> {
        let (value, old_len) = {
            let mut items = self.inner.items.borrow_mut();
            if index >= items.len() {
                return None;
            }
            let old_len = items.len();
            (items.remove(index), old_len)
        };
        self.trigger_range(TriggerOp::Delete, index, old_len);
        Some(value)
    }

    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.inner.items.borrow_mut());
        if !removed.is_empty() {
            self.inner.handle.trigger(TriggerOp::Clear, &[]);
        }
        drop(removed);
    }

    fn track_all(&self) {
        let handle = &self.inner.handle;
        handle.track(TrackOp::Iterate, Key::Iterate);
        handle.track(TrackOp::Get, Key::Length);
    }

    /// Notify positions `start..end`, the length and the structure.
    fn trigger_range(&self, op: TriggerOp, start: usize, end: usize) {
        let keys: Vec<Key> = (start..end)
            .map(Key::Index)
            .chain([Key::Length, Key::Iterate])
            .collect();
        self.inner.handle.trigger(op, &keys);
    }
}

impl<T: Clone + 'static> List<T> {
    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.handle.track(TrackOp::Get, Key::Index(index));
        self.inner.items.borrow().get(index).cloned()
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.with(<[T]>::to_vec)
    }
}

impl<T: PartialEq + 'static> List<T> {
    /// Overwrite the item at `index`; `index == len` appends.
    ///
    /// Returns whether anything was notified. Writing past the end leaves
    /// the list untouched.
    pub fn set(&self, index: usize, value: T) -> bool {
        {
            let mut items = self.inner.items.borrow_mut();
            if index == items.len() {
                drop(items);
                self.push(value);
                return true;
            }
            match items.get_mut(index) {
                Some(current) if !has_changed(&value, &*current) => return false,
                Some(current) => *current = value,
                None => return false,
            }
        }

        self.inner
            .handle
            .trigger(TriggerOp::Set, &[Key::Index(index), Key::Iterate]);
        true
    }

    pub fn contains(&self, value: &T) -> bool {
        self.with(|items| items.contains(value))
    }
}

impl<T: Traverse + 'static> Traverse for List<T> {
    fn traverse(&self, seen: &mut Seen) {
        if !seen.insert(self.id()) {
            return;
        }
        self.track_all();
        let handle = &self.inner.handle;
        for (index, value) in self.inner.items.borrow().iter().enumerate() {
            handle.track(TrackOp::Get, Key::Index(index));
            value.traverse(seen);
        }
    }
}

impl<T: fmt::Debug> fmt::Debug for List<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.items.try_borrow() {
            Ok(items) => f.debug_list().entries(items.iter()).finish(),
            Err(_) => f.write_str("List(<borrowed>)"),
        }
    }
}
