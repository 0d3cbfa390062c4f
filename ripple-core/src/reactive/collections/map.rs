use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::{impl_container_handle, MapKey};
use crate::reactive::compare::has_changed;
use crate::reactive::registry::{Key, TargetHandle, TrackOp, TriggerOp};
use crate::reactive::runtime::Runtime;
use crate::reactive::traverse::{Seen, Traverse};

/// A reactive keyed map, iterated in insertion order.
///
/// Key listings (`keys`) only depend on which keys exist, so overwriting a
/// value does not re-run a computation that only listed keys.
///
/// ```rust
/// use ripple_core::{Map, Runtime};
///
/// let runtime = Runtime::new();
/// let scores = Map::new(&runtime);
/// scores.insert("ada", 3);
///
/// assert_eq!(scores.get(&"ada"), Some(3));
/// assert_eq!(scores.remove(&"ada"), Some(3));
/// assert!(scores.is_empty());
/// ```
pub struct Map<K, V> {
    inner: Rc<MapInner<K, V>>,
}

struct MapInner<K, V> {
    entries: RefCell<IndexMap<K, V>>,
    handle: TargetHandle,
}

impl_container_handle!(Map<K, V>);

impl Runtime {
    pub fn map<K: MapKey, V: 'static>(&self) -> Map<K, V> {
        Map::new(self)
    }
}

impl<K: MapKey, V: 'static> Map<K, V> {
    pub fn new(runtime: &Runtime) -> Self {
        Self::from_entries(runtime, std::iter::empty())
    }

    pub fn from_entries(runtime: &Runtime, entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            inner: Rc::new(MapInner {
                entries: RefCell::new(entries.into_iter().collect()),
                handle: TargetHandle::new(runtime),
            }),
        }
    }

    pub fn with<R>(&self, key: &K, f: impl FnOnce(Option<&V>) -> R) -> R {
        self.inner.handle.track(TrackOp::Get, key.to_key());
        f(self.inner.entries.borrow().get(key))
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.inner.handle.track(TrackOp::Has, key.to_key());
        self.inner.entries.borrow().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner.handle.track(TrackOp::Iterate, Key::Iterate);
        self.inner.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<K> {
        self.inner.handle.track(TrackOp::Iterate, Key::KeyIterate);
        self.inner.entries.borrow().keys().cloned().collect()
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        let removed = self.inner.entries.borrow_mut().shift_remove(key)?;
        self.inner.handle.trigger(
            TriggerOp::Delete,
            &[key.to_key(), Key::Iterate, Key::KeyIterate],
        );
        Some(removed)
    }

    pub fn clear(&self) {
        let removed = std::mem::take(&mut *self.inner.entries.borrow_mut());
        if !removed.is_empty() {
            self.inner.handle.trigger(TriggerOp::Clear, &[]);
        }
        drop(removed);
    }
}

impl<K: MapKey, V: Clone + 'static> Map<K, V> {
    pub fn get(&self, key: &K) -> Option<V> {
        self.with(key, |value| value.cloned())
    }

    pub fn values(&self) -> Vec<V> {
        self.inner.handle.track(TrackOp::Iterate, Key::Iterate);
        self.inner.entries.borrow().values().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(K, V)> {
        self.inner.handle.track(TrackOp::Iterate, Key::Iterate);
        self.inner
            .entries
            .borrow()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

impl<K: MapKey, V: PartialEq + 'static> Map<K, V> {
    /// Insert or overwrite. Returns whether anything was notified.
    pub fn insert(&self, key: K, value: V) -> bool {
        let target_key = key.to_key();
        let added = {
            let mut entries = self.inner.entries.borrow_mut();
            match entries.get_mut(&key) {
                Some(current) if !has_changed(&value, &*current) => return false,
                Some(current) => {
                    *current = value;
                    false
                }
                None => {
                    entries.insert(key, value);
                    true
                }
            }
        };

        let handle = &self.inner.handle;
        if added {
            handle.trigger(TriggerOp::Add, &[target_key, Key::Iterate, Key::KeyIterate]);
        } else {
            handle.trigger(TriggerOp::Set, &[target_key, Key::Iterate]);
        }
        true
    }
}

impl<K: MapKey, V: Traverse + 'static> Traverse for Map<K, V> {
    fn traverse(&self, seen: &mut Seen) {
        if !seen.insert(self.id()) {
            return;
        }
        self.inner.handle.track(TrackOp::Iterate, Key::Iterate);
        for value in self.inner.entries.borrow().values() {
            value.traverse(seen);
        }
    }
}

impl<K: fmt::Debug, V: fmt::Debug> fmt::Debug for Map<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.entries.try_borrow() {
            Ok(entries) => f.debug_map().entries(entries.iter()).finish(),
            Err(_) => f.write_str("Map(<borrowed>)"),
        }
    }
}
