use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use super::impl_container_handle;
use crate::reactive::compare::has_changed;
use crate::reactive::registry::{Key, TargetHandle, TrackOp, TriggerOp};
use crate::reactive::runtime::Runtime;
use crate::reactive::traverse::{Seen, Traverse};

/// A reactive object: named fields of one value type, in insertion order.
///
/// ```rust
/// use ripple_core::{Record, Runtime};
///
/// let runtime = Runtime::new();
/// let user = Record::from_entries(&runtime, [("name", String::from("ada"))]);
///
/// assert_eq!(user.get("name").as_deref(), Some("ada"));
/// assert!(user.set("name", String::from("grace")));
/// assert!(!user.has("email"));
/// ```
pub struct Record<V> {
    inner: Rc<RecordInner<V>>,
}

struct RecordInner<V> {
    fields: RefCell<IndexMap<Rc<str>, V>>,
    handle: TargetHandle,
}

impl_container_handle!(Record<V>);

impl Runtime {
    pub fn record<V: 'static>(&self) -> Record<V> {
        Record::new(self)
    }
}

impl<V: 'static> Record<V> {
    pub fn new(runtime: &Runtime) -> Self {
        Self::from_entries(runtime, std::iter::empty::<(Rc<str>, V)>())
    }

    pub fn from_entries<K, I>(runtime: &Runtime, fields: I) -> Self
    where
        K: Into<Rc<str>>,
        I: IntoIterator<Item = (K, V)>,
    {
        let fields = fields.into_iter().map(|(key, value)| (key.into(), value)).collect();
        Self {
            inner: Rc::new(RecordInner {
                fields: RefCell::new(fields),
                handle: TargetHandle::new(runtime),
            }),
        }
    }

    /// Read a field by reference.
    pub fn with<R>(&self, key: &str, f: impl FnOnce(Option<&V>) -> R) -> R {
        self.inner.handle.track(TrackOp::Get, Key::from(key));
        f(self.inner.fields.borrow().get(key))
    }

    pub fn has(&self, key: &str) -> bool {
        self.inner.handle.track(TrackOp::Has, Key::from(key));
        self.inner.fields.borrow().contains_key(key)
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.inner.handle.track(TrackOp::Iterate, Key::Iterate);
        self.inner.fields.borrow().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.handle.track(TrackOp::Iterate, Key::Iterate);
        self.inner.fields.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove a field. Returns its value if it existed.
    pub fn remove(&self, key: &str) -> Option<V> {
        let removed = self.inner.fields.borrow_mut().shift_remove(key)?;
        self.inner
            .handle
            .trigger(TriggerOp::Delete, &[Key::from(key), Key::Iterate]);
        Some(removed)
    }
}

impl<V: Clone + 'static> Record<V> {
    pub fn get(&self, key: &str) -> Option<V> {
        self.with(key, |value| value.cloned())
    }

    /// Every field, reading each one.
    pub fn entries(&self) -> Vec<(Rc<str>, V)> {
        let handle = &self.inner.handle;
        handle.track(TrackOp::Iterate, Key::Iterate);
        let entries: Vec<_> = self
            .inner
            .fields
            .borrow()
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        for (key, _) in &entries {
            handle.track(TrackOp::Get, Key::Str(key.clone()));
        }
        entries
    }
}

impl<V: PartialEq + 'static> Record<V> {
    /// Write a field. Adding a field also notifies structural readers.
    /// Returns whether anything was notified.
    pub fn set(&self, key: impl Into<Rc<str>>, value: V) -> bool {
        let key = key.into();
        let op = {
            let mut fields = self.inner.fields.borrow_mut();
            match fields.get_mut(&key) {
                Some(current) if !has_changed(&value, &*current) => return false,
                Some(current) => {
                    *current = value;
                    TriggerOp::Set
                }
                None => {
                    fields.insert(key.clone(), value);
                    TriggerOp::Add
                }
            }
        };

        let field = Key::Str(key);
        match op {
            TriggerOp::Add => self.inner.handle.trigger(op, &[field, Key::Iterate]),
            _ => self.inner.handle.trigger(op, &[field]),
        }
        true
    }
}

impl<V: Traverse + 'static> Traverse for Record<V> {
    fn traverse(&self, seen: &mut Seen) {
        if !seen.insert(self.id()) {
            return;
        }
        let handle = &self.inner.handle;
        handle.track(TrackOp::Iterate, Key::Iterate);
        for (key, value) in self.inner.fields.borrow().iter() {
            handle.track(TrackOp::Get, Key::Str(key.clone()));
            value.traverse(seen);
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Record<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.fields.try_borrow() {
            Ok(fields) => f.debug_map().entries(fields.iter()).finish(),
            Err(_) => f.write_str("Record(<borrowed>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::EffectOptions;
    use std::cell::Cell;

    fn counter() -> (Rc<Cell<usize>>, impl Fn() + Clone) {
        let runs = Rc::new(Cell::new(0));
        let bump = {
            let runs = runs.clone();
            move || runs.set(runs.get() + 1)
        };
        (runs, bump)
    }

    #[test]
    fn field_reads_subscribe_per_key() {
        let runtime = Runtime::new();
        let record = Record::from_entries(&runtime, [("a", 1), ("b", 2)]);
        let (runs, bump) = counter();

        let _effect = runtime.effect(
            {
                let record = record.clone();
                move || {
                    record.get("a");
                    bump();
                }
            },
            EffectOptions::default(),
        );

        record.set("b", 20);
        assert_eq!(runs.get(), 1);
        record.set("a", 10);
        assert_eq!(runs.get(), 2);
        record.set("a", 10);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn adding_and_removing_notify_key_listers() {
        let runtime = Runtime::new();
        let record = Record::<i32>::new(&runtime);
        let (runs, bump) = counter();

        let _effect = runtime.effect(
            {
                let record = record.clone();
                move || {
                    record.keys();
                    bump();
                }
            },
            EffectOptions::default(),
        );

        record.set("a", 1);
        assert_eq!(runs.get(), 2);
        record.set("a", 2);
        assert_eq!(runs.get(), 2);
        assert_eq!(record.remove("a"), Some(2));
        assert_eq!(runs.get(), 3);
        assert_eq!(record.remove("a"), None);
        assert_eq!(runs.get(), 3);
    }

    #[test]
    fn has_sees_later_additions() {
        let runtime = Runtime::new();
        let record = runtime.record::<bool>();
        let seen = Rc::new(RefCell::new(Vec::new()));

        let _effect = runtime.effect(
            {
                let record = record.clone();
                let seen = seen.clone();
                move || seen.borrow_mut().push(record.has("flag"))
            },
            EffectOptions::default(),
        );

        record.set("flag", false);
        assert_eq!(*seen.borrow(), vec![false, true]);
    }

    #[test]
    fn entries_preserve_insertion_order() {
        let runtime = Runtime::new();
        let record = Record::from_entries(&runtime, [("z", 1), ("a", 2)]);
        record.set("m", 3);
        record.remove("z");

        let keys: Vec<_> = record.entries().into_iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec![Rc::<str>::from("a"), Rc::<str>::from("m")]);
    }
}
