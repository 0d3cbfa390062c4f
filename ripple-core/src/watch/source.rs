//! What a watcher can observe.
//!
//! Every source is turned into a [`Getter`]: a closure the watcher's
//! computation calls on each run. Its result is compared with the previous
//! result to decide whether the callback fires.

use std::fmt;
use std::rc::Rc;

use crate::reactive::{
    has_changed, traverse, List, Map, MapKey, Memo, Record, Runtime, Set, Signal, Traverse,
};

/// The read side of a watcher.
///
/// A getter may come up empty (a memo read from inside its own
/// derivation); the watcher then skips that run.
pub struct Getter<V> {
    pub(crate) get: Rc<dyn Fn() -> Option<V>>,
    pub(crate) force_deep: bool,
}

impl<V> Getter<V> {
    pub fn new(get: impl Fn() -> V + 'static) -> Self {
        Self::fallible(move || Some(get()))
    }

    pub fn fallible(get: impl Fn() -> Option<V> + 'static) -> Self {
        Self {
            get: Rc::new(get),
            force_deep: false,
        }
    }

    /// Always traverse the result, whatever the watcher's `deep` option.
    pub fn deep(mut self) -> Self {
        self.force_deep = true;
        self
    }
}

/// Something [`Runtime::watch`](crate::Runtime::watch) can observe.
pub trait Source {
    type Value: Clone + PartialEq + Traverse + 'static;

    /// Build the getter. `None` means the source cannot be tracked by
    /// `runtime`; the watcher is then reported and left inert.
    fn into_getter(self, runtime: &Runtime) -> Option<Getter<Self::Value>>;

    /// Whether a fresh result differs from the previous one.
    fn changed(new: &Self::Value, old: &Self::Value) -> bool {
        has_changed(new, old)
    }
}

/// One entry of a watched source: a reactive value, a derivation, a plain
/// getter or a whole container.
pub enum WatchSource<T: 'static> {
    Signal(Signal<T>),
    Memo(Memo<T>),
    /// A closure read on every run; reactive reads inside it are tracked.
    Getter(Rc<dyn Fn() -> T>),
    /// A container handle, traversed deeply on every run.
    Reactive(T),
}

impl<T: 'static> WatchSource<T> {
    pub fn getter(get: impl Fn() -> T + 'static) -> Self {
        WatchSource::Getter(Rc::new(get))
    }

    pub fn reactive(container: T) -> Self {
        WatchSource::Reactive(container)
    }
}

impl<T: Clone + Traverse + 'static> WatchSource<T> {
    fn belongs_to(&self, runtime: &Runtime) -> bool {
        match self {
            WatchSource::Signal(signal) => signal.belongs_to(runtime),
            WatchSource::Memo(memo) => memo.belongs_to(runtime),
            WatchSource::Getter(_) | WatchSource::Reactive(_) => true,
        }
    }

    fn read(&self) -> Option<T> {
        match self {
            WatchSource::Signal(signal) => Some(signal.get()),
            WatchSource::Memo(memo) => memo.try_get(),
            WatchSource::Getter(get) => Some(get()),
            WatchSource::Reactive(container) => {
                traverse(container);
                Some(container.clone())
            }
        }
    }
}

impl<T: 'static> From<Signal<T>> for WatchSource<T> {
    fn from(signal: Signal<T>) -> Self {
        WatchSource::Signal(signal)
    }
}

impl<T: 'static> From<Memo<T>> for WatchSource<T> {
    fn from(memo: Memo<T>) -> Self {
        WatchSource::Memo(memo)
    }
}

impl<T: 'static> Clone for WatchSource<T>
where
    T: Clone,
{
    fn clone(&self) -> Self {
        match self {
            WatchSource::Signal(signal) => WatchSource::Signal(signal.clone()),
            WatchSource::Memo(memo) => WatchSource::Memo(memo.clone()),
            WatchSource::Getter(get) => WatchSource::Getter(get.clone()),
            WatchSource::Reactive(container) => WatchSource::Reactive(container.clone()),
        }
    }
}

impl<T: 'static> fmt::Debug for WatchSource<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            WatchSource::Signal(signal) => return write!(f, "WatchSource::Signal({})", signal.id()),
            WatchSource::Memo(memo) => return write!(f, "WatchSource::Memo({})", memo.id()),
            WatchSource::Getter(_) => "Getter",
            WatchSource::Reactive(_) => "Reactive",
        };
        write!(f, "WatchSource::{kind}")
    }
}

impl<T> Source for Signal<T>
where
    T: Clone + PartialEq + Traverse + 'static,
{
    type Value = T;

    fn into_getter(self, runtime: &Runtime) -> Option<Getter<T>> {
        self.belongs_to(runtime)
            .then(|| Getter::new(move || self.get()))
    }
}

impl<T> Source for Memo<T>
where
    T: Clone + PartialEq + Traverse + 'static,
{
    type Value = T;

    fn into_getter(self, runtime: &Runtime) -> Option<Getter<T>> {
        self.belongs_to(runtime)
            .then(|| Getter::fallible(move || self.try_get()))
    }
}

impl<T> Source for WatchSource<T>
where
    T: Clone + PartialEq + Traverse + 'static,
{
    type Value = T;

    fn into_getter(self, runtime: &Runtime) -> Option<Getter<T>> {
        if !self.belongs_to(runtime) {
            return None;
        }
        let force_deep = matches!(self, WatchSource::Reactive(_));
        let getter = Getter::fallible(move || self.read());
        Some(if force_deep { getter.deep() } else { getter })
    }
}

/// Several sources watched together. The value is a fresh `Vec` per run
/// and counts as changed when any position changed.
impl<T> Source for Vec<WatchSource<T>>
where
    T: Clone + PartialEq + Traverse + 'static,
{
    type Value = Vec<T>;

    fn into_getter(self, runtime: &Runtime) -> Option<Getter<Vec<T>>> {
        if !self.iter().all(|source| source.belongs_to(runtime)) {
            return None;
        }
        Some(Getter::fallible(move || self.iter().map(WatchSource::read).collect()))
    }

    fn changed(new: &Vec<T>, old: &Vec<T>) -> bool {
        new.len() != old.len() || new.iter().zip(old).any(|(new, old)| has_changed(new, old))
    }
}

macro_rules! impl_container_source {
    ($name:ident<$($param:ident),+> where $($bounds:tt)+) => {
        /// Watching a container watches everything inside it.
        impl<$($param),+> Source for $name<$($param),+>
        where
            $($bounds)+
        {
            type Value = Self;

            fn into_getter(self, runtime: &Runtime) -> Option<Getter<Self>> {
                self.belongs_to(runtime)
                    .then(|| Getter::new(move || self.clone()).deep())
            }
        }
    };
}

impl_container_source!(Record<V> where V: Traverse + 'static);
impl_container_source!(List<T> where T: Traverse + 'static);
impl_container_source!(Map<K, V> where K: MapKey, V: Traverse + 'static);
impl_container_source!(Set<T> where T: MapKey + Traverse);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_sources_compare_per_position() {
        type Multi = Vec<WatchSource<f64>>;

        assert!(!Multi::changed(&vec![1.0, f64::NAN], &vec![1.0, f64::NAN]));
        assert!(Multi::changed(&vec![1.0, f64::NAN], &vec![2.0, f64::NAN]));
        assert!(Multi::changed(&vec![1.0], &vec![1.0, 2.0]));
    }

    #[test]
    fn foreign_sources_have_no_getter() {
        let home = Runtime::new();
        let other = Runtime::new();
        let signal = other.signal(1);

        assert!(signal.clone().into_getter(&home).is_none());
        assert!(signal.into_getter(&other).is_some());
        assert!(vec![WatchSource::getter(|| 1), WatchSource::from(other.signal(2))]
            .into_getter(&home)
            .is_none());
    }

    #[test]
    fn reactive_entries_force_deep() {
        let runtime = Runtime::new();
        let list = runtime.list(vec![1]);

        let getter = WatchSource::reactive(list.clone()).into_getter(&runtime).unwrap();
        assert!(getter.force_deep);
        assert_eq!((getter.get)(), Some(list));

        let getter = WatchSource::getter(|| 3).into_getter(&runtime).unwrap();
        assert!(!getter.force_deep);
    }
}
