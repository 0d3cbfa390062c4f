//! Deep traversal.
//!
//! Reading a container handle does not subscribe to what is inside it.
//! [`Traverse`] walks every reachable value and reads it through the normal
//! tracked accessors, so the running computation ends up subscribed to every
//! nested key. Deep watchers run their getter's result through [`traverse`].
//!
//! Reactive containers are visited at most once per walk, which makes
//! traversal safe on cyclic structures.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::rc::Rc;

use super::memo::Memo;
use super::registry::TargetId;
use super::signal::Signal;

/// Reactive targets already visited during one walk.
#[derive(Debug, Default)]
pub struct Seen {
    targets: HashSet<TargetId>,
}

impl Seen {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `target` was visited before.
    pub fn insert(&mut self, target: TargetId) -> bool {
        self.targets.insert(target)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

/// A value whose nested reactive state can be subscribed to in one pass.
pub trait Traverse {
    fn traverse(&self, seen: &mut Seen);
}

/// Subscribe the running computation to everything reachable from `value`.
pub fn traverse<T: Traverse + ?Sized>(value: &T) {
    value.traverse(&mut Seen::new());
}

macro_rules! impl_leaf {
    ($($ty:ty),* $(,)?) => {
        $(
            impl Traverse for $ty {
                #[inline]
                fn traverse(&self, _seen: &mut Seen) {}
            }
        )*
    };
}

impl_leaf!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
    &'static str,
    str,
);

impl<T: Traverse> Traverse for Option<T> {
    fn traverse(&self, seen: &mut Seen) {
        if let Some(value) = self {
            value.traverse(seen);
        }
    }
}

impl<T: Traverse> Traverse for [T] {
    fn traverse(&self, seen: &mut Seen) {
        self.iter().for_each(|value| value.traverse(seen));
    }
}

impl<T: Traverse> Traverse for Vec<T> {
    fn traverse(&self, seen: &mut Seen) {
        self.as_slice().traverse(seen);
    }
}

impl<T: Traverse> Traverse for VecDeque<T> {
    fn traverse(&self, seen: &mut Seen) {
        self.iter().for_each(|value| value.traverse(seen));
    }
}

impl<K, V: Traverse> Traverse for BTreeMap<K, V> {
    fn traverse(&self, seen: &mut Seen) {
        self.values().for_each(|value| value.traverse(seen));
    }
}

impl<T: Traverse + ?Sized> Traverse for Box<T> {
    fn traverse(&self, seen: &mut Seen) {
        (**self).traverse(seen);
    }
}

impl<T: Traverse + ?Sized> Traverse for Rc<T> {
    fn traverse(&self, seen: &mut Seen) {
        (**self).traverse(seen);
    }
}

macro_rules! impl_tuple {
    ($($name:ident),+) => {
        impl<$($name: Traverse),+> Traverse for ($($name,)+) {
            #[allow(non_snake_case)]
            fn traverse(&self, seen: &mut Seen) {
                let ($($name,)+) = self;
                $($name.traverse(seen);)+
            }
        }
    };
}

impl_tuple!(A);
impl_tuple!(A, B);
impl_tuple!(A, B, C);
impl_tuple!(A, B, C, D);

impl<T: Traverse + 'static> Traverse for Signal<T> {
    fn traverse(&self, seen: &mut Seen) {
        if !seen.insert(self.id()) {
            return;
        }
        self.with(|value| value.traverse(seen));
    }
}

impl<T: Traverse + Clone + 'static> Traverse for Memo<T> {
    fn traverse(&self, seen: &mut Seen) {
        if !seen.insert(self.id()) {
            return;
        }
        if let Some(value) = self.try_get() {
            value.traverse(seen);
        }
    }
}
