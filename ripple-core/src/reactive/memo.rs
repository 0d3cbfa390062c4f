//! Memo Implementation
//!
//! A Memo is a cached derived value that re-evaluates only when read after
//! one of its dependencies changed.
//!
//! # How Memos Work
//!
//! 1. A memo wraps a lazy computation. Nothing runs until the first read.
//!
//! 2. The computation's scheduling callback does not recompute. It only
//!    marks the memo dirty and notifies the memo's own readers.
//!
//! 3. The next read of a dirty memo re-runs the computation and caches the
//!    result.
//!
//! This avoids unnecessary work: memos that are never read stay dirty.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use super::effect::{Effect, EffectOptions};
use super::registry::{Key, TargetHandle, TargetId, TrackOp, TriggerOp};
use super::runtime::Runtime;

/// A lazily evaluated, cached derivation.
///
/// # Example
///
/// ```rust
/// use ripple_core::{Memo, Runtime};
///
/// let runtime = Runtime::new();
/// let count = runtime.signal(2);
/// let doubled = Memo::new(&runtime, {
///     let count = count.clone();
///     move || count.get() * 2
/// });
///
/// assert_eq!(doubled.get(), 4);
/// count.set(5);
/// assert_eq!(doubled.get(), 10);
/// ```
pub struct Memo<T: 'static> {
    inner: Rc<MemoInner<T>>,
}

struct MemoInner<T: 'static> {
    value: RefCell<Option<T>>,
    dirty: Cell<bool>,
    handle: TargetHandle,
    effect: Effect<T>,
}

impl Runtime {
    /// Create a memo owned by this runtime.
    pub fn memo<T, F>(&self, compute: F) -> Memo<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        Memo::new(self, compute)
    }
}

impl<T: 'static> Memo<T> {
    pub fn new<F>(runtime: &Runtime, compute: F) -> Self
    where
        F: Fn() -> T + 'static,
    {
        let inner = Rc::new_cyclic(|this: &std::rc::Weak<MemoInner<T>>| {
            let this = this.clone();
            let options = EffectOptions::new().lazy().scheduler(move || {
                let Some(memo) = this.upgrade() else {
                    return;
                };
                if !memo.dirty.replace(true) {
                    memo.handle.trigger(TriggerOp::Set, &[Key::Value]);
                }
            });

            MemoInner {
                value: RefCell::new(None),
                dirty: Cell::new(true),
                handle: TargetHandle::new(runtime),
                effect: runtime.effect(compute, options),
            }
        });

        Self { inner }
    }

    pub fn id(&self) -> TargetId {
        self.inner.handle.id()
    }

    pub fn belongs_to(&self, runtime: &Runtime) -> bool {
        self.inner.handle.belongs_to(runtime)
    }

    /// Whether the next read will recompute.
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.get()
    }

    /// Number of times the derivation has been computed.
    pub fn compute_count(&self) -> usize {
        self.inner.effect.run_count()
    }
}

impl<T: Clone + 'static> Memo<T> {
    /// Read the cached value, recomputing first if dirty.
    ///
    /// # Panics
    ///
    /// Panics if the memo is read from inside its own derivation.
    pub fn get(&self) -> T {
        match self.try_get() {
            Some(value) => value,
            None => panic!("memo {} read itself while computing", self.id()),
        }
    }

    /// Like [`Memo::get`], but returns `None` instead of panicking when the
    /// memo is read from inside its own derivation.
    pub fn try_get(&self) -> Option<T> {
        let inner = &self.inner;
        inner.handle.track(TrackOp::Get, Key::Value);

        if inner.dirty.get() {
            let value = inner.effect.run()?;
            inner.dirty.set(false);
            *inner.value.borrow_mut() = Some(value);
        }

        inner.value.borrow().clone()
    }
}

impl<T: 'static> Drop for MemoInner<T> {
    fn drop(&mut self) {
        self.effect.stop();
    }
}

impl<T: 'static> Clone for Memo<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Memos compare by identity.
impl<T: 'static> PartialEq for Memo<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Memo<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.id())
            .field("dirty", &self.is_dirty())
            .field("value", &self.inner.value.try_borrow().ok())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
