//! Signal Implementation
//!
//! A Signal is the simplest reactive container: one value behind one key.
//!
//! # How Signals Work
//!
//! 1. When a signal is read within a running computation, the computation is
//!    subscribed to the signal's `Value` key.
//!
//! 2. When the value is replaced by one that [`has_changed`], every
//!    subscriber is notified.
//!
//! 3. Cloning a signal clones the handle, not the value: all clones share
//!    the same state and the same dependency buckets.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use super::compare::has_changed;
use super::registry::{Key, TargetHandle, TargetId, TrackOp, TriggerOp};
use super::runtime::Runtime;

/// A reactive value of type `T`.
///
/// # Example
///
/// ```rust
/// use ripple_core::{Runtime, Signal};
///
/// let runtime = Runtime::new();
/// let count = runtime.signal(0);
///
/// assert_eq!(count.get(), 0);
/// assert!(count.set(5));
/// assert!(!count.set(5));
/// count.update(|value| *value += 1);
/// assert_eq!(count.get(), 6);
/// ```
pub struct Signal<T: 'static> {
    inner: Rc<SignalInner<T>>,
}

struct SignalInner<T> {
    value: RefCell<T>,
    handle: TargetHandle,
}

impl Runtime {
    /// Create a signal owned by this runtime.
    pub fn signal<T: 'static>(&self, value: T) -> Signal<T> {
        Signal::new(self, value)
    }
}

impl<T: 'static> Signal<T> {
    pub fn new(runtime: &Runtime, value: T) -> Self {
        Self {
            inner: Rc::new(SignalInner {
                value: RefCell::new(value),
                handle: TargetHandle::new(runtime),
            }),
        }
    }

    pub fn id(&self) -> TargetId {
        self.inner.handle.id()
    }

    /// Whether the signal was created by `runtime`.
    pub fn belongs_to(&self, runtime: &Runtime) -> bool {
        self.inner.handle.belongs_to(runtime)
    }

    /// Read the value by reference, subscribing the running computation.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.borrow())
    }

    /// Mutate the value in place and notify unconditionally.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        self.notify();
    }

    /// Force a notification without touching the value.
    pub fn notify(&self) {
        self.inner.handle.trigger(TriggerOp::Set, &[Key::Value]);
    }

    pub(crate) fn track(&self) {
        self.inner.handle.track(TrackOp::Get, Key::Value);
    }
}

impl<T: Clone + 'static> Signal<T> {
    /// Read the value, subscribing the running computation.
    pub fn get(&self) -> T {
        self.track();
        self.get_untracked()
    }

    pub fn get_untracked(&self) -> T {
        self.inner.value.borrow().clone()
    }
}

impl<T: PartialEq + 'static> Signal<T> {
    /// Store `value` and notify subscribers if it differs from the current
    /// value. Returns whether a notification was sent.
    pub fn set(&self, value: T) -> bool {
        self.replace(value).is_some()
    }

    /// Like [`Signal::set`], but hands back the previous value when it was
    /// replaced.
    pub fn replace(&self, value: T) -> Option<T> {
        let old = {
            let mut current = self.inner.value.borrow_mut();
            if !has_changed(&value, &*current) {
                return None;
            }
            std::mem::replace(&mut *current, value)
        };

        self.notify();
        Some(old)
    }
}

impl<T: 'static> Clone for Signal<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Signals compare by identity.
impl<T: 'static> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.value.try_borrow() {
            Ok(value) => f.debug_tuple("Signal").field(&*value).finish(),
            Err(_) => f.debug_tuple("Signal").field(&"<borrowed>").finish(),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
