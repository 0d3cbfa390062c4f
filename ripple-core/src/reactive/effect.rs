//! Effect Implementation
//!
//! An Effect (computation) is a re-runnable body that both reads reactive
//! state and is invalidated by it.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its body immediately to establish
//!    initial dependencies (unless created `lazy`).
//!
//! 2. When any dependency changes, the registry hands the effect to its
//!    scheduling callback, or re-runs it in place when it has none.
//!
//! 3. Every run starts by unsubscribing from all buckets recorded during the
//!    previous run. Dependencies on branches that are no longer taken (a
//!    conditional read, say) disappear this way.
//!
//! 4. A running effect is never re-entered: if its own run triggers it, the
//!    nested run is skipped.
//!
//! # Ownership
//!
//! Buckets own the effects subscribed to them; an effect holds weak
//! back-references to its buckets. An effect with live dependencies therefore
//! keeps running even if every [`Effect`] handle is dropped, until it is
//! stopped or its dependencies go away.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use super::registry::{Bucket, DebugEvent};
use super::runtime::{Runtime, WeakRuntime};
use super::subscriber::{Subscriber, SubscriberId};

/// Debug hook signature shared by `on_track` and `on_trigger`.
pub type DebugHook = Rc<dyn Fn(&DebugEvent)>;

/// Options accepted by [`Runtime::effect`].
#[derive(Clone, Default)]
pub struct EffectOptions {
    /// Skip the initial run.
    pub lazy: bool,

    /// Allow the effect to be triggered by its own writes.
    pub allow_recurse: bool,

    /// Called instead of re-running the effect when a dependency changes.
    pub scheduler: Option<Rc<dyn Fn()>>,

    pub on_track: Option<DebugHook>,
    pub on_trigger: Option<DebugHook>,

    /// Called once when the effect is stopped.
    pub on_stop: Option<Rc<dyn Fn()>>,
}

impl EffectOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    pub fn allow_recurse(mut self) -> Self {
        self.allow_recurse = true;
        self
    }

    pub fn scheduler(mut self, scheduler: impl Fn() + 'static) -> Self {
        self.scheduler = Some(Rc::new(scheduler));
        self
    }

    pub fn on_track(mut self, hook: impl Fn(&DebugEvent) + 'static) -> Self {
        self.on_track = Some(Rc::new(hook));
        self
    }

    pub fn on_trigger(mut self, hook: impl Fn(&DebugEvent) + 'static) -> Self {
        self.on_trigger = Some(Rc::new(hook));
        self
    }

    pub fn on_stop(mut self, hook: impl Fn() + 'static) -> Self {
        self.on_stop = Some(Rc::new(hook));
        self
    }
}

impl fmt::Debug for EffectOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EffectOptions")
            .field("lazy", &self.lazy)
            .field("allow_recurse", &self.allow_recurse)
            .field("scheduler", &self.scheduler.is_some())
            .finish()
    }
}

/// A re-runnable computation producing `T` on every run.
///
/// # Example
///
/// ```rust
/// use ripple_core::{EffectOptions, Runtime, Signal};
/// use std::cell::Cell;
/// use std::rc::Rc;
///
/// let runtime = Runtime::new();
/// let count = Signal::new(&runtime, 0);
/// let seen = Rc::new(Cell::new(0));
///
/// let effect = runtime.effect(
///     {
///         let count = count.clone();
///         let seen = seen.clone();
///         move || seen.set(count.get())
///     },
///     EffectOptions::default(),
/// );
///
/// count.set(5);
/// assert_eq!(seen.get(), 5);
///
/// effect.stop();
/// count.set(6);
/// assert_eq!(seen.get(), 5);
/// ```
pub struct Effect<T: 'static> {
    inner: Rc<EffectInner<T>>,
}

/// Non-owning handle to an effect.
pub(crate) struct WeakEffect<T: 'static>(Weak<EffectInner<T>>);

impl<T: 'static> WeakEffect<T> {
    pub(crate) fn upgrade(&self) -> Option<Effect<T>> {
        self.0.upgrade().map(|inner| Effect { inner })
    }
}

struct EffectInner<T: 'static> {
    id: SubscriberId,
    runtime: WeakRuntime,
    body: Box<dyn Fn() -> T>,
    active: Cell<bool>,
    allow_recurse: Cell<bool>,
    deps: RefCell<SmallVec<[Weak<Bucket>; 4]>>,
    scheduler: Option<Rc<dyn Fn()>>,
    on_track: Option<DebugHook>,
    on_trigger: Option<DebugHook>,
    on_stop: Option<Rc<dyn Fn()>>,
    run_count: Cell<usize>,
    this: Weak<EffectInner<T>>,
}

impl Runtime {
    /// Create a computation around `body`.
    pub fn effect<T, F>(&self, body: F, options: EffectOptions) -> Effect<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        let id = self.next_subscriber_id();
        self.effect_with_id(id, body, options)
    }

    /// Create a computation whose id was reserved beforehand.
    pub(crate) fn effect_with_id<T, F>(&self, id: SubscriberId, body: F, options: EffectOptions) -> Effect<T>
    where
        T: 'static,
        F: Fn() -> T + 'static,
    {
        let lazy = options.lazy;
        let effect = Effect {
            inner: Rc::new_cyclic(|this| EffectInner {
                id,
                runtime: self.downgrade(),
                body: Box::new(body),
                active: Cell::new(true),
                allow_recurse: Cell::new(options.allow_recurse),
                deps: RefCell::new(SmallVec::new()),
                scheduler: options.scheduler,
                on_track: options.on_track,
                on_trigger: options.on_trigger,
                on_stop: options.on_stop,
                run_count: Cell::new(0),
                this: this.clone(),
            }),
        };

        if !lazy {
            effect.run();
        }

        effect
    }
}

impl<T: 'static> Effect<T> {
    /// Run the body with dependency tracking.
    ///
    /// Returns `None` when the effect is already running further up the
    /// stack, or when it is stopped and has a scheduler. A stopped effect
    /// without a scheduler runs its body untracked.
    pub fn run(&self) -> Option<T> {
        self.inner.run()
    }

    /// Unsubscribe from everything and never track again.
    ///
    /// Stopping twice is a no-op.
    pub fn stop(&self) {
        let inner = &self.inner;
        if !inner.active.get() {
            return;
        }

        inner.cleanup();
        if let Some(on_stop) = &inner.on_stop {
            on_stop();
        }
        inner.active.set(false);
    }

    pub fn id(&self) -> SubscriberId {
        self.inner.id
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    pub fn allows_recurse(&self) -> bool {
        self.inner.allow_recurse.get()
    }

    pub fn set_allow_recurse(&self, allow: bool) {
        self.inner.allow_recurse.set(allow);
    }

    /// Number of completed-or-started tracked runs.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.get()
    }

    /// Number of buckets the effect belongs to.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .deps
            .borrow()
            .iter()
            .filter(|bucket| bucket.strong_count() > 0)
            .count()
    }

    pub(crate) fn downgrade(&self) -> WeakEffect<T> {
        WeakEffect(Rc::downgrade(&self.inner))
    }
}

impl<T: 'static> EffectInner<T> {
    fn run(&self) -> Option<T> {
        if !self.active.get() {
            return match self.scheduler {
                Some(_) => None,
                None => Some((self.body)()),
            };
        }

        let Some(runtime) = self.runtime.upgrade() else {
            return Some((self.body)());
        };
        let context = &runtime.inner.context;
        if context.contains(self.id) {
            return None;
        }
        let this: Rc<dyn Subscriber> = self.this.upgrade()?;

        self.cleanup();
        let _guard = context.enter(this);
        self.run_count.set(self.run_count.get() + 1);
        Some((self.body)())
    }

    /// Leave every bucket recorded during the last run.
    fn cleanup(&self) {
        let deps = std::mem::take(&mut *self.deps.borrow_mut());
        let removed: SmallVec<[Rc<dyn Subscriber>; 4]> = deps
            .iter()
            .filter_map(Weak::upgrade)
            .filter_map(|bucket| bucket.remove(self.id))
            .collect();
        drop(removed);
    }
}

impl<T: 'static> Subscriber for EffectInner<T> {
    fn subscriber_id(&self) -> SubscriberId {
        self.id
    }

    fn allow_recurse(&self) -> bool {
        self.allow_recurse.get()
    }

    fn is_active(&self) -> bool {
        self.active.get()
    }

    fn record_dependency(&self, bucket: &Rc<Bucket>) {
        self.deps.borrow_mut().push(Rc::downgrade(bucket));
    }

    fn on_track(&self, event: &DebugEvent) {
        if let Some(hook) = &self.on_track {
            hook(event);
        }
    }

    fn notify(&self, event: &DebugEvent) {
        if let Some(hook) = &self.on_trigger {
            hook(event);
        }

        match &self.scheduler {
            Some(scheduler) => scheduler(),
            None => {
                self.run();
            }
        }
    }
}

impl<T: 'static> Clone for Effect<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T: 'static> fmt::Debug for Effect<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("active", &self.is_active())
            .finish()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
