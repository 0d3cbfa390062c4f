//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects containers,
//! computations and the scheduler. It owns every piece of state the engine
//! needs: the dependency registry, the active computation stack, both job
//! queues and the host used to defer flushes. Nothing is global, so several
//! runtimes can live side by side in one thread without seeing each other.
//!
//! # How It Works
//!
//! 1. A container read calls [`Runtime::track`], which subscribes the
//!    computation on top of the stack to the (target, key) bucket.
//!
//! 2. A container write calls [`Runtime::trigger`], which snapshots the
//!    bucket and hands every subscriber to its scheduling callback, or runs it
//!    in place when it has none.
//!
//! 3. Scheduling callbacks usually queue a job; the queue is flushed once the
//!    current synchronous turn is over.
//!
//! # Threading
//!
//! A runtime is single-threaded (`Rc` + `RefCell`). No `RefCell` borrow is
//! held while user code runs, so bodies may freely read, write and create
//! computations.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use super::context::{ContextStack, PauseTracking};
use super::registry::{DebugEvent, Key, Operation, Registry, TargetId, TrackOp, TriggerOp};
use super::subscriber::SubscriberId;
use crate::config::RuntimeConfig;
use crate::error::{default_error_handler, EngineError, ErrorHandler, Result};
use crate::scheduler::{Host, LocalQueue, Scheduler};

/// Handle to a reactive runtime. Cloning is cheap and shares the runtime.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    pub(crate) context: ContextStack,
    pub(crate) registry: RefCell<Registry>,
    pub(crate) scheduler: Scheduler,
    pub(crate) host: Rc<dyn Host>,
    error_handler: ErrorHandler,
    next_subscriber: Cell<u64>,
    next_target: Cell<u64>,
}

/// Non-owning runtime handle held by containers, computations and jobs.
#[derive(Clone, Default)]
pub(crate) struct WeakRuntime(Weak<RuntimeInner>);

impl WeakRuntime {
    pub(crate) fn upgrade(&self) -> Option<Runtime> {
        self.0.upgrade().map(|inner| Runtime { inner })
    }

    pub(crate) fn ptr_eq(&self, runtime: &Runtime) -> bool {
        Weak::as_ptr(&self.0) == Rc::as_ptr(&runtime.inner)
    }
}

/// Builder for a [`Runtime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    config: RuntimeConfig,
    error_handler: Option<ErrorHandler>,
    host: Option<Rc<dyn Host>>,
}

impl RuntimeBuilder {
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    /// Receive every error and warning instead of logging them.
    pub fn error_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(&EngineError) + 'static,
    {
        self.error_handler = Some(Rc::new(handler));
        self
    }

    /// Use `host` to defer flushes. Defaults to a [`LocalQueue`] drained by
    /// [`Runtime::run_microtasks`].
    pub fn host<H>(mut self, host: H) -> Self
    where
        H: Host + 'static,
    {
        self.host = Some(Rc::new(host));
        self
    }

    pub fn build(self) -> Runtime {
        Runtime {
            inner: Rc::new(RuntimeInner {
                config: self.config,
                context: ContextStack::default(),
                registry: RefCell::new(Registry::default()),
                scheduler: Scheduler::default(),
                host: self.host.unwrap_or_else(|| Rc::new(LocalQueue::default())),
                error_handler: self.error_handler.unwrap_or_else(default_error_handler),
                next_subscriber: Cell::new(0),
                next_target: Cell::new(0),
            }),
        }
    }
}

impl Runtime {
    /// Create a runtime with the default configuration and a local
    /// microtask queue.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub(crate) fn downgrade(&self) -> WeakRuntime {
        WeakRuntime(Rc::downgrade(&self.inner))
    }

    pub(crate) fn next_subscriber_id(&self) -> SubscriberId {
        SubscriberId::next(&self.inner.next_subscriber)
    }

    pub(crate) fn next_target_id(&self) -> TargetId {
        let id = self.inner.next_target.get();
        self.inner.next_target.set(id + 1);
        TargetId::new(id)
    }

    /// Whether two handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Hand an error or warning to the configured handler.
    pub fn report(&self, error: &EngineError) {
        (self.inner.error_handler)(error);
    }

    /// Record that the running computation read `key` of `target`.
    ///
    /// No-op when no computation is running or tracking is paused.
    pub fn track(&self, target: TargetId, op: TrackOp, key: Key) {
        let context = &self.inner.context;
        if !context.is_tracking() {
            return;
        }
        let Some(active) = context.current() else {
            return;
        };

        let id = active.subscriber_id();
        let bucket = match self.inner.registry.try_borrow_mut() {
            Ok(mut registry) => registry.bucket(target, key.clone()),
            Err(_) => return,
        };

        if !bucket.insert(active.clone()) {
            return;
        }
        active.record_dependency(&bucket);

        tracing::trace!(effect = %id, %target, ?key, ?op, "tracked dependency");
        active.on_track(&DebugEvent {
            effect: id,
            target,
            key,
            op: Operation::Track(op),
        });
    }

    /// Notify every computation that read `key` of `target`.
    pub fn trigger(&self, target: TargetId, key: Key) {
        self.trigger_op(target, TriggerOp::Set, &[key]);
    }

    /// Notify the union of the buckets touched by one write.
    ///
    /// The running computation is skipped unless it allows recursion, and
    /// stopped computations are skipped. Members are snapshotted before any
    /// of them runs, so re-runs that change subscriptions do not disturb the
    /// iteration.
    pub fn trigger_op(&self, target: TargetId, op: TriggerOp, keys: &[Key]) {
        let snapshot = match self.inner.registry.try_borrow() {
            Ok(registry) => registry.collect(target, op, keys),
            Err(_) => return,
        };
        if snapshot.is_empty() {
            return;
        }

        tracing::trace!(%target, ?op, subscribers = snapshot.len(), "triggering dependents");

        let running = self.inner.context.current_id();
        for (id, (subscriber, key)) in snapshot {
            if Some(id) == running && !subscriber.allow_recurse() {
                continue;
            }
            if !subscriber.is_active() {
                continue;
            }

            subscriber.notify(&DebugEvent {
                effect: id,
                target,
                key,
                op: Operation::Trigger(op),
            });
        }
    }

    /// Drop every bucket of `target`.
    pub(crate) fn forget_target(&self, target: TargetId) {
        let removed = match self.inner.registry.try_borrow_mut() {
            Ok(mut registry) => registry.forget(target),
            Err(_) => return,
        };
        // Buckets may own the last handle of a computation whose body owns
        // other containers; release them with the registry unborrowed.
        drop(removed);
    }

    /// Turn tracking off until the guard is dropped.
    pub fn pause_tracking(&self) -> PauseTracking<'_> {
        self.inner.context.pause()
    }

    /// Run `f` without attributing its reads to the running computation.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _paused = self.pause_tracking();
        f()
    }

    /// Whether a read right now would register a dependency.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.is_tracking()
    }

    /// The computation currently running, if any.
    pub fn current_subscriber(&self) -> Option<SubscriberId> {
        self.inner.context.current_id()
    }

    /// Number of computations subscribed to (target, key).
    pub fn subscriber_count(&self, target: TargetId, key: &Key) -> usize {
        self.inner.registry.borrow().subscriber_count(target, key)
    }

    /// Number of targets that currently have buckets.
    pub fn tracked_targets(&self) -> usize {
        self.inner.registry.borrow().target_count()
    }

    /// Drain the host's microtask queue, running any pending flush.
    ///
    /// Only hosts that own their queue (such as [`LocalQueue`]) do work here.
    /// Returns the number of microtasks run, or the first fatal error.
    pub fn run_microtasks(&self) -> Result<usize> {
        let host = self.inner.host.clone();
        host.run_microtasks()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("depth", &self.inner.context.depth())
            .field("tracked_targets", &self.tracked_targets())
            .finish()
    }
}
