//! Watchers
//!
//! A watcher is a computation plus a scheduler job. The computation reads
//! the source; the job re-runs it when the source changes, compares the
//! result with the previous one and calls the callback.
//!
//! # Flow
//!
//! 1. Setup runs the computation once to collect dependencies and remember
//!    the initial value (or, with `immediate`, runs the whole job so the
//!    callback fires right away with no previous value).
//!
//! 2. A write to a dependency hands the computation to its scheduling
//!    callback, which runs the job inline (`Sync`), queues it on the main
//!    queue (`Pre`) or queues it on the deferred queue (`Post`).
//!
//! 3. The job re-runs the computation. When the value changed (or the
//!    watcher is deep) the last registered cleanup runs, then the callback.
//!
//! Dropping a [`WatchHandle`] does not stop the watcher: it lives for as
//! long as it has dependencies. Call [`WatchHandle::stop`] to end it.

mod options;
mod source;

pub use options::{FlushMode, WatchOptions};
pub use source::{Getter, Source, WatchSource};

use std::cell::{OnceCell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::error::{call_with_error_handling, ErrorSource, Misuse};
use crate::reactive::{traverse, Effect, EffectOptions, Runtime, SubscriberId, WeakEffect, WeakRuntime};
use crate::scheduler::Job;

/// Registrar handed to watch callbacks and `watch_effect` accessors.
///
/// Only the most recently registered cleanup is kept. It runs right before
/// the next callback or accessor run, and when the watcher is stopped.
#[derive(Clone, Default)]
pub struct OnCleanup {
    slot: Rc<RefCell<Option<Box<dyn FnOnce()>>>>,
}

impl OnCleanup {
    pub fn register(&self, cleanup: impl FnOnce() + 'static) {
        *self.slot.borrow_mut() = Some(Box::new(cleanup));
    }

    pub fn is_registered(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// Run and forget the pending cleanup.
    fn run(&self, runtime: &WeakRuntime) {
        let Some(cleanup) = self.slot.borrow_mut().take() else {
            return;
        };
        if let Err(error) = call_with_error_handling(ErrorSource::WatchCleanup, cleanup) {
            if let Some(runtime) = runtime.upgrade() {
                runtime.report(&error);
            }
        }
    }
}

impl fmt::Debug for OnCleanup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OnCleanup")
            .field("registered", &self.is_registered())
            .finish()
    }
}

/// Type-erased stop handle of a watcher's computation.
trait Stoppable {
    fn stop(&self);
    fn is_active(&self) -> bool;
    fn id(&self) -> SubscriberId;
}

impl<T: 'static> Stoppable for Effect<T> {
    fn stop(&self) {
        Effect::stop(self);
    }

    fn is_active(&self) -> bool {
        Effect::is_active(self)
    }

    fn id(&self) -> SubscriberId {
        Effect::id(self)
    }
}

/// Returned by [`Runtime::watch`] and [`Runtime::watch_effect`].
pub struct WatchHandle {
    effect: Option<Box<dyn Stoppable>>,
    job: Option<Job>,
    runtime: WeakRuntime,
}

impl WatchHandle {
    fn inert(runtime: &Runtime) -> Self {
        Self {
            effect: None,
            job: None,
            runtime: runtime.downgrade(),
        }
    }

    /// Stop the watcher: unsubscribe, run the pending cleanup and cancel a
    /// queued run. Stopping twice is a no-op.
    pub fn stop(&self) {
        if let Some(effect) = &self.effect {
            effect.stop();
        }
        if let Some(job) = &self.job {
            job.deactivate();
            if let Some(runtime) = self.runtime.upgrade() {
                runtime.invalidate_job(job);
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.effect.as_ref().is_some_and(|effect| effect.is_active())
    }

    /// The id of the watcher's computation, usable as another watcher's
    /// `owner`. `None` for a watcher that could not be set up.
    pub fn id(&self) -> Option<SubscriberId> {
        self.effect.as_ref().map(|effect| effect.id())
    }
}

impl fmt::Debug for WatchHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchHandle")
            .field("id", &self.id())
            .field("active", &self.is_active())
            .finish()
    }
}

impl Runtime {
    /// Watch `source` and call `callback(new, old, on_cleanup)` whenever it
    /// changes.
    ///
    /// ```rust
    /// use ripple_core::{FlushMode, Runtime, WatchOptions};
    /// use std::cell::RefCell;
    /// use std::rc::Rc;
    ///
    /// let runtime = Runtime::new();
    /// let count = runtime.signal(1);
    /// let calls = Rc::new(RefCell::new(Vec::new()));
    ///
    /// let handle = runtime.watch(
    ///     count.clone(),
    ///     {
    ///         let calls = calls.clone();
    ///         move |new: &i32, old: Option<&i32>, _| calls.borrow_mut().push((*new, old.copied()))
    ///     },
    ///     WatchOptions::new().immediate().flush(FlushMode::Sync),
    /// );
    ///
    /// count.set(2);
    /// handle.stop();
    /// count.set(3);
    /// assert_eq!(*calls.borrow(), vec![(1, None), (2, Some(1))]);
    /// ```
    pub fn watch<S, F>(&self, source: S, callback: F, options: WatchOptions) -> WatchHandle
    where
        S: Source,
        F: Fn(&S::Value, Option<&S::Value>, &OnCleanup) + 'static,
    {
        let Some(getter) = source.into_getter(self) else {
            self.report(&Misuse::ForeignSource.into());
            return WatchHandle::inert(self);
        };

        let deep = options.deep || getter.force_deep;
        let body = {
            let runtime = self.downgrade();
            let get = getter.get;
            move || {
                let read = || {
                    let value = get()?;
                    if deep {
                        traverse(&value);
                    }
                    Some(value)
                };
                match call_with_error_handling(ErrorSource::WatchGetter, read) {
                    Ok(value) => value,
                    Err(error) => {
                        if let Some(runtime) = runtime.upgrade() {
                            runtime.report(&error);
                        }
                        None
                    }
                }
            }
        };

        let cleanup = OnCleanup::default();
        let old: Rc<RefCell<Option<S::Value>>> = Rc::default();
        let on_job = {
            let cleanup = cleanup.clone();
            let old = old.clone();
            move |runtime: &Runtime, effect: &Effect<Option<S::Value>>| {
                let Some(Some(new)) = effect.run() else {
                    return;
                };
                let changed = deep
                    || old
                        .borrow()
                        .as_ref()
                        .map_or(true, |previous| S::changed(&new, previous));
                if !changed {
                    return;
                }

                // Stored before the callback so a nested sync run compares
                // against this value.
                let previous = old.replace(Some(new.clone()));
                cleanup.run(&runtime.downgrade());
                let call = || callback(&new, previous.as_ref(), &cleanup);
                if let Err(error) = call_with_error_handling(ErrorSource::WatchCallback, call) {
                    runtime.report(&error);
                }
            }
        };

        let (effect, job) = self.spawn_watcher(&options, true, &cleanup, body, on_job);
        if options.immediate {
            job.run();
        } else {
            *old.borrow_mut() = effect.run().flatten();
        }

        tracing::debug!(watcher = %effect.id(), deep, immediate = options.immediate, "watcher created");
        WatchHandle {
            effect: Some(Box::new(effect)),
            job: Some(job),
            runtime: self.downgrade(),
        }
    }

    /// Run `accessor` now and again whenever anything it read changes.
    ///
    /// `immediate` and `deep` only apply to [`Runtime::watch`]; passing them
    /// here is reported as a warning and ignored.
    pub fn watch_effect<F>(&self, accessor: F, options: WatchOptions) -> WatchHandle
    where
        F: Fn(&OnCleanup) + 'static,
    {
        if options.immediate {
            self.report(&Misuse::ImmediateWithoutCallback.into());
        }
        if options.deep {
            self.report(&Misuse::DeepWithoutCallback.into());
        }

        let cleanup = OnCleanup::default();
        let body = {
            let runtime = self.downgrade();
            let cleanup = cleanup.clone();
            move || {
                cleanup.run(&runtime);
                if let Err(error) = call_with_error_handling(ErrorSource::WatchCallback, || accessor(&cleanup)) {
                    if let Some(runtime) = runtime.upgrade() {
                        runtime.report(&error);
                    }
                }
            }
        };
        let on_job = |_: &Runtime, effect: &Effect<()>| {
            effect.run();
        };

        let (effect, job) = self.spawn_watcher(&options, false, &cleanup, body, on_job);
        if self.flush_mode(&options) == FlushMode::Post {
            self.queue_post_job(&job);
        } else {
            effect.run();
        }

        WatchHandle {
            effect: Some(Box::new(effect)),
            job: Some(job),
            runtime: self.downgrade(),
        }
    }

    fn flush_mode(&self, options: &WatchOptions) -> FlushMode {
        options.flush.unwrap_or(self.config().default_flush)
    }

    /// Wire a lazy computation to a job according to the flush mode.
    ///
    /// The computation's scheduling callback owns the job; the job only
    /// holds a weak handle back to the computation.
    fn spawn_watcher<V, B, J>(
        &self,
        options: &WatchOptions,
        has_callback: bool,
        cleanup: &OnCleanup,
        body: B,
        on_job: J,
    ) -> (Effect<V>, Job)
    where
        V: 'static,
        B: Fn() -> V + 'static,
        J: Fn(&Runtime, &Effect<V>) + 'static,
    {
        let flush = self.flush_mode(options);
        let id = self.next_subscriber_id();
        let this: Rc<OnceCell<WeakEffect<V>>> = Rc::default();

        let job = Job::new({
            let runtime = self.downgrade();
            let this = this.clone();
            move || {
                let Some(runtime) = runtime.upgrade() else {
                    return;
                };
                let Some(effect) = this.get().and_then(WeakEffect::upgrade) else {
                    return;
                };
                if effect.is_active() {
                    on_job(&runtime, &effect);
                }
            }
        })
        .with_id(options.owner.unwrap_or(id).raw())
        .pre(flush == FlushMode::Pre)
        .allow_recurse(has_callback);

        let scheduler: Rc<dyn Fn()> = {
            let job = job.clone();
            let runtime = self.downgrade();
            match flush {
                FlushMode::Sync => Rc::new(move || job.run()),
                FlushMode::Pre => Rc::new(move || {
                    if let Some(runtime) = runtime.upgrade() {
                        runtime.queue_job(&job);
                    }
                }),
                FlushMode::Post => Rc::new(move || {
                    if let Some(runtime) = runtime.upgrade() {
                        runtime.queue_post_job(&job);
                    }
                }),
            }
        };

        let on_stop = {
            let cleanup = cleanup.clone();
            let runtime = self.downgrade();
            move || cleanup.run(&runtime)
        };

        let effect_options = EffectOptions {
            lazy: true,
            allow_recurse: false,
            scheduler: Some(scheduler),
            on_track: options.on_track.clone(),
            on_trigger: options.on_trigger.clone(),
            on_stop: Some(Rc::new(on_stop)),
        };

        let effect = self.effect_with_id(id, body, effect_options);
        // Freshly created, so the cell is empty.
        let _ = this.set(effect.downgrade());
        (effect, job)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;
    use crate::reactive::{List, Memo};
    use std::cell::Cell;

    fn recording_runtime() -> (Runtime, Rc<RefCell<Vec<String>>>) {
        let errors = Rc::new(RefCell::new(Vec::new()));
        let runtime = Runtime::builder()
            .error_handler({
                let errors = errors.clone();
                move |error: &EngineError| errors.borrow_mut().push(error.to_string())
            })
            .build();
        (runtime, errors)
    }

    #[test]
    fn pre_watchers_wait_for_the_flush() {
        let runtime = Runtime::new();
        let count = runtime.signal(0);
        let calls = Rc::new(RefCell::new(Vec::new()));

        let _handle = runtime.watch(
            count.clone(),
            {
                let calls = calls.clone();
                move |new: &i32, old: Option<&i32>, _: &OnCleanup| calls.borrow_mut().push((*new, old.copied()))
            },
            WatchOptions::default(),
        );

        count.set(1);
        count.set(2);
        assert!(calls.borrow().is_empty());

        runtime.run_microtasks().unwrap();
        assert_eq!(*calls.borrow(), vec![(2, Some(0))]);
    }

    #[test]
    fn unchanged_results_skip_the_callback() {
        let runtime = Runtime::new();
        let count = runtime.signal(1);
        let calls = Rc::new(Cell::new(0));

        let _handle = runtime.watch(
            WatchSource::getter({
                let count = count.clone();
                move || count.get() % 2
            }),
            {
                let calls = calls.clone();
                move |_: &i32, _: Option<&i32>, _: &OnCleanup| calls.set(calls.get() + 1)
            },
            WatchOptions::new().flush(FlushMode::Sync),
        );

        count.set(3);
        assert_eq!(calls.get(), 0);
        count.set(4);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn sync_callbacks_writing_their_source_see_the_latest_previous_value() {
        let runtime = Runtime::new();
        let count = runtime.signal(0);
        let calls = Rc::new(RefCell::new(Vec::new()));

        let _handle = runtime.watch(
            count.clone(),
            {
                let count = count.clone();
                let calls = calls.clone();
                move |new: &i32, old: Option<&i32>, _: &OnCleanup| {
                    calls.borrow_mut().push((*new, old.copied()));
                    if *new == 1 {
                        count.set(2);
                    }
                }
            },
            WatchOptions::new().flush(FlushMode::Sync),
        );

        count.set(1);
        count.set(3);

        assert_eq!(
            *calls.borrow(),
            vec![(1, Some(0)), (2, Some(1)), (3, Some(2))]
        );
    }

    #[test]
    fn deep_option_reaches_inside_a_returned_container() {
        let runtime = Runtime::new();
        let list = runtime.list(vec![1, 2]);
        let deep_calls = Rc::new(Cell::new(0));
        let shallow_calls = Rc::new(Cell::new(0));

        let watch_list = |options: WatchOptions, calls: Rc<Cell<u32>>| {
            runtime.watch(
                WatchSource::getter({
                    let list = list.clone();
                    move || list.clone()
                }),
                move |_: &List<i32>, _: Option<&List<i32>>, _: &OnCleanup| calls.set(calls.get() + 1),
                options.flush(FlushMode::Sync),
            )
        };
        let _deep = watch_list(WatchOptions::new().deep(), deep_calls.clone());
        let _shallow = watch_list(WatchOptions::new(), shallow_calls.clone());

        list.set(0, 5);
        assert_eq!(deep_calls.get(), 1);
        assert_eq!(shallow_calls.get(), 0);

        list.push(3);
        assert_eq!(deep_calls.get(), 2);
        assert_eq!(shallow_calls.get(), 0);
    }

    #[test]
    fn cleanup_runs_before_the_next_callback_and_on_stop() {
        let runtime = Runtime::new();
        let count = runtime.signal(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let handle = runtime.watch(
            count.clone(),
            {
                let log = log.clone();
                move |new: &i32, _: Option<&i32>, on_cleanup: &OnCleanup| {
                    log.borrow_mut().push(format!("run {new}"));
                    let log = log.clone();
                    let new = *new;
                    on_cleanup.register(move || log.borrow_mut().push(format!("cleanup {new}")));
                }
            },
            WatchOptions::new().flush(FlushMode::Sync),
        );

        count.set(1);
        count.set(2);
        handle.stop();
        handle.stop();
        count.set(3);

        assert_eq!(
            *log.borrow(),
            vec!["run 1", "cleanup 1", "run 2", "cleanup 2"]
        );
        assert!(!handle.is_active());
    }

    #[test]
    fn watch_effect_reruns_and_cleans_up() {
        let runtime = Runtime::new();
        let count = runtime.signal(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let handle = runtime.watch_effect(
            {
                let count = count.clone();
                let log = log.clone();
                move |on_cleanup: &OnCleanup| {
                    let value = count.get();
                    log.borrow_mut().push(format!("run {value}"));
                    let log = log.clone();
                    on_cleanup.register(move || log.borrow_mut().push(format!("cleanup {value}")));
                }
            },
            WatchOptions::default(),
        );
        assert_eq!(*log.borrow(), vec!["run 0"]);

        count.set(1);
        runtime.run_microtasks().unwrap();
        handle.stop();

        assert_eq!(*log.borrow(), vec!["run 0", "cleanup 0", "run 1", "cleanup 1"]);
    }

    #[test]
    fn post_watch_effect_defers_its_first_run() {
        let runtime = Runtime::new();
        let runs = Rc::new(Cell::new(0));

        let _handle = runtime.watch_effect(
            {
                let runs = runs.clone();
                move |_: &OnCleanup| runs.set(runs.get() + 1)
            },
            WatchOptions::new().flush(FlushMode::Post),
        );

        assert_eq!(runs.get(), 0);
        runtime.run_microtasks().unwrap();
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn misuse_is_reported_but_not_fatal() {
        let (runtime, errors) = recording_runtime();
        let runs = Rc::new(Cell::new(0));

        let handle = runtime.watch_effect(
            {
                let runs = runs.clone();
                move |_: &OnCleanup| runs.set(runs.get() + 1)
            },
            WatchOptions::new().immediate().deep(),
        );

        assert_eq!(runs.get(), 1);
        assert!(handle.is_active());
        assert_eq!(errors.borrow().len(), 2);
        assert!(errors.borrow()[0].contains("immediate"));
        assert!(errors.borrow()[1].contains("deep"));
    }

    #[test]
    fn foreign_sources_leave_an_inert_handle() {
        let (runtime, errors) = recording_runtime();
        let other = Runtime::new();

        let handle = runtime.watch(
            other.signal(1),
            |_: &i32, _: Option<&i32>, _: &OnCleanup| {},
            WatchOptions::new().immediate(),
        );

        assert!(!handle.is_active());
        assert!(handle.id().is_none());
        handle.stop();
        assert_eq!(errors.borrow().len(), 1);
    }

    #[test]
    fn getter_panics_are_reported() {
        let (runtime, errors) = recording_runtime();
        let count = runtime.signal(0);
        let calls = Rc::new(Cell::new(0));

        let _handle = runtime.watch(
            WatchSource::getter({
                let count = count.clone();
                move || {
                    let value = count.get();
                    assert!(value != 1, "getter rejected {value}");
                    value
                }
            }),
            {
                let calls = calls.clone();
                move |_: &i32, _: Option<&i32>, _: &OnCleanup| calls.set(calls.get() + 1)
            },
            WatchOptions::new().flush(FlushMode::Sync),
        );

        count.set(1);
        assert_eq!(calls.get(), 0);
        assert_eq!(errors.borrow().len(), 1);
        assert!(errors.borrow()[0].starts_with("watcher getter panicked"));

        count.set(2);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn memo_watched_from_its_own_derivation_skips_the_run() {
        let (runtime, errors) = recording_runtime();
        let this: Rc<OnceCell<Memo<i32>>> = Rc::default();
        let handles = Rc::new(RefCell::new(Vec::new()));

        let memo = runtime.memo({
            let runtime = runtime.downgrade();
            let this = this.clone();
            let handles = handles.clone();
            move || {
                if let (Some(runtime), Some(memo)) = (runtime.upgrade(), this.get()) {
                    let handle = runtime.watch(
                        memo.clone(),
                        |_: &i32, _: Option<&i32>, _: &OnCleanup| {},
                        WatchOptions::new().flush(FlushMode::Sync),
                    );
                    handles.borrow_mut().push(handle);
                }
                7
            }
        });
        let _ = this.set(memo.clone());

        assert_eq!(memo.get(), 7);
        assert_eq!(handles.borrow().len(), 1);
        assert!(errors.borrow().is_empty());
        handles.borrow().iter().for_each(WatchHandle::stop);
    }

    #[test]
    fn stop_cancels_a_queued_run() {
        let runtime = Runtime::new();
        let count = runtime.signal(0);
        let calls = Rc::new(Cell::new(0));

        let handle = runtime.watch(
            count.clone(),
            {
                let calls = calls.clone();
                move |_: &i32, _: Option<&i32>, _: &OnCleanup| calls.set(calls.get() + 1)
            },
            WatchOptions::default(),
        );

        count.set(1);
        assert_eq!(runtime.pending_jobs(), 1);
        handle.stop();
        assert_eq!(runtime.pending_jobs(), 0);

        runtime.run_microtasks().unwrap();
        assert_eq!(calls.get(), 0);
    }

    #[test]
    fn owned_pre_watchers_run_before_their_owner() {
        let runtime = Runtime::new();
        let count = runtime.signal(0);
        let log = Rc::new(RefCell::new(Vec::new()));

        let owner_job = Job::new({
            let log = log.clone();
            move || log.borrow_mut().push("owner")
        })
        .with_id(0);

        let _handle = runtime.watch(
            count.clone(),
            {
                let log = log.clone();
                move |_: &i32, _: Option<&i32>, _: &OnCleanup| log.borrow_mut().push("watcher")
            },
            WatchOptions::new().owner(SubscriberId::from(0)),
        );

        runtime.queue_job(&owner_job);
        count.set(1);
        runtime.run_microtasks().unwrap();

        assert_eq!(*log.borrow(), vec!["watcher", "owner"]);
    }
}
