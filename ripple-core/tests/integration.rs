//! Integration Tests for the Reactive Runtime
//!
//! These tests verify that reactive state, the scheduler and watchers work
//! together correctly through the public API only.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use futures_util::FutureExt;
use ripple_core::{
    EffectOptions, EngineError, FlushMode, Job, List, OnCleanup, Record, Runtime, RuntimeConfig,
    TokioHost, WatchOptions, WatchSource,
};

fn log() -> Rc<RefCell<Vec<String>>> {
    Rc::new(RefCell::new(Vec::new()))
}

fn recording_runtime(config: RuntimeConfig) -> (Runtime, Rc<RefCell<Vec<String>>>) {
    let errors = log();
    let runtime = Runtime::builder()
        .config(config)
        .error_handler({
            let errors = errors.clone();
            move |error: &EngineError| errors.borrow_mut().push(error.to_string())
        })
        .build();
    (runtime, errors)
}

/// Several writes in one turn produce one callback with the latest value.
#[test]
fn writes_in_one_turn_are_batched() {
    let runtime = Runtime::new();
    let count = runtime.signal(0);
    let calls = Rc::new(RefCell::new(Vec::new()));

    let _watcher = runtime.watch(
        count.clone(),
        {
            let calls = calls.clone();
            move |new: &i32, old: Option<&i32>, _: &OnCleanup| calls.borrow_mut().push((*new, old.copied()))
        },
        WatchOptions::default(),
    );

    for n in 1..=5 {
        count.set(n);
    }
    assert!(runtime.is_flush_pending());
    assert!(calls.borrow().is_empty());

    runtime.run_microtasks().unwrap();
    assert_eq!(*calls.borrow(), vec![(5, Some(0))]);
    assert!(!runtime.is_flush_pending());
}

/// Writing back the value a watcher last saw does not call it.
#[test]
fn reverting_within_a_turn_is_not_a_change() {
    let runtime = Runtime::new();
    let count = runtime.signal(1);
    let calls = Rc::new(Cell::new(0));

    let _watcher = runtime.watch(
        count.clone(),
        {
            let calls = calls.clone();
            move |_: &i32, _: Option<&i32>, _: &OnCleanup| calls.set(calls.get() + 1)
        },
        WatchOptions::default(),
    );

    count.set(2);
    count.set(1);
    runtime.run_microtasks().unwrap();
    assert_eq!(calls.get(), 0);
}

/// NaN never counts as a change against NaN.
#[test]
fn nan_writes_are_not_changes() {
    let runtime = Runtime::new();
    let value = runtime.signal(f64::NAN);
    let runs = Rc::new(Cell::new(0));

    let _effect = runtime.effect(
        {
            let value = value.clone();
            let runs = runs.clone();
            move || {
                value.get();
                runs.set(runs.get() + 1);
            }
        },
        EffectOptions::default(),
    );

    assert!(!value.set(f64::NAN));
    assert!(value.set(0.0));
    assert!(!value.set(-0.0));
    assert_eq!(runs.get(), 2);
}

/// A deep watcher sees writes to nested containers.
#[test]
fn deep_watch_sees_nested_writes() {
    let runtime = Runtime::new();
    let todos: List<i32> = runtime.list(vec![1]);
    let state: Record<List<i32>> = Record::from_entries(&runtime, [("todos", todos.clone())]);
    let calls = Rc::new(Cell::new(0));

    let _watcher = runtime.watch(
        state.clone(),
        {
            let calls = calls.clone();
            move |_: &Record<List<i32>>, old: Option<&Record<List<i32>>>, _: &OnCleanup| {
                assert!(old.is_some());
                calls.set(calls.get() + 1);
            }
        },
        WatchOptions::new().flush(FlushMode::Sync),
    );

    todos.push(2);
    assert_eq!(calls.get(), 1);
    todos.set(0, 10);
    assert_eq!(calls.get(), 2);
    todos.set(0, 10);
    assert_eq!(calls.get(), 2);
}

/// A getter only reacts to the keys it reads.
#[test]
fn getter_watch_follows_one_field() {
    let runtime = Runtime::new();
    let user: Record<String> = runtime.record();
    user.set("name", "ada".to_string());
    let names = log();

    let _watcher = runtime.watch(
        WatchSource::getter({
            let user = user.clone();
            move || user.get("name")
        }),
        {
            let names = names.clone();
            move |new: &Option<String>, _: Option<&Option<String>>, _: &OnCleanup| {
                names.borrow_mut().push(new.clone().unwrap_or_default())
            }
        },
        WatchOptions::new().flush(FlushMode::Sync),
    );

    user.set("role", "admin".to_string());
    user.set("name", "grace".to_string());
    user.remove("name");

    assert_eq!(*names.borrow(), vec!["grace".to_string(), String::new()]);
}

/// Several sources are compared position by position.
#[test]
fn multi_source_watch() {
    let runtime = Runtime::new();
    let first = runtime.signal(1);
    let second = runtime.signal(2);
    let calls = Rc::new(RefCell::new(Vec::new()));

    let _watcher = runtime.watch(
        vec![WatchSource::from(first.clone()), WatchSource::from(second.clone())],
        {
            let calls = calls.clone();
            move |new: &Vec<i32>, old: Option<&Vec<i32>>, _: &OnCleanup| {
                calls.borrow_mut().push((new.clone(), old.cloned()))
            }
        },
        WatchOptions::new().flush(FlushMode::Sync),
    );

    second.set(3);
    first.set(1);
    assert_eq!(*calls.borrow(), vec![(vec![1, 3], Some(vec![1, 2]))]);
}

/// Pre watchers run before ordinary jobs; post watchers after the main queue.
#[test]
fn flush_modes_order_a_flush() {
    let runtime = Runtime::new();
    let count = runtime.signal(0);
    let order = log();

    let _post = runtime.watch(
        count.clone(),
        {
            let order = order.clone();
            move |_: &i32, _: Option<&i32>, _: &OnCleanup| order.borrow_mut().push("post".into())
        },
        WatchOptions::new().flush(FlushMode::Post),
    );
    let _pre = runtime.watch(
        count.clone(),
        {
            let order = order.clone();
            move |_: &i32, _: Option<&i32>, _: &OnCleanup| order.borrow_mut().push("pre".into())
        },
        WatchOptions::default(),
    );
    let _sync = runtime.watch(
        count.clone(),
        {
            let order = order.clone();
            move |_: &i32, _: Option<&i32>, _: &OnCleanup| order.borrow_mut().push("sync".into())
        },
        WatchOptions::new().flush(FlushMode::Sync),
    );
    let job = Job::new({
        let order = order.clone();
        move || order.borrow_mut().push("job".into())
    });

    count.set(1);
    runtime.queue_job(&job);
    assert_eq!(*order.borrow(), vec!["sync"]);

    runtime.run_microtasks().unwrap();
    assert_eq!(*order.borrow(), vec!["sync", "pre", "job", "post"]);
}

/// A watcher feeding its own source is cut off by the recursion guard.
#[test]
fn runaway_watchers_are_stopped() {
    let config = RuntimeConfig {
        check_recursive_updates: true,
        max_recursive_updates: 10,
        ..RuntimeConfig::default()
    };
    let (runtime, errors) = recording_runtime(config);
    let count = runtime.signal(0);
    let calls = Rc::new(Cell::new(0));

    let _watcher = runtime.watch(
        count.clone(),
        {
            let count = count.clone();
            let calls = calls.clone();
            move |new: &i32, _: Option<&i32>, _: &OnCleanup| {
                calls.set(calls.get() + 1);
                count.set(new + 1);
            }
        },
        WatchOptions::default(),
    );

    count.set(1);
    runtime.run_microtasks().unwrap();

    assert_eq!(calls.get(), 10);
    assert_eq!(count.get(), 11);
    assert_eq!(errors.borrow().len(), 1);
    assert!(errors.borrow()[0].starts_with("maximum recursive updates (10)"));
}

/// One panicking watcher does not keep the others from running.
#[test]
fn panicking_callbacks_are_isolated() {
    let (runtime, errors) = recording_runtime(RuntimeConfig::default());
    let count = runtime.signal(0);
    let seen = Rc::new(Cell::new(0));

    let _broken = runtime.watch(
        count.clone(),
        |_: &i32, _: Option<&i32>, _: &OnCleanup| panic!("callback exploded"),
        WatchOptions::default(),
    );
    let _healthy = runtime.watch(
        count.clone(),
        {
            let seen = seen.clone();
            move |new: &i32, _: Option<&i32>, _: &OnCleanup| seen.set(*new)
        },
        WatchOptions::default(),
    );

    count.set(7);
    runtime.run_microtasks().unwrap();

    assert_eq!(seen.get(), 7);
    assert_eq!(*errors.borrow(), vec!["watcher callback panicked: callback exploded".to_string()]);
}

/// Runtimes never see each other's reads or writes.
#[test]
fn runtimes_are_isolated() {
    let (first, errors) = recording_runtime(RuntimeConfig::default());
    let second = Runtime::new();
    let local = first.signal(0);
    let foreign = second.signal(0);
    let runs = Rc::new(Cell::new(0));

    let _effect = first.effect(
        {
            let local = local.clone();
            let foreign = foreign.clone();
            let runs = runs.clone();
            move || {
                local.get();
                foreign.get();
                runs.set(runs.get() + 1);
            }
        },
        EffectOptions::default(),
    );

    foreign.set(1);
    assert_eq!(runs.get(), 1);
    local.set(1);
    assert_eq!(runs.get(), 2);

    let watcher = first.watch(
        foreign,
        |_: &i32, _: Option<&i32>, _: &OnCleanup| {},
        WatchOptions::default(),
    );
    assert!(!watcher.is_active());
    assert_eq!(errors.borrow().len(), 1);
    assert_eq!(second.tracked_targets(), 0);
}

/// Dropping the last handle of a container frees its dependency buckets.
#[test]
fn dropped_targets_release_their_buckets() {
    let runtime = Runtime::new();
    let items = runtime.list(vec![1, 2, 3]);

    let effect = runtime.effect(
        {
            let items = items.clone();
            move || items.len()
        },
        EffectOptions::default(),
    );
    assert_eq!(runtime.tracked_targets(), 1);

    effect.stop();
    drop(effect);
    drop(items);
    assert_eq!(runtime.tracked_targets(), 0);
}

/// `next_tick` resolves once the pending flush is done.
#[test]
fn next_tick_waits_for_the_flush() {
    let runtime = Runtime::new();
    assert!(runtime.next_tick().now_or_never().is_some());

    let count = runtime.signal(0);
    let seen = Rc::new(Cell::new(0));
    let _watcher = runtime.watch(
        count.clone(),
        {
            let seen = seen.clone();
            move |new: &i32, _: Option<&i32>, _: &OnCleanup| seen.set(*new)
        },
        WatchOptions::default(),
    );

    count.set(3);
    let mut tick = runtime.next_tick();
    assert!((&mut tick).now_or_never().is_none());

    let flushed = Rc::new(Cell::new(false));
    runtime.on_next_flush({
        let flushed = flushed.clone();
        move || flushed.set(true)
    });

    runtime.run_microtasks().unwrap();
    assert!(tick.now_or_never().is_some());
    assert!(flushed.get());
    assert_eq!(seen.get(), 3);
}

/// With the tokio host, awaiting `next_tick` lets the flush run.
#[tokio::test(flavor = "current_thread")]
async fn tokio_host_flushes_on_the_local_set() {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async {
            let runtime = Runtime::builder().host(TokioHost).build();
            let count = runtime.signal(0);
            let seen = Rc::new(Cell::new(0));

            let _watcher = runtime.watch(
                count.clone(),
                {
                    let seen = seen.clone();
                    move |new: &i32, _: Option<&i32>, _: &OnCleanup| seen.set(*new)
                },
                WatchOptions::default(),
            );

            count.set(42);
            assert_eq!(seen.get(), 0);

            runtime.next_tick().await;
            assert_eq!(seen.get(), 42);
        })
        .await;
}

/// Configuration can come from JSON and changes the default flush timing.
#[test]
fn json_config_sets_default_flush() {
    let config = RuntimeConfig::from_json(r#"{ "default_flush": "sync" }"#).unwrap();
    let runtime = Runtime::builder().config(config).build();
    let count = runtime.signal(0);
    let seen = Rc::new(Cell::new(0));

    let _watcher = runtime.watch(
        count.clone(),
        {
            let seen = seen.clone();
            move |new: &i32, _: Option<&i32>, _: &OnCleanup| seen.set(*new)
        },
        WatchOptions::default(),
    );

    count.set(9);
    assert_eq!(seen.get(), 9);
}
