//! Ripple Core
//!
//! This crate provides a fine-grained reactive engine. It implements:
//!
//! - Dependency tracking between reactive state and the computations that
//!   read it
//! - Reactive primitives (signals, memos, effects) and reactive containers
//!   (records, lists, maps, sets)
//! - A cooperative job scheduler that batches, deduplicates and orders work
//! - Watchers that compare old and new values and run callbacks
//!
//! Everything is single-threaded. State lives in a [`Runtime`]; several
//! runtimes may coexist without seeing each other.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Runtime, registry, effects and reactive values
//! - `scheduler`: Jobs, the main and deferred queues, and flush hosts
//! - `watch`: Watchers built on top of effects and jobs
//! - `config`: Runtime settings
//! - `error`: Error types and reporting
//!
//! # Example
//!
//! ```rust
//! use ripple_core::{EffectOptions, Runtime};
//! use std::cell::Cell;
//! use std::rc::Rc;
//!
//! let runtime = Runtime::new();
//!
//! // Create a signal
//! let count = runtime.signal(1);
//!
//! // Create a derived value
//! let doubled = runtime.memo({
//!     let count = count.clone();
//!     move || count.get() * 2
//! });
//!
//! // Create an effect
//! let seen = Rc::new(Cell::new(0));
//! let _effect = runtime.effect(
//!     {
//!         let doubled = doubled.clone();
//!         let seen = seen.clone();
//!         move || seen.set(doubled.get())
//!     },
//!     EffectOptions::default(),
//! );
//! assert_eq!(seen.get(), 2);
//!
//! // Update the signal; the effect re-runs synchronously
//! count.set(5);
//! assert_eq!(seen.get(), 10);
//! ```

pub mod config;
pub mod error;
pub mod reactive;
pub mod scheduler;
pub mod watch;

pub use config::RuntimeConfig;
pub use error::{EngineError, ErrorHandler, ErrorSource, Misuse, Result};
pub use reactive::{
    has_changed, traverse, DebugEvent, DebugHook, Effect, EffectOptions, Key, List, Map, MapKey, Memo,
    Operation, PauseTracking, Record, Runtime, RuntimeBuilder, Seen, Set, Signal, SubscriberId, TargetId,
    TrackOp, Traverse, TriggerOp,
};
pub use scheduler::{Host, Job, LocalQueue, Microtask, NextTick, TokioHost};
pub use watch::{FlushMode, Getter, OnCleanup, Source, WatchHandle, WatchOptions, WatchSource};
