//! Reactive Primitives
//!
//! This module implements dependency tracking: the registry of who reads
//! what, the computations that re-run when what they read changes, and the
//! containers whose accessors report reads and writes.
//!
//! # Concepts
//!
//! ## Targets and keys
//!
//! Every reactive container is a *target* with a [`TargetId`]. Reads and
//! writes name a [`Key`] of that target: a field, an index, the length, or a
//! synthetic key standing for "the set of keys" (`Iterate`, `KeyIterate`).
//!
//! ## Effects
//!
//! An [`Effect`] is a computation. While it runs it sits on the runtime's
//! active stack, and every tracked read subscribes it to the (target, key)
//! bucket. When the key is written, the effect is scheduled or re-run.
//!
//! ## Signals and memos
//!
//! A [`Signal`] is a single reactive value. A [`Memo`] is a cached value
//! derived from other reactive state, recomputed on demand.
//!
//! ## Containers
//!
//! [`Record`], [`List`], [`Map`] and [`Set`] are reactive versions of an
//! object, an ordered sequence, a keyed map and a set.
//!
//! # Implementation Notes
//!
//! Nothing here is global. All state lives in a [`Runtime`], and every
//! container and computation keeps a weak handle to the runtime that created
//! it. Several runtimes may coexist in one thread.

mod collections;
mod compare;
mod context;
mod effect;
mod memo;
mod registry;
mod runtime;
mod signal;
mod subscriber;
mod traverse;

pub use collections::{List, Map, MapKey, Record, Set};
pub use compare::has_changed;
pub use context::PauseTracking;
pub use effect::{DebugHook, Effect, EffectOptions};
pub use memo::Memo;
pub use registry::{DebugEvent, Key, Operation, TargetId, TrackOp, TriggerOp};
pub use runtime::{Runtime, RuntimeBuilder};
pub use signal::Signal;
pub use subscriber::SubscriberId;
pub use traverse::{traverse, Seen, Traverse};

pub(crate) use effect::WeakEffect;
pub(crate) use runtime::WeakRuntime;
