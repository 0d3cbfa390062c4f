//! Dependency Registry
//!
//! The registry maps a reactive target and one of its keys to the bucket of
//! computations that read that key during their last run.
//!
//! # Ownership
//!
//! ```text
//! Registry ──owns──> Bucket ──owns──> Subscriber (effect)
//!                      ^                  │
//!                      └──────weak────────┘  (back-reference list)
//! ```
//!
//! The registry never owns a target. Targets are identified by a
//! [`TargetId`]; when the last handle of a container is dropped its
//! [`TargetHandle`] removes the target's buckets, which in turn releases
//! computations nobody else holds.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::Serialize;

use super::runtime::{Runtime, WeakRuntime};
use super::subscriber::{Subscriber, SubscriberId};

/// Identity of a reactive target within one runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct TargetId(u64);

impl TargetId {
    pub(crate) fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the raw id value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "target#{}", self.0)
    }
}

/// A key of a reactive target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub enum Key {
    /// Named property or string map key.
    Str(Rc<str>),
    /// Signed integer map key.
    Int(i64),
    /// Unsigned integer map key.
    Uint(u64),
    /// Boolean map key.
    Bool(bool),
    /// Position in an ordered sequence.
    Index(usize),
    /// Length of an ordered sequence.
    Length,
    /// The single value of a signal or memo.
    Value,
    /// Structural reads: iteration over entries or values.
    Iterate,
    /// Iteration over the keys of a map only.
    KeyIterate,
}

impl From<&str> for Key {
    fn from(key: &str) -> Self {
        Key::Str(Rc::from(key))
    }
}

impl From<String> for Key {
    fn from(key: String) -> Self {
        Key::Str(Rc::from(key))
    }
}

impl From<usize> for Key {
    fn from(index: usize) -> Self {
        Key::Index(index)
    }
}

/// Kind of read reported to `track`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TrackOp {
    Get,
    Has,
    Iterate,
}

/// Kind of write reported to `trigger`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TriggerOp {
    Set,
    Add,
    Delete,
    Clear,
}

/// Either side of a dependency event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "op")]
pub enum Operation {
    Track(TrackOp),
    Trigger(TriggerOp),
}

/// Descriptor handed to the `on_track` / `on_trigger` debug hooks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugEvent {
    pub effect: SubscriberId,
    pub target: TargetId,
    pub key: Key,
    pub op: Operation,
}

/// The set of computations subscribed to one (target, key) pair.
///
/// Members are kept in subscription order so notification order is stable.
pub(crate) struct Bucket {
    key: Key,
    members: RefCell<IndexMap<SubscriberId, Rc<dyn Subscriber>>>,
}

impl Bucket {
    fn new(key: Key) -> Self {
        Self {
            key,
            members: RefCell::new(IndexMap::new()),
        }
    }

    /// Returns `false` if the subscriber was already a member.
    pub(crate) fn insert(&self, subscriber: Rc<dyn Subscriber>) -> bool {
        let id = subscriber.subscriber_id();
        let mut members = self.members.borrow_mut();
        if members.contains_key(&id) {
            return false;
        }
        members.insert(id, subscriber);
        true
    }

    /// Remove a member and hand it back.
    ///
    /// The caller must drop the returned handle only after every other
    /// borrow has been released: it may be the last owner of a computation.
    pub(crate) fn remove(&self, id: SubscriberId) -> Option<Rc<dyn Subscriber>> {
        self.members.borrow_mut().shift_remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.members.borrow().len()
    }
}

/// A snapshot of subscribers gathered for one trigger, with the key each was
/// found under.
pub(crate) type Snapshot = IndexMap<SubscriberId, (Rc<dyn Subscriber>, Key)>;

#[derive(Default)]
pub(crate) struct Registry {
    targets: HashMap<TargetId, IndexMap<Key, Rc<Bucket>>>,
}

impl Registry {
    /// Get the bucket for (target, key), creating it if needed.
    pub(crate) fn bucket(&mut self, target: TargetId, key: Key) -> Rc<Bucket> {
        self.targets
            .entry(target)
            .or_default()
            .entry(key.clone())
            .or_insert_with(|| Rc::new(Bucket::new(key)))
            .clone()
    }

    pub(crate) fn get(&self, target: TargetId, key: &Key) -> Option<Rc<Bucket>> {
        self.targets.get(&target)?.get(key).cloned()
    }

    /// Union the members of the buckets a write touches.
    ///
    /// `Clear` touches every bucket of the target; any other op touches the
    /// listed keys. A subscriber found in several buckets appears once.
    pub(crate) fn collect(&self, target: TargetId, op: TriggerOp, keys: &[Key]) -> Snapshot {
        let mut snapshot = Snapshot::new();
        let Some(buckets) = self.targets.get(&target) else {
            return snapshot;
        };

        let mut add = |bucket: &Rc<Bucket>| {
            for (id, subscriber) in bucket.members.borrow().iter() {
                snapshot
                    .entry(*id)
                    .or_insert_with(|| (subscriber.clone(), bucket.key.clone()));
            }
        };

        if op == TriggerOp::Clear {
            buckets.values().for_each(&mut add);
        } else {
            keys.iter()
                .filter_map(|key| buckets.get(key))
                .for_each(&mut add);
        }

        snapshot
    }

    /// Detach every bucket of a target. The caller drops the result after
    /// releasing the registry borrow.
    pub(crate) fn forget(&mut self, target: TargetId) -> Option<IndexMap<Key, Rc<Bucket>>> {
        self.targets.remove(&target)
    }

    pub(crate) fn subscriber_count(&self, target: TargetId, key: &Key) -> usize {
        self.get(target, key).map_or(0, |bucket| bucket.len())
    }

    pub(crate) fn target_count(&self) -> usize {
        self.targets.len()
    }
}

/// Identity of one reactive container, with a finalizer that removes the
/// container's buckets when the container goes away.
pub(crate) struct TargetHandle {
    id: TargetId,
    runtime: WeakRuntime,
}

impl TargetHandle {
    pub(crate) fn new(runtime: &Runtime) -> Self {
        Self {
            id: runtime.next_target_id(),
            runtime: runtime.downgrade(),
        }
    }

    pub(crate) fn id(&self) -> TargetId {
        self.id
    }

    pub(crate) fn track(&self, op: TrackOp, key: Key) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.track(self.id, op, key);
        }
    }

    pub(crate) fn trigger(&self, op: TriggerOp, keys: &[Key]) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.trigger_op(self.id, op, keys);
        }
    }

    pub(crate) fn belongs_to(&self, runtime: &Runtime) -> bool {
        self.runtime.ptr_eq(runtime)
    }
}

impl Drop for TargetHandle {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.forget_target(self.id);
        }
    }
}

impl fmt::Debug for TargetHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.id, f)
    }
}
