//! Cooperative suspension.
//!
//! The engine has exactly one place where it waits: a flush is requested
//! during a synchronous turn and runs once that turn is over. A [`Host`]
//! decides what "once that turn is over" means.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;

use crate::error::Result;

/// A callback deferred to the end of the current turn.
pub type Microtask = Box<dyn FnOnce() -> Result<()>>;

/// Runs microtasks after the current synchronous turn.
pub trait Host {
    /// Defer `task`. Tasks run in the order they were queued.
    fn queue_microtask(&self, task: Microtask);

    /// Run everything queued so far, for hosts that own their queue.
    ///
    /// Returns how many tasks ran, or the first fatal error; tasks after the
    /// failing one stay queued.
    fn run_microtasks(&self) -> Result<usize> {
        Ok(0)
    }
}

/// A host whose queue is drained explicitly by
/// [`Runtime::run_microtasks`](crate::Runtime::run_microtasks).
///
/// This is the default host. It suits tests, synchronous embedders and
/// event loops that already have a natural "end of turn".
#[derive(Default)]
pub struct LocalQueue {
    tasks: RefCell<VecDeque<Microtask>>,
}

impl LocalQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.borrow().is_empty()
    }
}

impl Host for LocalQueue {
    fn queue_microtask(&self, task: Microtask) {
        self.tasks.borrow_mut().push_back(task);
    }

    fn run_microtasks(&self) -> Result<usize> {
        let mut ran = 0;
        loop {
            let Some(task) = self.tasks.borrow_mut().pop_front() else {
                return Ok(ran);
            };
            ran += 1;
            task()?;
        }
    }
}

impl fmt::Debug for LocalQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalQueue").field("len", &self.len()).finish()
    }
}

/// A host that spawns each microtask on the current tokio `LocalSet`.
///
/// Tasks run once the spawning task yields. Fatal flush errors have no
/// caller to return to and are logged instead.
///
/// # Panics
///
/// Queueing panics when called outside of a `LocalSet`, like
/// [`tokio::task::spawn_local`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioHost;

impl Host for TokioHost {
    fn queue_microtask(&self, task: Microtask) {
        tokio::task::spawn_local(async move {
            if let Err(error) = task() {
                tracing::error!(%error, "deferred flush aborted");
            }
        });
    }
}
