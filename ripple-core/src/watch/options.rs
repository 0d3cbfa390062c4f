use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::reactive::{DebugEvent, DebugHook, SubscriberId};

/// When a watcher's job runs relative to a flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlushMode {
    /// On the main queue, ahead of ordinary jobs with the same id.
    #[default]
    Pre,
    /// On the deferred queue, after the main queue has drained.
    Post,
    /// Inline, inside the write that triggered it.
    Sync,
}

/// Options accepted by [`Runtime::watch`](crate::Runtime::watch) and
/// [`Runtime::watch_effect`](crate::Runtime::watch_effect).
#[derive(Clone, Default)]
pub struct WatchOptions {
    /// Run the callback once during setup, with no previous value.
    pub immediate: bool,

    /// Subscribe to everything reachable from the watched value.
    pub deep: bool,

    /// Flush timing; the runtime's `default_flush` when unset.
    pub flush: Option<FlushMode>,

    /// Order the watcher's job with this id instead of its own, so a `pre`
    /// watcher runs right before the owner's ordinary job.
    pub owner: Option<SubscriberId>,

    pub on_track: Option<DebugHook>,
    pub on_trigger: Option<DebugHook>,
}

impl WatchOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn immediate(mut self) -> Self {
        self.immediate = true;
        self
    }

    pub fn deep(mut self) -> Self {
        self.deep = true;
        self
    }

    pub fn flush(mut self, flush: FlushMode) -> Self {
        self.flush = Some(flush);
        self
    }

    pub fn owner(mut self, owner: SubscriberId) -> Self {
        self.owner = Some(owner);
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
}

impl fmt::Debug for WatchOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WatchOptions")
            .field("immediate", &self.immediate)
            .field("deep", &self.deep)
            .field("flush", &self.flush)
            .field("owner", &self.owner)
            .finish()
    }
}
