//! Error Types
//!
//! Everything that can go wrong inside a runtime is described by
//! [`EngineError`]. Errors fall into three groups:
//!
//! - User code failures (a panicking effect body, watch callback or cleanup).
//!   These are caught per invocation and reported through the runtime's
//!   [`ErrorHandler`]; sibling jobs keep running.
//! - Misuse (for example `immediate` on a watcher without a callback). These
//!   are reported as warnings and execution continues in a degraded mode.
//! - Scheduler bookkeeping failures. These are fatal: the flush aborts and the
//!   error is returned to the host.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Callback receiving every error and warning a runtime reports.
pub type ErrorHandler = Rc<dyn Fn(&EngineError)>;

/// Where a caught failure originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorSource {
    /// A job executed by the scheduler.
    Scheduler,
    /// The getter of a watcher.
    WatchGetter,
    /// A watch callback or a `watch_effect` accessor.
    WatchCallback,
    /// A cleanup function registered through `OnCleanup`.
    WatchCleanup,
    /// A callback registered with `on_next_flush`.
    FlushCallback,
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorSource::Scheduler => "scheduler job",
            ErrorSource::WatchGetter => "watcher getter",
            ErrorSource::WatchCallback => "watcher callback",
            ErrorSource::WatchCleanup => "watcher cleanup function",
            ErrorSource::FlushCallback => "flush callback",
        };
        f.write_str(label)
    }
}

/// API misuse that degrades behaviour instead of failing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Misuse {
    #[error("`immediate` is only respected by `watch` with a callback")]
    ImmediateWithoutCallback,

    #[error("`deep` is only respected by `watch` with a callback")]
    DeepWithoutCallback,

    #[error("watch source belongs to a different runtime and cannot be tracked")]
    ForeignSource,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{origin} panicked: {message}")]
    Panicked { origin: ErrorSource, message: String },

    #[error("invalid usage: {0}")]
    Misuse(#[from] Misuse),

    #[error("maximum recursive updates ({limit}) exceeded by job #{job}")]
    RecursionLimit { job: u64, limit: u32 },

    #[error("scheduler state corrupted: {0}")]
    SchedulerCorrupted(&'static str),

    #[error("invalid runtime configuration: {0}")]
    Config(#[from] serde_json::Error),
}

impl EngineError {
    /// Build an error from a panic payload caught by `catch_unwind`.
    pub(crate) fn from_panic(origin: ErrorSource, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };

        EngineError::Panicked { origin, message }
    }

    /// Warnings do not indicate lost work.
    pub fn is_warning(&self) -> bool {
        matches!(self, EngineError::Misuse(_))
    }

    /// Fatal errors abort the flush that produced them.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::SchedulerCorrupted(_))
    }
}

/// The handler installed when none is configured: logs through `tracing`.
pub fn default_error_handler() -> ErrorHandler {
    Rc::new(|error: &EngineError| {
        if error.is_warning() {
            tracing::warn!(%error, "reactive runtime warning");
        } else {
            tracing::error!(%error, "reactive runtime error");
        }
    })
}

/// Run user code, turning a panic into an [`EngineError::Panicked`].
pub(crate) fn call_with_error_handling<R>(origin: ErrorSource, f: impl FnOnce() -> R) -> Result<R> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| EngineError::from_panic(origin, payload))
}
