//! Scheduler jobs.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for job serial numbers.
///
/// Process-wide rather than per runtime: a job is created without a runtime
/// and may be queued on any of them, so its serial must be unique across
/// all of them. The serial only identifies a job (deferred-queue dedup, the
/// recursion guard); it carries no reactive state.
static JOB_SERIAL: AtomicU64 = AtomicU64::new(0);

/// Ordering key of a job in the main queue: ascending id, `pre` jobs first
/// among equal ids, jobs without an id last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct JobKey(u64, u8);

/// A unit of work the scheduler can queue.
///
/// Jobs are identified by reference: clones are the same job, and queueing
/// a job that is already waiting is a no-op. Set the id and flags before
/// queueing; they are read when the job is inserted.
///
/// ```rust
/// use ripple_core::{Job, Runtime};
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let runtime = Runtime::new();
/// let order = Rc::new(RefCell::new(Vec::new()));
///
/// for id in [3, 1, 2] {
///     let order = order.clone();
///     runtime.queue_job(&Job::new(move || order.borrow_mut().push(id)).with_id(id));
/// }
///
/// runtime.run_microtasks().unwrap();
/// assert_eq!(*order.borrow(), vec![1, 2, 3]);
/// ```
#[derive(Clone)]
pub struct Job {
    inner: Rc<JobInner>,
}

struct JobInner {
    serial: u64,
    id: Cell<Option<u64>>,
    pre: Cell<bool>,
    allow_recurse: Cell<bool>,
    active: Cell<bool>,
    run: Box<dyn Fn()>,
}

impl Job {
    pub fn new(run: impl Fn() + 'static) -> Self {
        Self {
            inner: Rc::new(JobInner {
                serial: JOB_SERIAL.fetch_add(1, Ordering::Relaxed),
                id: Cell::new(None),
                pre: Cell::new(false),
                allow_recurse: Cell::new(false),
                active: Cell::new(true),
                run: Box::new(run),
            }),
        }
    }

    /// Order the job by `id` within the main queue.
    pub fn with_id(self, id: u64) -> Self {
        self.inner.id.set(Some(id));
        self
    }

    /// Run before ordinary jobs with the same id.
    pub fn pre(self, pre: bool) -> Self {
        self.inner.pre.set(pre);
        self
    }

    /// Allow the job to be queued again while it is running.
    pub fn allow_recurse(self, allow: bool) -> Self {
        self.set_allow_recurse(allow);
        self
    }

    pub fn id(&self) -> Option<u64> {
        self.inner.id.get()
    }

    /// Process-unique number, used in diagnostics.
    pub fn serial(&self) -> u64 {
        self.inner.serial
    }

    pub fn is_pre(&self) -> bool {
        self.inner.pre.get()
    }

    pub fn allows_recurse(&self) -> bool {
        self.inner.allow_recurse.get()
    }

    pub fn set_allow_recurse(&self, allow: bool) {
        self.inner.allow_recurse.set(allow);
    }

    /// Inactive jobs stay queued but are skipped by every flush.
    pub fn is_active(&self) -> bool {
        self.inner.active.get()
    }

    pub fn deactivate(&self) {
        self.inner.active.set(false);
    }

    /// Run the job right now, outside of any queue.
    pub fn run(&self) {
        (self.inner.run)();
    }

    pub(crate) fn key(&self) -> JobKey {
        JobKey(self.id().unwrap_or(u64::MAX), if self.is_pre() { 0 } else { 1 })
    }

    /// Sort key of the deferred queue, where `pre` carries no meaning.
    pub(crate) fn post_order(&self) -> u64 {
        self.id().unwrap_or(u64::MAX)
    }
}

impl PartialEq for Job {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Job {}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("serial", &self.serial())
            .field("id", &self.id())
            .field("pre", &self.is_pre())
            .field("active", &self.is_active())
            .finish()
    }
}
