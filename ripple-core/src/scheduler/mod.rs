//! Job Scheduler
//!
//! The scheduler decides *when* invalidated computations re-run. Triggers
//! queue jobs; the queued jobs run together in one flush once the current
//! synchronous turn is over.
//!
//! # Queues
//!
//! - The main queue is ordered by job id (`pre` jobs first among equal ids,
//!   jobs without an id last). A cursor marks the running job; cancelled
//!   jobs leave tombstones so positions never shift under the cursor.
//!
//! - The deferred ("post") queue collects jobs that must run after the main
//!   queue has drained. At the start of a deferred pass it is deduplicated,
//!   sorted by id and moved into an active list.
//!
//! # Flush Algorithm
//!
//! 1. Sort the main queue; run each live job in order. Jobs queued meanwhile
//!    are inserted behind the cursor at their ordered position.
//! 2. Run the deferred pass.
//! 3. If either pass queued anything, repeat from 1.
//! 4. Clear the flags, resolve [`NextTick`] futures and run
//!    `on_next_flush` callbacks.
//!
//! A panicking job is reported and the flush goes on. A failure of the queue
//! bookkeeping itself aborts the flush and is returned to the host.

mod host;
mod job;
mod tick;

pub use host::{Host, LocalQueue, Microtask, TokioHost};
pub use job::Job;
pub use tick::NextTick;

use std::cell::{RefCell, RefMut};
use std::collections::HashMap;
use std::fmt;

use indexmap::IndexMap;
use tokio::sync::oneshot;

use crate::error::{call_with_error_handling, EngineError, ErrorSource, Result};
use crate::reactive::Runtime;
use job::JobKey;

/// Per-runtime scheduler state.
#[derive(Default)]
pub(crate) struct Scheduler {
    state: RefCell<QueueState>,
}

struct Slot {
    key: JobKey,
    /// `None` once the job was invalidated or already run by
    /// `flush_pre_jobs`.
    job: Option<Job>,
}

#[derive(Default)]
struct QueueState {
    queue: Vec<Slot>,
    cursor: usize,
    pending_post: Vec<Job>,
    active_post: Option<Vec<Job>>,
    post_cursor: usize,
    flush_pending: bool,
    flushing: bool,
    waiters: Vec<oneshot::Sender<()>>,
    callbacks: Vec<Box<dyn FnOnce()>>,
}

impl QueueState {
    /// First main-queue index a new or cancelled job may occupy.
    fn open_from(&self) -> usize {
        if self.flushing {
            self.cursor + 1
        } else {
            0
        }
    }

    fn is_queued(&self, job: &Job) -> bool {
        let from = if self.flushing && job.allows_recurse() {
            self.cursor + 1
        } else {
            self.cursor
        };

        self.queue
            .get(from..)
            .is_some_and(|slots| slots.iter().any(|slot| slot.job.as_ref() == Some(job)))
    }

    fn is_post_queued(&self, job: &Job) -> bool {
        let Some(active) = &self.active_post else {
            return false;
        };
        let from = if job.allows_recurse() {
            self.post_cursor + 1
        } else {
            self.post_cursor
        };

        active.get(from..).is_some_and(|jobs| jobs.contains(job))
    }

    fn live_jobs(&self) -> usize {
        let ahead = self.queue.get(self.cursor..).map_or(0, |slots| {
            slots.iter().filter(|slot| slot.job.is_some()).count()
        });
        ahead + self.pending_post.len()
    }
}

/// Repeated executions of each job within one flush, by serial.
type Seen = HashMap<u64, u32>;

impl Runtime {
    fn queue_state(&self) -> Result<RefMut<'_, QueueState>> {
        self.inner
            .scheduler
            .state
            .try_borrow_mut()
            .map_err(|_| EngineError::SchedulerCorrupted("queue state is already borrowed"))
    }

    /// Like [`Runtime::queue_state`] for callers that cannot return an
    /// error: the failure goes to the error handler instead.
    fn queue_state_or_report(&self) -> Option<RefMut<'_, QueueState>> {
        match self.queue_state() {
            Ok(state) => Some(state),
            Err(error) => {
                self.report(&error);
                None
            }
        }
    }

    /// Queue `job` on the main queue and request a flush.
    ///
    /// A job that is already waiting is not queued twice. While the job is
    /// running it may queue itself again only if it allows recursion.
    pub fn queue_job(&self, job: &Job) {
        {
            let Some(mut state) = self.queue_state_or_report() else {
                return;
            };
            if state.is_queued(job) {
                return;
            }

            let key = job.key();
            let from = state.open_from().min(state.queue.len());
            let index = from + state.queue[from..].partition_point(|slot| slot.key <= key);
            state.queue.insert(
                index,
                Slot {
                    key,
                    job: Some(job.clone()),
                },
            );
        }

        self.request_flush();
    }

    /// Queue `job` to run after the main queue has drained.
    pub fn queue_post_job(&self, job: &Job) {
        {
            let Some(mut state) = self.queue_state_or_report() else {
                return;
            };
            if state.is_post_queued(job) {
                return;
            }
            state.pending_post.push(job.clone());
        }

        self.request_flush();
    }

    /// Queue several deferred jobs at once, without the duplicate check.
    pub fn queue_post_jobs(&self, jobs: impl IntoIterator<Item = Job>) {
        {
            let Some(mut state) = self.queue_state_or_report() else {
                return;
            };
            state.pending_post.extend(jobs);
        }

        self.request_flush();
    }

    /// Cancel `job` if it is queued but has not started.
    pub fn invalidate_job(&self, job: &Job) {
        let Some(mut state) = self.queue_state_or_report() else {
            return;
        };

        let from = state.open_from();
        let position = state
            .queue
            .iter()
            .skip(from)
            .position(|slot| slot.job.as_ref() == Some(job));
        if let Some(offset) = position {
            state.queue[from + offset].job = None;
        }
    }

    /// Run every queued `pre` job that has not started, now.
    pub fn flush_pre_jobs(&self) -> Result<()> {
        let mut seen = Seen::new();
        let mut index = self.queue_state()?.open_from();

        loop {
            let job = {
                let mut state = self.queue_state()?;
                let Some(slot) = state.queue.get_mut(index) else {
                    return Ok(());
                };
                if slot.job.as_ref().is_some_and(Job::is_pre) {
                    slot.job.take()
                } else {
                    None
                }
            };

            if let Some(job) = job {
                self.run_job(&job, &mut seen);
            }
            index += 1;
        }
    }

    /// Run the deferred queue now instead of at the end of the next flush.
    pub fn flush_post_jobs(&self) -> Result<()> {
        self.run_post_pass(&mut Seen::new())
    }

    /// A future resolving once the pending or running flush has finished.
    pub fn next_tick(&self) -> NextTick {
        let Some(mut state) = self.queue_state_or_report() else {
            return NextTick::ready();
        };
        if !state.flush_pending && !state.flushing {
            return NextTick::ready();
        }

        let (sender, receiver) = oneshot::channel();
        state.waiters.push(sender);
        NextTick::after(receiver)
    }

    /// Run `callback` once the pending or running flush has finished, or at
    /// the end of the current turn when nothing is pending.
    pub fn on_next_flush(&self, callback: impl FnOnce() + 'static) {
        {
            let Some(mut state) = self.queue_state_or_report() else {
                return;
            };
            if state.flush_pending || state.flushing {
                state.callbacks.push(Box::new(callback));
                return;
            }
        }

        let runtime = self.downgrade();
        self.inner.host.queue_microtask(Box::new(move || {
            if let Some(runtime) = runtime.upgrade() {
                runtime.run_flush_callback(Box::new(callback));
            }
            Ok(())
        }));
    }

    /// A flush has been requested and not started yet.
    pub fn is_flush_pending(&self) -> bool {
        self.inner
            .scheduler
            .state
            .try_borrow()
            .is_ok_and(|state| state.flush_pending)
    }

    /// A flush is running. Reads as idle while the queue is being updated.
    pub fn is_flushing(&self) -> bool {
        self.inner
            .scheduler
            .state
            .try_borrow()
            .is_ok_and(|state| state.flushing)
    }

    /// Jobs waiting in either queue.
    pub fn pending_jobs(&self) -> usize {
        self.inner
            .scheduler
            .state
            .try_borrow()
            .map_or(0, |state| state.live_jobs())
    }

    /// Ask the host for a flush unless one is pending or running.
    fn request_flush(&self) {
        {
            let Some(mut state) = self.queue_state_or_report() else {
                return;
            };
            if state.flushing || state.flush_pending {
                return;
            }
            state.flush_pending = true;
        }

        let runtime = self.downgrade();
        self.inner.host.queue_microtask(Box::new(move || match runtime.upgrade() {
            Some(runtime) => runtime.flush_jobs(),
            None => Ok(()),
        }));
    }

    /// Drain both queues until they stay empty.
    pub(crate) fn flush_jobs(&self) -> Result<()> {
        let result = self.drain_queues();
        if let Err(error) = &result {
            tracing::error!(%error, "flush aborted");
            self.abort_flush();
        }
        result
    }

    fn drain_queues(&self) -> Result<()> {
        let mut seen = Seen::new();
        let mut passes = 0_u32;

        loop {
            passes += 1;
            let queued = {
                let mut state = self.queue_state()?;
                state.flush_pending = false;
                state.flushing = true;
                state.cursor = 0;
                state.queue.sort_by_key(|slot| slot.key);
                state.queue.len()
            };
            tracing::debug!(pass = passes, queued, "flush started");

            loop {
                let job = {
                    let state = self.queue_state()?;
                    match state.queue.get(state.cursor) {
                        Some(slot) => slot.job.clone(),
                        None => break,
                    }
                };

                if let Some(job) = job {
                    if job.is_active() {
                        self.run_job(&job, &mut seen);
                    }
                }

                self.queue_state()?.cursor += 1;
            }

            {
                let mut state = self.queue_state()?;
                state.cursor = 0;
                state.queue.clear();
            }

            self.run_post_pass(&mut seen)?;

            let mut state = self.queue_state()?;
            state.flushing = false;
            if state.queue.is_empty() && state.pending_post.is_empty() {
                break;
            }
        }

        tracing::debug!(passes, "flush finished");
        self.finish_flush()
    }

    /// Deduplicate the deferred queue and run it in id order.
    ///
    /// When a deferred pass is already running, new jobs are appended to its
    /// active list instead.
    fn run_post_pass(&self, seen: &mut Seen) -> Result<()> {
        {
            let mut state = self.queue_state()?;
            if state.pending_post.is_empty() {
                return Ok(());
            }

            let deduped: IndexMap<u64, Job> = state
                .pending_post
                .drain(..)
                .map(|job| (job.serial(), job))
                .collect();

            if let Some(active) = state.active_post.as_mut() {
                active.extend(deduped.into_values());
                return Ok(());
            }

            let mut active: Vec<Job> = deduped.into_values().collect();
            active.sort_by_key(Job::post_order);
            state.active_post = Some(active);
            state.post_cursor = 0;
        }

        loop {
            let job = {
                let state = self.queue_state()?;
                let Some(active) = &state.active_post else {
                    return Err(EngineError::SchedulerCorrupted("deferred list vanished mid-pass"));
                };
                if state.post_cursor > active.len() {
                    return Err(EngineError::SchedulerCorrupted("deferred cursor out of range"));
                }
                match active.get(state.post_cursor) {
                    Some(job) => job.clone(),
                    None => break,
                }
            };

            if job.is_active() {
                self.run_job(&job, seen);
            }

            self.queue_state()?.post_cursor += 1;
        }

        let finished = {
            let mut state = self.queue_state()?;
            state.post_cursor = 0;
            state.active_post.take()
        };
        drop(finished);
        Ok(())
    }

    /// Run one job, isolating a panic and enforcing the recursion limit.
    fn run_job(&self, job: &Job, seen: &mut Seen) {
        let config = self.config();
        if config.check_recursive_updates {
            let count = seen.entry(job.serial()).or_insert(0);
            if *count >= config.max_recursive_updates {
                self.report(&EngineError::RecursionLimit {
                    job: job.serial(),
                    limit: config.max_recursive_updates,
                });
                return;
            }
            *count += 1;
        }

        if let Err(error) = call_with_error_handling(ErrorSource::Scheduler, || job.run()) {
            self.report(&error);
        }
    }

    /// Resolve everyone waiting on this flush.
    fn finish_flush(&self) -> Result<()> {
        let (waiters, callbacks) = {
            let mut state = self.queue_state()?;
            (
                std::mem::take(&mut state.waiters),
                std::mem::take(&mut state.callbacks),
            )
        };

        for waiter in waiters {
            let _ = waiter.send(());
        }
        for callback in callbacks {
            self.run_flush_callback(callback);
        }
        Ok(())
    }

    fn run_flush_callback(&self, callback: Box<dyn FnOnce()>) {
        if let Err(error) = call_with_error_handling(ErrorSource::FlushCallback, callback) {
            self.report(&error);
        }
    }

    /// Reset after a bookkeeping failure so the next trigger starts clean.
    fn abort_flush(&self) {
        let Ok(mut state) = self.inner.scheduler.state.try_borrow_mut() else {
            return;
        };
        let dropped = std::mem::take(&mut *state);
        drop(state);
        // Waiters resolve when their senders drop.
        drop(dropped);
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state.try_borrow() {
            Ok(state) => f
                .debug_struct("Scheduler")
                .field("queued", &state.live_jobs())
                .field("flush_pending", &state.flush_pending)
                .field("flushing", &state.flushing)
                .finish(),
            Err(_) => f.write_str("Scheduler(<flushing>)"),
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
