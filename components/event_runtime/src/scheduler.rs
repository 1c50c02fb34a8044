//! The scheduler context handle.
//!
//! A [`Scheduler`] is a cheap, cloneable handle to the state owned by one
//! [`EventLoop`](crate::EventLoop): the microtask queue, the timer registry,
//! the clock and the rejection tracker. Every callback the loop runs receives
//! it explicitly, so there is no ambient global state.

use core_types::{JsError, JsResult, Value};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use tracing::{debug, error, trace, warn};

use crate::clock::Clock;
use crate::combinators;
use crate::config::{ClockMode, LoopConfig};
use crate::coroutine::{self, CoroutineBody};
use crate::event_loop::RunReport;
use crate::promise::{CellState, PromiseCell, Reject, RejectionTracker, Resolve};
use crate::remote::RemoteQueue;
use crate::task_queue::{MicroTask, MicrotaskQueue, Task};
use crate::timer::{TimerCallback, TimerId, TimerRegistry};
use crate::timing;

pub(crate) struct Shared {
    config: LoopConfig,
    microtasks: RefCell<MicrotaskQueue>,
    timers: RefCell<TimerRegistry>,
    clock: RefCell<Clock>,
    rejections: RefCell<RejectionTracker>,
    remote: Arc<RemoteQueue>,
    report: RefCell<RunReport>,
    unhandled_hook: RefCell<Option<Rc<dyn Fn(&JsError)>>>,
    next_promise_id: Cell<u64>,
}

impl Shared {
    pub(crate) fn next_promise_id(&self) -> u64 {
        let id = self.next_promise_id.get();
        self.next_promise_id.set(id + 1);
        id
    }

    pub(crate) fn enqueue_microtask(&self, microtask: MicroTask) {
        self.microtasks.borrow_mut().enqueue(microtask);
    }

    pub(crate) fn track_rejection(
        &self,
        id: u64,
        cell: Weak<RefCell<CellState>>,
        reason: JsError,
    ) {
        if self.config.track_unhandled_rejections {
            self.rejections.borrow_mut().track(id, cell, reason);
        }
    }
}

/// Handle to an event loop's queues, timers and clock.
///
/// # Examples
///
/// ```
/// use event_runtime::EventLoop;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let event_loop = EventLoop::new();
/// let log = Rc::new(RefCell::new(Vec::new()));
///
/// let entry_log = log.clone();
/// event_loop.run_until_idle(move |scheduler| {
///     let timer_log = entry_log.clone();
///     scheduler.set_timeout(0, move |_| {
///         timer_log.borrow_mut().push("timeout");
///         Ok(())
///     });
///     let micro_log = entry_log.clone();
///     scheduler.queue_microtask(move |_| {
///         micro_log.borrow_mut().push("microtask");
///         Ok(())
///     });
///     entry_log.borrow_mut().push("sync");
///     Ok(())
/// });
///
/// assert_eq!(*log.borrow(), vec!["sync", "microtask", "timeout"]);
/// ```
#[derive(Clone)]
pub struct Scheduler {
    shared: Rc<Shared>,
}

impl Scheduler {
    pub(crate) fn new(config: LoopConfig) -> Self {
        let shared = Shared {
            microtasks: RefCell::new(MicrotaskQueue::new()),
            timers: RefCell::new(TimerRegistry::new(config.min_timer_delay_ms)),
            clock: RefCell::new(Clock::new(config.clock)),
            rejections: RefCell::new(RejectionTracker::default()),
            remote: Arc::new(RemoteQueue::new()),
            report: RefCell::new(RunReport::default()),
            unhandled_hook: RefCell::new(None),
            next_promise_id: Cell::new(1),
            config,
        };
        Self {
            shared: Rc::new(shared),
        }
    }

    pub(crate) fn downgrade(&self) -> Weak<Shared> {
        Rc::downgrade(&self.shared)
    }

    pub(crate) fn upgrade(shared: &Weak<Shared>) -> Option<Scheduler> {
        shared.upgrade().map(|shared| Scheduler { shared })
    }

    pub(crate) fn remote(&self) -> &Arc<RemoteQueue> {
        &self.shared.remote
    }

    /// Returns the loop configuration.
    pub fn config(&self) -> &LoopConfig {
        &self.shared.config
    }

    /// Returns the current time in milliseconds.
    pub fn now(&self) -> u64 {
        self.shared.clock.borrow().now()
    }

    /// Creates a pending promise with no executor.
    pub fn pending_promise(&self) -> PromiseCell {
        PromiseCell::new(&self.shared)
    }

    /// Creates a promise and runs `executor` synchronously with its resolvers.
    ///
    /// An error returned by the executor rejects the promise, unless it was
    /// already resolved.
    pub fn new_promise<F>(&self, executor: F) -> PromiseCell
    where
        F: FnOnce(Resolve, Reject) -> JsResult<()>,
    {
        let (cell, resolve, reject) = self.with_resolvers();
        if let Err(reason) = executor(resolve, reject) {
            cell.reject(reason);
        }
        cell
    }

    /// Creates a pending promise together with its resolvers.
    pub fn with_resolvers(&self) -> (PromiseCell, Resolve, Reject) {
        let cell = self.pending_promise();
        (cell.clone(), Resolve::new(cell.clone()), Reject::new(cell))
    }

    /// Returns a promise resolved with `value`.
    ///
    /// A value that already holds a promise is returned as that promise.
    pub fn resolved(&self, value: impl Into<Value>) -> PromiseCell {
        let value = value.into();
        if let Some(cell) = PromiseCell::from_value(&value) {
            return cell;
        }
        let cell = self.pending_promise();
        cell.resolve(value);
        cell
    }

    /// Returns a promise rejected with `reason`.
    pub fn rejected(&self, reason: JsError) -> PromiseCell {
        let cell = self.pending_promise();
        cell.reject(reason);
        cell
    }

    /// Queues a callback on the microtask queue.
    pub fn queue_microtask<F>(&self, f: F)
    where
        F: FnOnce(&Scheduler) -> JsResult<()> + 'static,
    {
        self.shared
            .enqueue_microtask(MicroTask::new("queueMicrotask", f));
    }

    /// Queues a macrotask to run at the current time, without clamping.
    pub fn enqueue_task(&self, task: Task) -> TimerId {
        let now = self.now();
        let id = self
            .shared
            .timers
            .borrow_mut()
            .schedule_at(now, task.into_callback());
        trace!(timer = %id, "task queued");
        id
    }

    /// Runs `f` once after `delay_ms` milliseconds.
    pub fn set_timeout<F>(&self, delay_ms: u64, f: F) -> TimerId
    where
        F: FnOnce(&Scheduler) -> JsResult<()> + 'static,
    {
        self.schedule(delay_ms, Task::new(f).into_callback(), false)
    }

    /// Cancels a timeout. Unknown or fired ids are ignored.
    pub fn clear_timeout(&self, id: TimerId) {
        if self.shared.timers.borrow_mut().cancel(id) {
            debug!(timer = %id, "timer cancelled");
        }
    }

    /// Runs `f` every `interval_ms` milliseconds until cancelled.
    ///
    /// An error returned by `f` is reported and does not stop the interval.
    pub fn set_interval<F>(&self, interval_ms: u64, f: F) -> TimerId
    where
        F: FnMut(&Scheduler) -> JsResult<()> + 'static,
    {
        self.schedule(interval_ms, Box::new(f), true)
    }

    /// Cancels an interval. Unknown or cancelled ids are ignored.
    pub fn clear_interval(&self, id: TimerId) {
        self.clear_timeout(id);
    }

    fn schedule(&self, delay_ms: u64, callback: TimerCallback, repeat: bool) -> TimerId {
        let now = self.now();
        let id = self
            .shared
            .timers
            .borrow_mut()
            .schedule(now, delay_ms, callback, repeat);
        debug!(timer = %id, delay_ms, repeat, "timer scheduled");
        id
    }

    /// Runs `body` as an async function.
    ///
    /// The body runs synchronously up to its first yield. Each yielded value
    /// is awaited: the body resumes in a microtask with the fulfillment
    /// value, or with the rejection thrown in. The returned promise settles
    /// with the body's return value or uncaught error.
    pub fn spawn_async<B>(&self, body: B) -> PromiseCell
    where
        B: CoroutineBody + 'static,
    {
        coroutine::spawn(self, body)
    }

    /// See [`combinators::all`].
    pub fn all(&self, cells: impl IntoIterator<Item = PromiseCell>) -> PromiseCell {
        combinators::all(self, cells)
    }

    /// See [`combinators::all_settled`].
    pub fn all_settled(&self, cells: impl IntoIterator<Item = PromiseCell>) -> PromiseCell {
        combinators::all_settled(self, cells)
    }

    /// See [`combinators::race`].
    pub fn race(&self, cells: impl IntoIterator<Item = PromiseCell>) -> PromiseCell {
        combinators::race(self, cells)
    }

    /// See [`combinators::any`].
    pub fn any(&self, cells: impl IntoIterator<Item = PromiseCell>) -> PromiseCell {
        combinators::any(self, cells)
    }

    /// Returns a promise fulfilled with undefined after `ms` milliseconds.
    pub fn sleep(&self, ms: u64) -> PromiseCell {
        timing::sleep(self, ms)
    }

    /// Returns the number of scheduled timers and queued tasks.
    pub fn pending_timers(&self) -> usize {
        self.shared.timers.borrow().len()
    }

    /// Returns the number of queued microtasks.
    pub fn pending_microtasks(&self) -> usize {
        self.shared.microtasks.borrow().len()
    }

    /// Runs microtasks until the queue is empty, including ones queued while
    /// draining, then reports unhandled rejections.
    pub(crate) fn drain_microtasks(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.shared.microtasks.borrow_mut().dequeue();
            match next {
                Some(microtask) => {
                    let label = microtask.label();
                    trace!(label, "running microtask");
                    if let Err(cause) = microtask.run(self) {
                        self.report_task_error(label, cause);
                    }
                    ran += 1;
                }
                None => {
                    self.check_unhandled_rejections();
                    if self.shared.microtasks.borrow().is_empty() {
                        break;
                    }
                }
            }
        }
        self.shared.report.borrow_mut().microtasks_run += ran;
        ran
    }

    fn check_unhandled_rejections(&self) {
        let unhandled = self.shared.rejections.borrow_mut().take_unhandled();
        for (id, reason) in unhandled {
            warn!(promise = id, reason = %reason, "unhandled promise rejection");
            let report = JsError::unhandled_rejection(id, reason);
            let hook = self.shared.unhandled_hook.borrow().clone();
            if let Some(hook) = hook {
                hook(&report);
            }
            self.shared.report.borrow_mut().unhandled_rejections.push(report);
        }
    }

    /// Runs the earliest timer due now, if any.
    pub(crate) fn run_one_macrotask(&self) -> bool {
        let now = self.now();
        let ready = self.shared.timers.borrow_mut().pop_ready(now);
        let Some(mut timer) = ready else {
            return false;
        };
        trace!(timer = %timer.id, fire_at = timer.fire_at, "running macrotask");
        if let Err(cause) = timer.run(self) {
            self.report_task_error(format!("timer {}", timer.id), cause);
        }
        self.shared.timers.borrow_mut().complete(timer);
        self.shared.report.borrow_mut().macrotasks_run += 1;
        true
    }

    pub(crate) fn report_task_error(&self, task: impl fmt::Display, cause: JsError) {
        error!(task = %task, error = %cause, "task failed");
        self.shared
            .report
            .borrow_mut()
            .task_errors
            .push(JsError::task_error(task, cause));
    }

    /// Moves tasks posted from other threads into the macrotask tier.
    pub(crate) fn absorb_remote_tasks(&self) -> usize {
        let tasks = self.shared.remote.take_all();
        let count = tasks.len();
        for task in tasks {
            self.enqueue_task(Task::new(task));
        }
        if count > 0 {
            debug!(count, "absorbed remote tasks");
        }
        count
    }

    pub(crate) fn set_unhandled_hook(&self, hook: Rc<dyn Fn(&JsError)>) {
        *self.shared.unhandled_hook.borrow_mut() = Some(hook);
    }

    pub(crate) fn clock_mode(&self) -> ClockMode {
        self.shared.clock.borrow().mode()
    }

    pub(crate) fn set_clock_mode(&self, mode: ClockMode) -> ClockMode {
        self.shared.clock.borrow_mut().set_mode(mode)
    }

    pub(crate) fn advance_clock_to(&self, time: u64) {
        debug!(to = time, "advancing virtual clock");
        self.shared.clock.borrow_mut().advance_to(time);
    }

    pub(crate) fn next_timer_at(&self) -> Option<u64> {
        self.shared.timers.borrow_mut().next_fire_at()
    }

    pub(crate) fn has_pending_work(&self) -> bool {
        !self.shared.microtasks.borrow().is_empty() || self.shared.timers.borrow().has_pending()
    }

    pub(crate) fn take_report(&self) -> RunReport {
        std::mem::take(&mut *self.shared.report.borrow_mut())
    }

    /// Drops every queued microtask, timer and tracked rejection.
    pub(crate) fn teardown(&self) {
        let microtasks = std::mem::take(&mut *self.shared.microtasks.borrow_mut());
        let timers = std::mem::replace(
            &mut *self.shared.timers.borrow_mut(),
            TimerRegistry::new(self.shared.config.min_timer_delay_ms),
        );
        self.shared.rejections.borrow_mut().clear();
        self.shared.unhandled_hook.borrow_mut().take();
        debug!(
            microtasks = microtasks.len(),
            timers = timers.len(),
            "scheduler torn down"
        );
        drop(microtasks);
        drop(timers);
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler")
            .field("now", &self.now())
            .field("microtasks", &self.pending_microtasks())
            .field("timers", &self.pending_timers())
            .finish()
    }
}
