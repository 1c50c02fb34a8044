//! Event loop implementation.
//!
//! This module provides the driver that coordinates synchronous entry code,
//! microtasks and macrotasks. Each turn of the loop:
//! 1. Drains every microtask, including ones queued during the drain
//! 2. Moves tasks posted from other threads into the macrotask tier
//! 3. Runs at most one ready macrotask, then goes back to 1
//! 4. With nothing ready, advances the clock to the next timer
//!
//! The loop stops once both tiers are empty, no timer is pending and no
//! [`RemoteHandle`] is alive.

use core_types::{JsError, JsResult};
use std::rc::Rc;
use std::time::Duration;
use tracing::{debug, debug_span};

use crate::config::{ClockMode, LoopConfig};
use crate::remote::RemoteHandle;
use crate::scheduler::Scheduler;

/// Summary of one `run_until_idle` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    /// Microtasks executed
    pub microtasks_run: usize,
    /// Macrotasks executed, timers and posted tasks alike
    pub macrotasks_run: usize,
    /// Errors that escaped a task body, in the order they happened
    pub task_errors: Vec<JsError>,
    /// Rejections nobody handled by the end of a microtask drain
    pub unhandled_rejections: Vec<JsError>,
    /// Clock time that passed during the run, in milliseconds
    pub elapsed_ms: u64,
}

impl RunReport {
    /// Returns true if no task failed and no rejection went unhandled.
    pub fn is_clean(&self) -> bool {
        self.task_errors.is_empty() && self.unhandled_rejections.is_empty()
    }
}

/// The event loop.
///
/// Owns the scheduler state; dropping the loop drops every queued task and
/// timer.
///
/// # Examples
///
/// ```
/// use event_runtime::EventLoop;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let event_loop = EventLoop::new();
/// let fired = Rc::new(RefCell::new(Vec::new()));
///
/// let log = fired.clone();
/// let report = event_loop.run_until_idle_virtual_clock(move |scheduler| {
///     scheduler.set_timeout(1_000, move |scheduler| {
///         log.borrow_mut().push(scheduler.now());
///         Ok(())
///     });
///     Ok(())
/// });
///
/// assert_eq!(*fired.borrow(), vec![1_000]);
/// assert_eq!(report.elapsed_ms, 1_000);
/// ```
#[derive(Debug)]
pub struct EventLoop {
    scheduler: Scheduler,
}

impl EventLoop {
    /// Creates a new EventLoop with the default configuration.
    pub fn new() -> Self {
        Self::with_config(LoopConfig::default())
    }

    /// Creates a new EventLoop with the given configuration.
    pub fn with_config(config: LoopConfig) -> Self {
        Self {
            scheduler: Scheduler::new(config),
        }
    }

    /// Returns a handle to the loop's scheduler.
    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    /// Returns the loop configuration.
    pub fn config(&self) -> &LoopConfig {
        self.scheduler.config()
    }

    /// Returns the current loop time in milliseconds.
    pub fn now(&self) -> u64 {
        self.scheduler.now()
    }

    /// Returns a handle other threads can post tasks through.
    pub fn remote_handle(&self) -> RemoteHandle {
        RemoteHandle::new(self.scheduler.remote().clone())
    }

    /// Installs the callback invoked for each unhandled rejection.
    pub fn set_unhandled_rejection_handler<F>(&self, handler: F)
    where
        F: Fn(&JsError) + 'static,
    {
        self.scheduler.set_unhandled_hook(Rc::new(handler));
    }

    /// Runs `entry` synchronously, then drives the loop until idle.
    ///
    /// Time is measured with the configured clock. An error returned by
    /// `entry` is reported like any task error.
    pub fn run_until_idle<F>(&self, entry: F) -> RunReport
    where
        F: FnOnce(&Scheduler) -> JsResult<()>,
    {
        self.run_with_clock(self.config().clock, entry)
    }

    /// Like [`run_until_idle`](Self::run_until_idle), but with simulated
    /// time: the clock jumps straight to each timer instead of sleeping.
    pub fn run_until_idle_virtual_clock<F>(&self, entry: F) -> RunReport
    where
        F: FnOnce(&Scheduler) -> JsResult<()>,
    {
        self.run_with_clock(ClockMode::Virtual, entry)
    }

    fn run_with_clock<F>(&self, mode: ClockMode, entry: F) -> RunReport
    where
        F: FnOnce(&Scheduler) -> JsResult<()>,
    {
        let span = debug_span!("event_loop.run", clock = ?mode);
        let _enter = span.enter();

        let scheduler = &self.scheduler;
        let previous = scheduler.set_clock_mode(mode);
        let started = scheduler.now();
        scheduler.take_report();

        if let Err(cause) = entry(scheduler) {
            scheduler.report_task_error("entry", cause);
        }
        self.drive();

        let mut report = scheduler.take_report();
        report.elapsed_ms = scheduler.now().saturating_sub(started);
        scheduler.set_clock_mode(previous);
        debug!(
            microtasks = report.microtasks_run,
            macrotasks = report.macrotasks_run,
            task_errors = report.task_errors.len(),
            unhandled = report.unhandled_rejections.len(),
            elapsed_ms = report.elapsed_ms,
            "event loop idle"
        );
        report
    }

    fn drive(&self) {
        let scheduler = &self.scheduler;
        loop {
            scheduler.drain_microtasks();
            scheduler.absorb_remote_tasks();
            if scheduler.run_one_macrotask() {
                continue;
            }
            if let Some(fire_at) = scheduler.next_timer_at() {
                self.wait_until(fire_at);
                continue;
            }
            if !scheduler.remote().wait_for_work() {
                break;
            }
        }
    }

    fn wait_until(&self, fire_at: u64) {
        let scheduler = &self.scheduler;
        match scheduler.clock_mode() {
            ClockMode::Virtual => scheduler.advance_clock_to(fire_at),
            ClockMode::WallClock => {
                let now = scheduler.now();
                if fire_at > now {
                    scheduler
                        .remote()
                        .wait(Duration::from_millis(fire_at - now));
                }
            }
        }
    }

    /// Drains the microtask queue and returns how many microtasks ran.
    ///
    /// New microtasks added during execution are processed before this
    /// method returns.
    pub fn run_microtasks(&self) -> usize {
        self.scheduler.drain_microtasks()
    }

    /// Processes one cycle: one ready macrotask followed by all microtasks.
    ///
    /// The clock is not advanced. Returns whether a macrotask ran.
    pub fn process_one_cycle(&self) -> bool {
        self.scheduler.absorb_remote_tasks();
        let ran = self.scheduler.run_one_macrotask();
        self.scheduler.drain_microtasks();
        ran
    }

    /// Returns true when no microtask, timer or remote handle remains.
    pub fn is_idle(&self) -> bool {
        !self.scheduler.has_pending_work() && !self.scheduler.remote().has_handles()
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.scheduler.teardown();
    }
}
