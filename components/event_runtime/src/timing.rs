//! Timer-based helpers: `sleep`, debounce and throttle.

use core_types::{JsError, JsResult, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::promise::PromiseCell;
use crate::scheduler::Scheduler;
use crate::timer::TimerId;

/// Returns a promise fulfilled with undefined after `ms` milliseconds.
pub fn sleep(scheduler: &Scheduler, ms: u64) -> PromiseCell {
    let cell = scheduler.pending_promise();
    let wake = cell.clone();
    scheduler.set_timeout(ms, move |_| {
        wake.resolve(Value::Undefined);
        Ok(())
    });
    cell
}

type DebouncedFn = Box<dyn FnMut(&Scheduler, Value) -> JsResult<()>>;

struct DebounceState {
    callback: Option<DebouncedFn>,
    pending: Option<(TimerId, Value)>,
}

/// Coalesces bursts of calls into one trailing call.
///
/// Each [`call`](Debounce::call) restarts the quiet period; the callback
/// runs once the period elapses with the arguments of the latest call.
///
/// # Examples
///
/// ```
/// use event_runtime::{Debounce, EventLoop};
/// use core_types::Value;
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let event_loop = EventLoop::new();
/// let calls = Rc::new(RefCell::new(Vec::new()));
///
/// let log = calls.clone();
/// event_loop.run_until_idle(move |scheduler| {
///     let search = Debounce::new(scheduler, 300, move |scheduler, query| {
///         log.borrow_mut().push((scheduler.now(), query));
///         Ok(())
///     });
///     search.call("r");
///     search.call("ru");
///     search.call("rust");
///     Ok(())
/// });
///
/// assert_eq!(*calls.borrow(), vec![(300, Value::from("rust"))]);
/// ```
#[derive(Clone)]
pub struct Debounce {
    scheduler: Scheduler,
    wait_ms: u64,
    state: Rc<RefCell<DebounceState>>,
}

impl Debounce {
    /// Creates a debounced wrapper around `callback`.
    pub fn new<F>(scheduler: &Scheduler, wait_ms: u64, callback: F) -> Self
    where
        F: FnMut(&Scheduler, Value) -> JsResult<()> + 'static,
    {
        Self {
            scheduler: scheduler.clone(),
            wait_ms,
            state: Rc::new(RefCell::new(DebounceState {
                callback: Some(Box::new(callback)),
                pending: None,
            })),
        }
    }

    /// Schedules a trailing call with `args`, replacing any pending one.
    pub fn call(&self, args: impl Into<Value>) {
        let args = args.into();
        self.cancel();

        let state = self.state.clone();
        let snapshot = args.clone();
        let timer = self.scheduler.set_timeout(self.wait_ms, move |scheduler| {
            state.borrow_mut().pending = None;
            invoke_debounced(&state, scheduler, snapshot)
        });
        self.state.borrow_mut().pending = Some((timer, args));
    }

    /// Drops the pending call, if any.
    pub fn cancel(&self) {
        let pending = self.state.borrow_mut().pending.take();
        if let Some((timer, _)) = pending {
            self.scheduler.clear_timeout(timer);
        }
    }

    /// Runs the pending call now, if any.
    ///
    /// Flushing from inside the callback fails with a `TypeError` and leaves
    /// the pending call scheduled.
    pub fn flush(&self) -> JsResult<()> {
        if self.state.borrow().callback.is_none() {
            return Err(already_running());
        }
        let pending = self.state.borrow_mut().pending.take();
        match pending {
            Some((timer, args)) => {
                self.scheduler.clear_timeout(timer);
                invoke_debounced(&self.state, &self.scheduler, args)
            }
            None => Ok(()),
        }
    }

    /// Returns true while a trailing call is scheduled.
    pub fn is_pending(&self) -> bool {
        self.state.borrow().pending.is_some()
    }
}

fn invoke_debounced(
    state: &RefCell<DebounceState>,
    scheduler: &Scheduler,
    args: Value,
) -> JsResult<()> {
    let callback = state.borrow_mut().callback.take();
    let Some(mut callback) = callback else {
        return Err(already_running());
    };
    let result = callback(scheduler, args);
    state.borrow_mut().callback = Some(callback);
    result
}

fn already_running() -> JsError {
    JsError::type_error("callback is already running")
}

impl fmt::Debug for Debounce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Debounce")
            .field("wait_ms", &self.wait_ms)
            .field("pending", &self.is_pending())
            .finish()
    }
}

type ThrottledFn = Box<dyn FnMut(&Scheduler, Value) -> JsResult<Value>>;

struct Trailing {
    timer: TimerId,
    args: Value,
    cell: PromiseCell,
}

struct ThrottleState {
    callback: Option<ThrottledFn>,
    last_run: Option<u64>,
    trailing: Option<Trailing>,
}

/// Runs a callback at most once per interval.
///
/// A call outside the interval runs at once. A call inside it becomes the
/// trailing call, run when the interval elapses; a newer call replaces it,
/// and the replaced call's promise settles with the newer call's result.
#[derive(Clone)]
pub struct Throttle {
    scheduler: Scheduler,
    interval_ms: u64,
    state: Rc<RefCell<ThrottleState>>,
}

impl Throttle {
    /// Creates a throttled wrapper around `callback`.
    pub fn new<F>(scheduler: &Scheduler, interval_ms: u64, callback: F) -> Self
    where
        F: FnMut(&Scheduler, Value) -> JsResult<Value> + 'static,
    {
        Self {
            scheduler: scheduler.clone(),
            interval_ms,
            state: Rc::new(RefCell::new(ThrottleState {
                callback: Some(Box::new(callback)),
                last_run: None,
                trailing: None,
            })),
        }
    }

    /// Calls or schedules the callback; the promise settles with its result.
    ///
    /// A call that would run the callback while it is already running
    /// rejects with a `TypeError`.
    pub fn call(&self, args: impl Into<Value>) -> PromiseCell {
        let args = args.into();
        let now = self.scheduler.now();
        let cell = self.scheduler.pending_promise();

        let mut state = self.state.borrow_mut();
        let window_end = state.last_run.map(|last| last.saturating_add(self.interval_ms));
        let in_window = window_end.is_some_and(|end| now < end);

        if let Some(previous) = state.trailing.take() {
            previous.cell.resolve(cell.clone());
            state.trailing = Some(Trailing {
                timer: previous.timer,
                args,
                cell: cell.clone(),
            });
            return cell;
        }

        if !in_window {
            state.last_run = Some(now);
            drop(state);
            settle_throttled(&self.state, &self.scheduler, &cell, args);
            return cell;
        }

        let delay = window_end.map_or(0, |end| end - now);
        let shared = self.state.clone();
        let timer = self.scheduler.set_timeout(delay, move |scheduler| {
            let trailing = {
                let mut state = shared.borrow_mut();
                state.last_run = Some(scheduler.now());
                state.trailing.take()
            };
            if let Some(trailing) = trailing {
                settle_throttled(&shared, scheduler, &trailing.cell, trailing.args);
            }
            Ok(())
        });
        state.trailing = Some(Trailing {
            timer,
            args,
            cell: cell.clone(),
        });
        cell
    }

    /// Drops the trailing call; its promise stays pending.
    pub fn cancel(&self) {
        let trailing = self.state.borrow_mut().trailing.take();
        if let Some(trailing) = trailing {
            self.scheduler.clear_timeout(trailing.timer);
        }
    }

    /// Returns true while a trailing call is scheduled.
    pub fn is_pending(&self) -> bool {
        self.state.borrow().trailing.is_some()
    }
}

fn settle_throttled(
    state: &RefCell<ThrottleState>,
    scheduler: &Scheduler,
    cell: &PromiseCell,
    args: Value,
) {
    let callback = state.borrow_mut().callback.take();
    let Some(mut callback) = callback else {
        cell.reject(already_running());
        return;
    };
    let result = callback(scheduler, args);
    state.borrow_mut().callback = Some(callback);
    match result {
        Ok(value) => cell.resolve(value),
        Err(reason) => cell.reject(reason),
    }
}

impl fmt::Debug for Throttle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Throttle")
            .field("interval_ms", &self.interval_ms)
            .field("pending", &self.is_pending())
            .finish()
    }
}
