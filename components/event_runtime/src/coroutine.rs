//! Resumable coroutines and the async function driver.
//!
//! A coroutine body is an explicit state machine: each call to
//! [`CoroutineBody::resume`] runs it from its saved resume point to the next
//! yield or return. [`Coroutine`] wraps a body with the generator protocol
//! (`next`, `throw`, `return`). [`spawn`] drives a coroutine as an async
//! function, resuming it from promise reactions so that long chains of
//! awaits never grow the call stack.

use core_types::{JsError, JsResult, Value};
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use tracing::trace;

use crate::promise::PromiseCell;
use crate::scheduler::Scheduler;

/// Input delivered to a coroutine body when it is resumed.
#[derive(Debug, Clone, PartialEq)]
pub enum Resume {
    /// First resumption; the body starts from the top
    Start,
    /// The suspended yield evaluates to this value
    Next(Value),
    /// The suspended yield throws this error
    Throw(JsError),
}

/// How a body suspended or finished.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Suspend, handing a value to the caller
    Yield(Value),
    /// Finish with a value
    Return(Value),
}

/// A suspendable function body.
///
/// Returning `Err` from `resume` throws out of the coroutine, which is then
/// done. Closures of type `FnMut(Resume) -> JsResult<Step>` are bodies.
pub trait CoroutineBody {
    /// Runs the body from its current resume point.
    fn resume(&mut self, input: Resume) -> JsResult<Step>;

    /// Called when `return()` terminates the body while suspended.
    fn close(&mut self) {}
}

impl<F> CoroutineBody for F
where
    F: FnMut(Resume) -> JsResult<Step>,
{
    fn resume(&mut self, input: Resume) -> JsResult<Step> {
        self(input)
    }
}

type StepFn = Box<dyn FnMut(Resume) -> JsResult<Step>>;

/// A body built from an ordered list of steps.
///
/// Step `n` runs on the `n`th resumption and receives the value of the
/// previous yield. The resume point advances before the step runs, so a
/// step that throws is never retried.
///
/// # Examples
///
/// ```
/// use event_runtime::{Coroutine, Step, Steps};
/// use core_types::Value;
///
/// let generator = Coroutine::start(
///     Steps::new()
///         .step(|_| Ok(Step::Yield(Value::from("A"))))
///         .step(|_| Ok(Step::Yield(Value::from("B"))))
///         .step(|_| Ok(Step::Return(Value::from("C")))),
/// );
///
/// let values: Vec<_> = generator.iter().collect::<Result<_, _>>().unwrap();
/// assert_eq!(values, vec![Value::from("A"), Value::from("B")]);
/// ```
#[derive(Default)]
pub struct Steps {
    steps: Vec<StepFn>,
    pc: usize,
    on_close: Option<Box<dyn FnMut()>>,
}

impl Steps {
    /// Creates an empty body, which returns undefined immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a step. An error thrown into the body at this step propagates
    /// without running `f`.
    pub fn step<F>(mut self, mut f: F) -> Self
    where
        F: FnMut(Value) -> JsResult<Step> + 'static,
    {
        self.steps.push(Box::new(move |input| match input {
            Resume::Start => f(Value::Undefined),
            Resume::Next(value) => f(value),
            Resume::Throw(reason) => Err(reason),
        }));
        self
    }

    /// Appends a step that sees thrown errors and may recover from them.
    pub fn step_catching<F>(mut self, f: F) -> Self
    where
        F: FnMut(Resume) -> JsResult<Step> + 'static,
    {
        self.steps.push(Box::new(f));
        self
    }

    /// Sets the cleanup run when the coroutine is closed early.
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: FnMut() + 'static,
    {
        self.on_close = Some(Box::new(f));
        self
    }

    /// Returns the index of the step that runs next.
    pub fn resume_point(&self) -> usize {
        self.pc
    }
}

impl CoroutineBody for Steps {
    fn resume(&mut self, input: Resume) -> JsResult<Step> {
        let Some(step) = self.steps.get_mut(self.pc) else {
            return match input {
                Resume::Throw(reason) => Err(reason),
                _ => Ok(Step::Return(Value::Undefined)),
            };
        };
        self.pc += 1;
        step(input)
    }

    fn close(&mut self) {
        if let Some(on_close) = self.on_close.as_mut() {
            on_close();
        }
    }
}

impl fmt::Debug for Steps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Steps")
            .field("len", &self.steps.len())
            .field("pc", &self.pc)
            .finish()
    }
}

/// Lifecycle of a coroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoroutineState {
    /// Started but never resumed
    Created,
    /// Executing its body
    Running,
    /// Paused at a yield
    Suspended,
    /// Returned, threw or was closed
    Done,
}

/// The `{ value, done }` pair produced by each resumption.
#[derive(Debug, Clone, PartialEq)]
pub struct IteratorResult {
    /// The yielded or returned value
    pub value: Value,
    /// Whether the coroutine finished
    pub done: bool,
}

impl IteratorResult {
    /// Creates a result that is not done.
    pub fn value(value: Value) -> Self {
        Self { value, done: false }
    }

    /// Creates a done result with undefined.
    pub fn done() -> Self {
        Self::done_with_value(Value::Undefined)
    }

    /// Creates a done result carrying a value.
    pub fn done_with_value(value: Value) -> Self {
        Self { value, done: true }
    }

    /// Converts to a `{ value, done }` record.
    pub fn to_value(&self) -> Value {
        Value::object([
            ("value", self.value.clone()),
            ("done", Value::Boolean(self.done)),
        ])
    }
}

struct CoroutineInner {
    state: CoroutineState,
    body: Option<Box<dyn CoroutineBody>>,
}

/// A generator driven through `next`, `throw` and `return`.
///
/// Cloning the handle shares the coroutine.
#[derive(Clone)]
pub struct Coroutine {
    inner: Rc<RefCell<CoroutineInner>>,
}

impl Coroutine {
    /// Wraps a body. Nothing runs until the first `next`.
    pub fn start<B>(body: B) -> Self
    where
        B: CoroutineBody + 'static,
    {
        Self {
            inner: Rc::new(RefCell::new(CoroutineInner {
                state: CoroutineState::Created,
                body: Some(Box::new(body)),
            })),
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> CoroutineState {
        self.inner.borrow().state
    }

    /// Resumes with a value.
    ///
    /// The value passed to the first call is ignored. Once done, every call
    /// returns `{ undefined, done: true }`. An error thrown by the body
    /// finishes the coroutine and is returned.
    pub fn next(&self, value: Value) -> JsResult<IteratorResult> {
        self.resume(Resume::Next(value))
    }

    /// Throws `error` at the suspended yield.
    ///
    /// On a coroutine that has not started, or has finished, the coroutine is
    /// done afterwards and `error` is returned.
    pub fn throw(&self, error: JsError) -> JsResult<IteratorResult> {
        self.resume(Resume::Throw(error))
    }

    /// Finishes the coroutine with `value` without resuming the body.
    ///
    /// A suspended body gets its [`CoroutineBody::close`] hook called.
    pub fn return_value(&self, value: Value) -> JsResult<IteratorResult> {
        let (body, suspended) = {
            let mut inner = self.inner.borrow_mut();
            let state = inner.state;
            match state {
                CoroutineState::Running => {
                    return Err(JsError::type_error("coroutine is already running"))
                }
                CoroutineState::Done => return Ok(IteratorResult::done_with_value(value)),
                CoroutineState::Created | CoroutineState::Suspended => {
                    inner.state = CoroutineState::Done;
                    (inner.body.take(), state == CoroutineState::Suspended)
                }
            }
        };
        if let Some(mut body) = body {
            if suspended {
                body.close();
            }
        }
        Ok(IteratorResult::done_with_value(value))
    }

    fn resume(&self, input: Resume) -> JsResult<IteratorResult> {
        let (mut body, input) = {
            let mut inner = self.inner.borrow_mut();
            let input = match (inner.state, input) {
                (CoroutineState::Running, _) => {
                    return Err(JsError::type_error("coroutine is already running"))
                }
                (CoroutineState::Done, Resume::Throw(reason)) => return Err(reason),
                (CoroutineState::Done, _) => return Ok(IteratorResult::done()),
                (CoroutineState::Created, Resume::Throw(reason)) => {
                    inner.state = CoroutineState::Done;
                    inner.body = None;
                    return Err(reason);
                }
                (CoroutineState::Created, _) => Resume::Start,
                (CoroutineState::Suspended, input) => input,
            };
            let Some(body) = inner.body.take() else {
                inner.state = CoroutineState::Done;
                return Err(JsError::new(
                    core_types::ErrorKind::InternalError,
                    "coroutine lost its body",
                ));
            };
            inner.state = CoroutineState::Running;
            (body, input)
        };

        let result = body.resume(input);

        let mut inner = self.inner.borrow_mut();
        match result {
            Ok(Step::Yield(value)) => {
                inner.state = CoroutineState::Suspended;
                inner.body = Some(body);
                Ok(IteratorResult::value(value))
            }
            Ok(Step::Return(value)) => {
                inner.state = CoroutineState::Done;
                Ok(IteratorResult::done_with_value(value))
            }
            Err(reason) => {
                inner.state = CoroutineState::Done;
                Err(reason)
            }
        }
    }

    /// Iterates over the yielded values, like `for...of`.
    ///
    /// The return value is not produced. Dropping the iterator before the
    /// coroutine finished closes it.
    pub fn iter(&self) -> CoroutineIter {
        CoroutineIter {
            coroutine: self.clone(),
            finished: false,
        }
    }
}

impl fmt::Debug for Coroutine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coroutine")
            .field("state", &self.state())
            .finish()
    }
}

/// Iterator returned by [`Coroutine::iter`].
///
/// A thrown error is produced once as `Err` and ends the iteration.
#[derive(Debug)]
pub struct CoroutineIter {
    coroutine: Coroutine,
    finished: bool,
}

impl Iterator for CoroutineIter {
    type Item = JsResult<Value>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.coroutine.next(Value::Undefined) {
            Ok(result) if result.done => {
                self.finished = true;
                None
            }
            Ok(result) => Some(Ok(result.value)),
            Err(reason) => {
                self.finished = true;
                Some(Err(reason))
            }
        }
    }
}

impl Drop for CoroutineIter {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.coroutine.return_value(Value::Undefined);
        }
    }
}

/// Drives `body` as an async function and returns its result promise.
pub(crate) fn spawn<B>(scheduler: &Scheduler, body: B) -> PromiseCell
where
    B: CoroutineBody + 'static,
{
    let coroutine = Coroutine::start(body);
    let result = scheduler.pending_promise();
    step(scheduler, &coroutine, &result, Resume::Start);
    result
}

fn step(scheduler: &Scheduler, coroutine: &Coroutine, result: &PromiseCell, input: Resume) {
    let outcome = match input {
        Resume::Throw(reason) => coroutine.throw(reason),
        Resume::Next(value) => coroutine.next(value),
        Resume::Start => coroutine.next(Value::Undefined),
    };
    let awaited = match outcome {
        Ok(IteratorResult { value, done: true }) => return result.resolve(value),
        Ok(IteratorResult { value, done: false }) => scheduler.resolved(value),
        Err(reason) => return result.reject(reason),
    };
    trace!(promise = result.id(), awaiting = awaited.id(), "async function suspended");

    let shared = scheduler.downgrade();
    let (on_ok_coroutine, on_ok_result) = (coroutine.clone(), result.clone());
    let on_err_shared = shared.clone();
    let (on_err_coroutine, on_err_result) = (coroutine.clone(), result.clone());
    awaited.observe(
        move |value| {
            if let Some(scheduler) = Scheduler::upgrade(&shared) {
                step(&scheduler, &on_ok_coroutine, &on_ok_result, Resume::Next(value));
            }
        },
        move |reason| {
            if let Some(scheduler) = Scheduler::upgrade(&on_err_shared) {
                step(&scheduler, &on_err_coroutine, &on_err_result, Resume::Throw(reason));
            }
        },
    );
}
