//! Promise implementation with Promise/A+ resolution semantics.
//!
//! A [`PromiseCell`] is a single-assignment result box. Settling a cell moves
//! its registered reactions onto the microtask queue in registration order;
//! reactions registered after settlement are queued immediately. Resolving a
//! cell with a thenable makes it adopt the thenable's eventual outcome.

use core_types::{FulfillCallback, JsError, JsResult, RejectCallback, Thenable, Value};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, trace};

use crate::scheduler::Shared;
use crate::task_queue::MicroTask;

/// The state of a Promise.
///
/// Once settled (Fulfilled or Rejected), a Promise cannot change state.
#[derive(Debug, Clone, PartialEq)]
pub enum PromiseState {
    /// The initial state; the promise is neither fulfilled nor rejected.
    Pending,
    /// The promise has been resolved with a value.
    Fulfilled(Value),
    /// The promise has been rejected with an error.
    Rejected(JsError),
}

impl PromiseState {
    fn outcome(&self) -> Option<JsResult<Value>> {
        match self {
            PromiseState::Pending => None,
            PromiseState::Fulfilled(value) => Some(Ok(value.clone())),
            PromiseState::Rejected(reason) => Some(Err(reason.clone())),
        }
    }
}

/// Handler run when the source promise fulfills.
pub type FulfillHandler = Box<dyn FnOnce(Value) -> JsResult<Value>>;

/// Handler run when the source promise rejects.
pub type RejectHandler = Box<dyn FnOnce(JsError) -> JsResult<Value>>;

/// A reaction to be triggered when a Promise settles.
///
/// This represents the handlers registered via `.then()`. A missing handler
/// passes the outcome through to the downstream promise unchanged.
pub struct PromiseReaction {
    on_fulfilled: Option<FulfillHandler>,
    on_rejected: Option<RejectHandler>,
    downstream: Option<PromiseCell>,
}

impl PromiseReaction {
    fn run(self, outcome: JsResult<Value>) -> JsResult<()> {
        let result = match outcome {
            Ok(value) => match self.on_fulfilled {
                Some(handler) => handler(value),
                None => Ok(value),
            },
            Err(reason) => match self.on_rejected {
                Some(handler) => handler(reason),
                None => Err(reason),
            },
        };
        match self.downstream {
            Some(downstream) => {
                downstream.complete(result);
                Ok(())
            }
            None => result.map(|_| ()),
        }
    }
}

impl fmt::Debug for PromiseReaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PromiseReaction")
            .field("on_fulfilled", &self.on_fulfilled.is_some())
            .field("on_rejected", &self.on_rejected.is_some())
            .field("downstream", &self.downstream.as_ref().map(PromiseCell::id))
            .finish()
    }
}

pub(crate) struct CellState {
    id: u64,
    state: PromiseState,
    reactions: Vec<PromiseReaction>,
    // Set once resolve or reject has been called; later calls are ignored.
    resolving: bool,
    // The native cell this one is adopting, used for cycle detection.
    following: Option<Weak<RefCell<CellState>>>,
    handled: bool,
    reported: bool,
}

// A pending chain owns each downstream cell through its reactions, so the
// default recursive drop would use one stack frame per link.
impl Drop for CellState {
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.reactions);
        while let Some(reaction) = pending.pop() {
            let Some(downstream) = reaction.downstream else {
                continue;
            };
            if let Ok(cell) = Rc::try_unwrap(downstream.state) {
                let mut inner = cell.into_inner();
                pending.append(&mut inner.reactions);
            }
        }
    }
}

/// A JavaScript-style Promise bound to a scheduler.
///
/// Cloning a `PromiseCell` clones the handle; every clone observes the same
/// state.
///
/// # Examples
///
/// ```
/// use event_runtime::EventLoop;
/// use core_types::Value;
///
/// let event_loop = EventLoop::new();
/// let scheduler = event_loop.scheduler();
///
/// let promise = scheduler.pending_promise();
/// let doubled = promise.and_then(|v| match v {
///     Value::Smi(n) => Ok(Value::Smi(n * 2)),
///     other => Ok(other),
/// });
///
/// promise.resolve(21);
/// promise.resolve(99);
/// event_loop.run_microtasks();
///
/// assert_eq!(doubled.value(), Some(Value::Smi(42)));
/// ```
#[derive(Clone)]
pub struct PromiseCell {
    state: Rc<RefCell<CellState>>,
    shared: Weak<Shared>,
}

impl PromiseCell {
    pub(crate) fn new(shared: &Rc<Shared>) -> Self {
        Self::with_id(Rc::downgrade(shared), shared.next_promise_id())
    }

    fn with_id(shared: Weak<Shared>, id: u64) -> Self {
        Self {
            state: Rc::new(RefCell::new(CellState {
                id,
                state: PromiseState::Pending,
                reactions: Vec::new(),
                resolving: false,
                following: None,
                handled: false,
                reported: false,
            })),
            shared,
        }
    }

    fn derived(&self) -> Self {
        let id = self.shared.upgrade().map_or(0, |s| s.next_promise_id());
        Self::with_id(self.shared.clone(), id)
    }

    /// Recovers a `PromiseCell` from a value holding one.
    pub fn from_value(value: &Value) -> Option<PromiseCell> {
        value
            .as_thenable()
            .and_then(|t| t.as_any().downcast_ref::<PromiseCell>())
            .cloned()
    }

    /// Returns the cell's id, used in logs and error messages.
    pub fn id(&self) -> u64 {
        self.state.borrow().id
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> PromiseState {
        self.state.borrow().state.clone()
    }

    /// Returns true while the cell is unsettled.
    pub fn is_pending(&self) -> bool {
        matches!(self.state.borrow().state, PromiseState::Pending)
    }

    /// Returns true once the cell fulfilled.
    pub fn is_fulfilled(&self) -> bool {
        matches!(self.state.borrow().state, PromiseState::Fulfilled(_))
    }

    /// Returns true once the cell rejected.
    pub fn is_rejected(&self) -> bool {
        matches!(self.state.borrow().state, PromiseState::Rejected(_))
    }

    /// Returns the fulfillment value, if any.
    pub fn value(&self) -> Option<Value> {
        match &self.state.borrow().state {
            PromiseState::Fulfilled(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Returns the rejection reason, if any.
    pub fn reason(&self) -> Option<JsError> {
        match &self.state.borrow().state {
            PromiseState::Rejected(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Returns true if both handles refer to the same cell.
    pub fn ptr_eq(&self, other: &PromiseCell) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Resolves the Promise with a value.
    ///
    /// If the value is a thenable, the cell adopts its outcome once it
    /// settles. Only the first call to `resolve` or `reject` has any effect.
    pub fn resolve(&self, value: impl Into<Value>) {
        if self.lock_in() {
            self.resolve_inner(value.into());
        }
    }

    /// Rejects the Promise with an error.
    ///
    /// Only the first call to `resolve` or `reject` has any effect.
    pub fn reject(&self, reason: JsError) {
        if self.lock_in() {
            self.settle(Err(reason));
        }
    }

    fn lock_in(&self) -> bool {
        let mut cell = self.state.borrow_mut();
        if cell.resolving || !matches!(cell.state, PromiseState::Pending) {
            return false;
        }
        cell.resolving = true;
        true
    }

    /// Settles from inside the runtime, bypassing the resolving flag.
    pub(crate) fn complete(&self, outcome: JsResult<Value>) {
        if !self.is_pending() {
            return;
        }
        self.state.borrow_mut().resolving = true;
        match outcome {
            Ok(value) => self.resolve_inner(value),
            Err(reason) => self.settle(Err(reason)),
        }
    }

    fn resolve_inner(&self, value: Value) {
        let thenable = match value {
            Value::Thenable(thenable) => thenable,
            other => return self.settle(Ok(other)),
        };
        match thenable.as_any().downcast_ref::<PromiseCell>() {
            Some(native) => self.adopt(native.clone()),
            None => self.adopt_foreign(thenable),
        }
    }

    fn adopt(&self, source: PromiseCell) {
        if self.closes_cycle(&source) {
            let id = self.id();
            debug!(promise = id, "chaining cycle detected");
            return self.settle(Err(JsError::circular_resolution(id)));
        }
        self.state.borrow_mut().following = Some(Rc::downgrade(&source.state));
        source.subscribe(PromiseReaction {
            on_fulfilled: None,
            on_rejected: None,
            downstream: Some(self.clone()),
        });
    }

    fn closes_cycle(&self, source: &PromiseCell) -> bool {
        let mut next = Some(source.state.clone());
        while let Some(cell) = next {
            if Rc::ptr_eq(&cell, &self.state) {
                return true;
            }
            next = cell.borrow().following.as_ref().and_then(Weak::upgrade);
        }
        false
    }

    fn adopt_foreign(&self, thenable: Rc<dyn Thenable>) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let target = self.clone();
        shared.enqueue_microtask(MicroTask::new("thenable job", move |_| {
            let identity = Rc::as_ptr(&thenable) as *const () as usize;
            let called = Rc::new(Cell::new(false));

            let (ok_called, ok_target) = (called.clone(), target.clone());
            let on_fulfilled: FulfillCallback = Box::new(move |value| {
                if ok_called.replace(true) {
                    return;
                }
                let is_self = matches!(
                    &value,
                    Value::Thenable(t) if Rc::as_ptr(t) as *const () as usize == identity
                );
                if is_self {
                    let id = ok_target.id();
                    ok_target.complete(Err(JsError::circular_resolution(id)));
                } else {
                    ok_target.complete(Ok(value));
                }
            });

            let (err_called, err_target) = (called.clone(), target.clone());
            let on_rejected: RejectCallback = Box::new(move |reason| {
                if !err_called.replace(true) {
                    err_target.complete(Err(reason));
                }
            });

            if let Err(reason) = thenable.then(on_fulfilled, on_rejected) {
                if !called.replace(true) {
                    target.complete(Err(reason));
                }
            }
            Ok(())
        }));
    }

    fn settle(&self, outcome: JsResult<Value>) {
        let (id, reactions, unhandled) = {
            let mut cell = self.state.borrow_mut();
            if !matches!(cell.state, PromiseState::Pending) {
                return;
            }
            cell.following = None;
            cell.state = match &outcome {
                Ok(value) => PromiseState::Fulfilled(value.clone()),
                Err(reason) => PromiseState::Rejected(reason.clone()),
            };
            (
                cell.id,
                std::mem::take(&mut cell.reactions),
                outcome.is_err() && !cell.handled,
            )
        };
        trace!(
            promise = id,
            fulfilled = outcome.is_ok(),
            reactions = reactions.len(),
            "promise settled"
        );

        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        if unhandled {
            if let Err(reason) = &outcome {
                shared.track_rejection(id, Rc::downgrade(&self.state), reason.clone());
            }
        }
        for reaction in reactions {
            schedule_reaction(&shared, reaction, outcome.clone());
        }
    }

    fn subscribe(&self, reaction: PromiseReaction) {
        let outcome = {
            let mut guard = self.state.borrow_mut();
            let cell = &mut *guard;
            if !cell.handled && cell.reported {
                debug!(promise = cell.id, "rejection handled late");
            }
            cell.handled = true;
            match cell.state.outcome() {
                Some(outcome) => outcome,
                None => {
                    cell.reactions.push(reaction);
                    return;
                }
            }
        };
        if let Some(shared) = self.shared.upgrade() {
            schedule_reaction(&shared, reaction, outcome);
        }
    }

    /// Adds handlers for fulfillment and/or rejection.
    ///
    /// Returns a new Promise settled with the handler's result, or with this
    /// promise's outcome when the matching handler is absent. A handler that
    /// returns an error rejects the returned promise.
    pub fn then(
        &self,
        on_fulfilled: Option<FulfillHandler>,
        on_rejected: Option<RejectHandler>,
    ) -> PromiseCell {
        let downstream = self.derived();
        self.subscribe(PromiseReaction {
            on_fulfilled,
            on_rejected,
            downstream: Some(downstream.clone()),
        });
        downstream
    }

    /// Shorthand for `then(Some(on_fulfilled), None)`.
    pub fn and_then<F>(&self, on_fulfilled: F) -> PromiseCell
    where
        F: FnOnce(Value) -> JsResult<Value> + 'static,
    {
        self.then(Some(Box::new(on_fulfilled)), None)
    }

    /// Shorthand for `then(None, Some(on_rejected))`.
    pub fn catch<F>(&self, on_rejected: F) -> PromiseCell
    where
        F: FnOnce(JsError) -> JsResult<Value> + 'static,
    {
        self.then(None, Some(Box::new(on_rejected)))
    }

    /// Runs `on_settled` whichever way the promise settles.
    ///
    /// The returned promise carries this promise's outcome, unless
    /// `on_settled` itself fails, in which case it rejects with that error.
    pub fn finally<F>(&self, on_settled: F) -> PromiseCell
    where
        F: FnOnce() -> JsResult<()> + 'static,
    {
        let slot = Rc::new(RefCell::new(Some(on_settled)));
        let on_reject_slot = slot.clone();
        self.then(
            Some(Box::new(move |value| {
                let callback = slot.borrow_mut().take();
                if let Some(callback) = callback {
                    callback()?;
                }
                Ok(value)
            })),
            Some(Box::new(move |reason| {
                let callback = on_reject_slot.borrow_mut().take();
                if let Some(callback) = callback {
                    callback()?;
                }
                Err(reason)
            })),
        )
    }

    /// Subscribes without creating a downstream promise.
    ///
    /// Marks a rejection as handled, like `then` does.
    pub(crate) fn observe<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(Value) + 'static,
        R: FnOnce(JsError) + 'static,
    {
        self.subscribe(PromiseReaction {
            on_fulfilled: Some(Box::new(move |value| {
                on_fulfilled(value);
                Ok(Value::Undefined)
            })),
            on_rejected: Some(Box::new(move |reason| {
                on_rejected(reason);
                Ok(Value::Undefined)
            })),
            downstream: None,
        });
    }
}

fn schedule_reaction(shared: &Shared, reaction: PromiseReaction, outcome: JsResult<Value>) {
    shared.enqueue_microtask(MicroTask::new("promise reaction", move |_| {
        reaction.run(outcome)
    }));
}

impl Thenable for PromiseCell {
    fn then(&self, on_fulfilled: FulfillCallback, on_rejected: RejectCallback) -> JsResult<()> {
        self.observe(on_fulfilled, on_rejected);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl From<PromiseCell> for Value {
    fn from(cell: PromiseCell) -> Self {
        Value::Thenable(Rc::new(cell))
    }
}

impl fmt::Debug for PromiseCell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cell = self.state.borrow();
        f.debug_struct("PromiseCell")
            .field("id", &cell.id)
            .field("state", &cell.state)
            .field("reactions", &cell.reactions.len())
            .finish()
    }
}

/// The resolve half of a promise capability.
#[derive(Debug, Clone)]
pub struct Resolve(PromiseCell);

impl Resolve {
    pub(crate) fn new(cell: PromiseCell) -> Self {
        Self(cell)
    }

    /// Resolves the underlying promise.
    pub fn call(&self, value: impl Into<Value>) {
        self.0.resolve(value);
    }
}

/// The reject half of a promise capability.
#[derive(Debug, Clone)]
pub struct Reject(PromiseCell);

impl Reject {
    pub(crate) fn new(cell: PromiseCell) -> Self {
        Self(cell)
    }

    /// Rejects the underlying promise.
    pub fn call(&self, reason: JsError) {
        self.0.reject(reason);
    }
}

struct TrackedRejection {
    id: u64,
    cell: Weak<RefCell<CellState>>,
    reason: JsError,
}

/// Rejections settled without a handler, awaiting the end of a drain.
#[derive(Default)]
pub(crate) struct RejectionTracker {
    pending: Vec<TrackedRejection>,
}

impl RejectionTracker {
    pub(crate) fn track(&mut self, id: u64, cell: Weak<RefCell<CellState>>, reason: JsError) {
        self.pending.push(TrackedRejection { id, cell, reason });
    }

    /// Returns the rejections still unhandled, marking them reported.
    pub(crate) fn take_unhandled(&mut self) -> Vec<(u64, JsError)> {
        let mut unhandled = Vec::new();
        for tracked in self.pending.drain(..) {
            match tracked.cell.upgrade() {
                Some(cell) => {
                    let mut cell = cell.borrow_mut();
                    if !cell.handled {
                        cell.reported = true;
                        unhandled.push((tracked.id, tracked.reason));
                    }
                }
                None => unhandled.push((tracked.id, tracked.reason)),
            }
        }
        unhandled
    }

    pub(crate) fn clear(&mut self) {
        self.pending.clear();
    }
}
