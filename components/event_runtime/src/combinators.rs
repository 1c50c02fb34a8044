//! Promise combinators: `all`, `all_settled`, `race` and `any`.
//!
//! Each combinator subscribes to its inputs in order and settles a fresh
//! result promise. Inputs are observed through ordinary reactions, so a
//! combinator settles in a microtask after the deciding input does.

use core_types::{JsError, Value};
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::promise::PromiseCell;
use crate::scheduler::Scheduler;

/// The outcome of one input to [`all_settled`].
#[derive(Debug, Clone, PartialEq)]
pub enum SettledOutcome {
    /// The input fulfilled with a value
    Fulfilled(Value),
    /// The input rejected with a reason
    Rejected(JsError),
}

impl SettledOutcome {
    /// Converts to a `{ status, value }` or `{ status, reason }` record.
    pub fn to_value(&self) -> Value {
        match self {
            SettledOutcome::Fulfilled(value) => Value::object([
                ("status", Value::from("fulfilled")),
                ("value", value.clone()),
            ]),
            SettledOutcome::Rejected(reason) => Value::object([
                ("status", Value::from("rejected")),
                ("reason", reason.clone().into_value()),
            ]),
        }
    }

    /// Parses a record produced by [`SettledOutcome::to_value`].
    pub fn from_value(value: &Value) -> Option<Self> {
        match value.get("status")?.as_str()? {
            "fulfilled" => Some(SettledOutcome::Fulfilled(value.get("value")?.clone())),
            "rejected" => Some(SettledOutcome::Rejected(JsError::from_value(
                value.get("reason")?.clone(),
            ))),
            _ => None,
        }
    }
}

/// Fulfils with every input's value, in input order.
///
/// Rejects as soon as any input rejects, with that input's reason. An empty
/// input fulfils with an empty list.
pub fn all(scheduler: &Scheduler, cells: impl IntoIterator<Item = PromiseCell>) -> PromiseCell {
    let cells: Vec<PromiseCell> = cells.into_iter().collect();
    let result = scheduler.pending_promise();
    if cells.is_empty() {
        result.resolve(Value::List(Vec::new()));
        return result;
    }

    let values: Rc<RefCell<Vec<Option<Value>>>> = Rc::new(RefCell::new(vec![None; cells.len()]));
    let remaining = Rc::new(Cell::new(cells.len()));
    for (index, cell) in cells.into_iter().enumerate() {
        let (values, remaining, on_ok) = (values.clone(), remaining.clone(), result.clone());
        let on_err = result.clone();
        cell.observe(
            move |value| {
                values.borrow_mut()[index] = Some(value);
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    let list = values
                        .borrow_mut()
                        .drain(..)
                        .map(|v| v.unwrap_or(Value::Undefined))
                        .collect();
                    on_ok.resolve(Value::List(list));
                }
            },
            move |reason| on_err.reject(reason),
        );
    }
    result
}

/// Fulfils once every input settled, with one outcome record per input.
///
/// Never rejects. Each record is `{ status: "fulfilled", value }` or
/// `{ status: "rejected", reason }`; see [`SettledOutcome`].
pub fn all_settled(
    scheduler: &Scheduler,
    cells: impl IntoIterator<Item = PromiseCell>,
) -> PromiseCell {
    let cells: Vec<PromiseCell> = cells.into_iter().collect();
    let result = scheduler.pending_promise();
    if cells.is_empty() {
        result.resolve(Value::List(Vec::new()));
        return result;
    }

    let outcomes: Rc<OutcomeSlots> = Rc::new(RefCell::new(vec![None; cells.len()]));
    let remaining = Rc::new(Cell::new(cells.len()));

    for (index, cell) in cells.into_iter().enumerate() {
        let (ok_outcomes, ok_remaining, ok_result) =
            (outcomes.clone(), remaining.clone(), result.clone());
        let (err_outcomes, err_remaining, err_result) =
            (outcomes.clone(), remaining.clone(), result.clone());
        cell.observe(
            move |value| {
                record_outcome(
                    &ok_outcomes,
                    &ok_remaining,
                    &ok_result,
                    index,
                    SettledOutcome::Fulfilled(value),
                )
            },
            move |reason| {
                record_outcome(
                    &err_outcomes,
                    &err_remaining,
                    &err_result,
                    index,
                    SettledOutcome::Rejected(reason),
                )
            },
        );
    }
    result
}

type OutcomeSlots = RefCell<Vec<Option<SettledOutcome>>>;

fn record_outcome(
    outcomes: &OutcomeSlots,
    remaining: &Cell<usize>,
    result: &PromiseCell,
    index: usize,
    outcome: SettledOutcome,
) {
    outcomes.borrow_mut()[index] = Some(outcome);
    remaining.set(remaining.get() - 1);
    if remaining.get() == 0 {
        let list = outcomes
            .borrow_mut()
            .drain(..)
            .flatten()
            .map(|outcome| outcome.to_value())
            .collect();
        result.resolve(Value::List(list));
    }
}

/// Settles like whichever input settles first.
///
/// An empty input never settles.
pub fn race(scheduler: &Scheduler, cells: impl IntoIterator<Item = PromiseCell>) -> PromiseCell {
    let result = scheduler.pending_promise();
    for cell in cells {
        let (on_ok, on_err) = (result.clone(), result.clone());
        cell.observe(move |value| on_ok.resolve(value), move |reason| on_err.reject(reason));
    }
    result
}

/// Fulfils with the first input to fulfil.
///
/// If every input rejects, rejects with an aggregate error carrying all
/// reasons in input order. An empty input rejects immediately with an
/// aggregate error carrying no reasons.
pub fn any(scheduler: &Scheduler, cells: impl IntoIterator<Item = PromiseCell>) -> PromiseCell {
    let cells: Vec<PromiseCell> = cells.into_iter().collect();
    let result = scheduler.pending_promise();
    if cells.is_empty() {
        result.reject(JsError::aggregate(Vec::new()));
        return result;
    }

    let reasons: Rc<RefCell<Vec<Option<JsError>>>> = Rc::new(RefCell::new(vec![None; cells.len()]));
    let remaining = Rc::new(Cell::new(cells.len()));
    for (index, cell) in cells.into_iter().enumerate() {
        let on_ok = result.clone();
        let (reasons, remaining, on_err) = (reasons.clone(), remaining.clone(), result.clone());
        cell.observe(
            move |value| on_ok.resolve(value),
            move |reason| {
                reasons.borrow_mut()[index] = Some(reason);
                remaining.set(remaining.get() - 1);
                if remaining.get() == 0 {
                    let all: Vec<JsError> = reasons.borrow_mut().drain(..).flatten().collect();
                    on_err.reject(JsError::aggregate(all));
                }
            },
        );
    }
    result
}
