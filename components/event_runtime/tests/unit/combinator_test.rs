//! Unit tests for all, all_settled, race and any

use core_types::{ErrorKind, JsError, Value};
use event_runtime::{EventLoop, PromiseCell, Scheduler, SettledOutcome};

fn after(scheduler: &Scheduler, ms: u64, value: impl Into<Value>) -> PromiseCell {
    let value = value.into();
    scheduler.sleep(ms).and_then(move |_| Ok(value))
}

fn fail_after(scheduler: &Scheduler, ms: u64, message: &'static str) -> PromiseCell {
    scheduler
        .sleep(ms)
        .and_then(move |_| Err(JsError::thrown(message)))
}

#[test]
fn all_keeps_input_order() {
    let event_loop = EventLoop::new();
    let scheduler = event_loop.scheduler();
    let result = scheduler.all([
        scheduler.resolved(1),
        after(&scheduler, 30, 2),
        after(&scheduler, 10, 3),
    ]);

    event_loop.run_until_idle(|_| Ok(()));
    assert_eq!(
        result.value(),
        Some(Value::List(vec![Value::Smi(1), Value::Smi(2), Value::Smi(3)]))
    );
}

#[test]
fn all_rejects_with_first_rejection() {
    let event_loop = EventLoop::new();
    let scheduler = event_loop.scheduler();
    let result = scheduler.all([
        after(&scheduler, 10, 1),
        fail_after(&scheduler, 20, "second failed"),
        fail_after(&scheduler, 30, "third failed"),
    ]);
    let observed = result.catch(|e| Ok(e.into_value()));

    let report = event_loop.run_until_idle(|_| Ok(()));
    assert_eq!(result.reason(), Some(JsError::thrown("second failed")));
    assert_eq!(observed.value(), Some(Value::from("second failed")));
    assert!(report.unhandled_rejections.is_empty());
}

#[test]
fn all_settled_reports_every_outcome() {
    let event_loop = EventLoop::new();
    let scheduler = event_loop.scheduler();
    let result = scheduler.all_settled([
        scheduler.resolved("ok"),
        scheduler.rejected(JsError::thrown("bad")),
    ]);

    let report = event_loop.run_until_idle(|_| Ok(()));
    let records = result.value().expect("fulfilled");
    let outcomes: Vec<SettledOutcome> = records
        .as_list()
        .expect("list")
        .iter()
        .filter_map(SettledOutcome::from_value)
        .collect();

    assert_eq!(
        outcomes,
        vec![
            SettledOutcome::Fulfilled(Value::from("ok")),
            SettledOutcome::Rejected(JsError::thrown("bad")),
        ]
    );
    assert!(report.unhandled_rejections.is_empty());
}

#[test]
fn race_settles_with_fastest() {
    let event_loop = EventLoop::new();
    let scheduler = event_loop.scheduler();
    let result = scheduler.race([
        after(&scheduler, 1000, "second"),
        after(&scheduler, 500, "first"),
    ]);

    let report = event_loop.run_until_idle(|_| Ok(()));
    assert_eq!(result.value(), Some(Value::from("first")));
    assert_eq!(report.elapsed_ms, 1000);
}

#[test]
fn race_can_reject() {
    let event_loop = EventLoop::new();
    let scheduler = event_loop.scheduler();
    let result = scheduler.race([
        after(&scheduler, 100, "slow"),
        fail_after(&scheduler, 50, "timeout"),
    ]);
    result.catch(|_| Ok(Value::Undefined));

    event_loop.run_until_idle(|_| Ok(()));
    assert_eq!(result.reason(), Some(JsError::thrown("timeout")));
}

#[test]
fn any_fulfils_with_first_success() {
    let event_loop = EventLoop::new();
    let scheduler = event_loop.scheduler();
    let result = scheduler.any([
        fail_after(&scheduler, 10, "a"),
        after(&scheduler, 30, "b"),
        after(&scheduler, 20, "c"),
    ]);

    let report = event_loop.run_until_idle(|_| Ok(()));
    assert_eq!(result.value(), Some(Value::from("c")));
    assert!(report.unhandled_rejections.is_empty());
}

#[test]
fn any_aggregates_reasons_in_input_order() {
    let event_loop = EventLoop::new();
    let scheduler = event_loop.scheduler();
    let result = scheduler.any([
        fail_after(&scheduler, 30, "first"),
        fail_after(&scheduler, 10, "second"),
        fail_after(&scheduler, 20, "third"),
    ]);
    result.catch(|_| Ok(Value::Undefined));

    event_loop.run_until_idle(|_| Ok(()));
    let reason = result.reason().expect("rejected");
    assert_eq!(reason.kind, ErrorKind::AggregateFailure);
    assert_eq!(
        reason.errors,
        vec![
            JsError::thrown("first"),
            JsError::thrown("second"),
            JsError::thrown("third"),
        ]
    );
}

#[test]
fn all_of_already_resolved_values() {
    let event_loop = EventLoop::new();
    let scheduler = event_loop.scheduler();
    let inputs: Vec<PromiseCell> = (1..=3).map(|n| scheduler.resolved(n * 10)).collect();
    let result = scheduler.all(inputs);

    event_loop.run_microtasks();
    assert_eq!(
        result.value(),
        Some(Value::List(vec![Value::Smi(10), Value::Smi(20), Value::Smi(30)]))
    );
}

#[test]
fn all_and_all_settled_on_mixed_inputs() {
    let event_loop = EventLoop::new();
    let scheduler = event_loop.scheduler();
    let inputs = || {
        [
            scheduler.resolved("a"),
            scheduler.rejected(JsError::thrown("x")),
            scheduler.resolved("b"),
        ]
    };
    let all = scheduler.all(inputs());
    all.catch(|_| Ok(Value::Undefined));
    let settled = scheduler.all_settled(inputs());

    event_loop.run_until_idle(|_| Ok(()));
    assert_eq!(all.reason(), Some(JsError::thrown("x")));
    assert_eq!(
        settled.value(),
        Some(Value::List(vec![
            SettledOutcome::Fulfilled(Value::from("a")).to_value(),
            SettledOutcome::Rejected(JsError::thrown("x")).to_value(),
            SettledOutcome::Fulfilled(Value::from("b")).to_value(),
        ]))
    );
}

#[test]
fn any_skips_rejections() {
    let event_loop = EventLoop::new();
    let scheduler = event_loop.scheduler();
    let result = scheduler.any([
        scheduler.rejected(JsError::thrown("e1")),
        scheduler.resolved("ok"),
        scheduler.rejected(JsError::thrown("e2")),
    ]);

    let report = event_loop.run_until_idle(|_| Ok(()));
    assert_eq!(result.value(), Some(Value::from("ok")));
    assert!(report.unhandled_rejections.is_empty());
}
