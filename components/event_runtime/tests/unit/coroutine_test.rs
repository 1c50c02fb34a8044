//! Unit tests for Coroutine and async functions

use core_types::{ErrorKind, JsError, Value};
use event_runtime::{
    Coroutine, CoroutineState, EventLoop, IteratorResult, Resume, Step, Steps,
};
use std::cell::RefCell;
use std::rc::Rc;

fn letters() -> Coroutine {
    Coroutine::start(
        Steps::new()
            .step(|_| Ok(Step::Yield(Value::from("A"))))
            .step(|_| Ok(Step::Yield(Value::from("B"))))
            .step(|_| Ok(Step::Return(Value::from("C")))),
    )
}

#[test]
fn generator_yields_then_returns() {
    let g = letters();
    let results: Vec<IteratorResult> = (0..5)
        .map(|_| g.next(Value::Undefined).expect("no error"))
        .collect();

    assert_eq!(
        results,
        vec![
            IteratorResult::value(Value::from("A")),
            IteratorResult::value(Value::from("B")),
            IteratorResult::done_with_value(Value::from("C")),
            IteratorResult::done(),
            IteratorResult::done(),
        ]
    );
}

#[test]
fn throw_can_be_caught_by_body() {
    let g = Coroutine::start(
        Steps::new()
            .step(|_| Ok(Step::Yield(Value::from("waiting"))))
            .step_catching(|input| match input {
                Resume::Throw(e) => Ok(Step::Yield(Value::from(format!("caught {}", e.message)))),
                _ => Ok(Step::Return(Value::Undefined)),
            })
            .step(|_| Ok(Step::Return(Value::from("finished")))),
    );

    g.next(Value::Undefined).unwrap();
    let caught = g.throw(JsError::thrown("oops")).unwrap();
    assert_eq!(caught, IteratorResult::value(Value::from("caught oops")));
    assert_eq!(g.state(), CoroutineState::Suspended);
    assert_eq!(
        g.next(Value::Undefined).unwrap(),
        IteratorResult::done_with_value(Value::from("finished"))
    );
}

#[test]
fn uncaught_throw_finishes_coroutine() {
    let g = letters();
    g.next(Value::Undefined).unwrap();
    let err = g.throw(JsError::thrown("stop")).unwrap_err();
    assert_eq!(err, JsError::thrown("stop"));
    assert_eq!(g.state(), CoroutineState::Done);
    assert_eq!(g.next(Value::Undefined).unwrap(), IteratorResult::done());
}

#[test]
fn throw_before_start_finishes_without_running() {
    let ran = Rc::new(RefCell::new(false));
    let r = ran.clone();
    let g = Coroutine::start(move |_input: Resume| {
        *r.borrow_mut() = true;
        Ok(Step::Return(Value::Undefined))
    });

    assert!(g.throw(JsError::thrown("early")).is_err());
    assert_eq!(g.state(), CoroutineState::Done);
    assert!(!*ran.borrow());
}

#[test]
fn throw_after_done_returns_error() {
    let g = letters();
    for _ in 0..3 {
        g.next(Value::Undefined).unwrap();
    }
    assert_eq!(g.throw(JsError::thrown("late")), Err(JsError::thrown("late")));
}

#[test]
fn body_error_propagates_to_next() {
    let g = Coroutine::start(
        Steps::new()
            .step(|_| Ok(Step::Yield(Value::Smi(1))))
            .step(|_| Err(JsError::type_error("bad step"))),
    );
    g.next(Value::Undefined).unwrap();
    let err = g.next(Value::Undefined).unwrap_err();
    assert_eq!(err.kind, ErrorKind::TypeError);
    assert_eq!(g.state(), CoroutineState::Done);
}

#[test]
fn return_value_finishes_and_runs_close() {
    let closed = Rc::new(RefCell::new(0));
    let c = closed.clone();
    let g = Coroutine::start(
        Steps::new()
            .step(|_| Ok(Step::Yield(Value::Smi(1))))
            .step(|_| Ok(Step::Yield(Value::Smi(2))))
            .on_close(move || *c.borrow_mut() += 1),
    );

    g.next(Value::Undefined).unwrap();
    let result = g.return_value(Value::from("early")).unwrap();
    assert_eq!(result, IteratorResult::done_with_value(Value::from("early")));
    assert_eq!(g.state(), CoroutineState::Done);
    assert_eq!(*closed.borrow(), 1);

    g.return_value(Value::Undefined).unwrap();
    assert_eq!(*closed.borrow(), 1);
    assert_eq!(g.next(Value::Undefined).unwrap(), IteratorResult::done());
}

#[test]
fn return_before_start_skips_close() {
    let closed = Rc::new(RefCell::new(false));
    let c = closed.clone();
    let g = Coroutine::start(Steps::new().on_close(move || *c.borrow_mut() = true));
    g.return_value(Value::Undefined).unwrap();
    assert!(!*closed.borrow());
}

#[test]
fn iter_collects_yields() {
    let values: Vec<Value> = letters()
        .iter()
        .collect::<Result<_, _>>()
        .expect("no error");
    assert_eq!(values, vec![Value::from("A"), Value::from("B")]);
}

#[test]
fn breaking_out_of_iteration_closes_coroutine() {
    let closed = Rc::new(RefCell::new(false));
    let c = closed.clone();
    let g = Coroutine::start(
        Steps::new()
            .step(|_| Ok(Step::Yield(Value::Smi(1))))
            .step(|_| Ok(Step::Yield(Value::Smi(2))))
            .step(|_| Ok(Step::Yield(Value::Smi(3))))
            .on_close(move || *c.borrow_mut() = true),
    );

    for value in g.iter() {
        if value.expect("no error") == Value::Smi(1) {
            break;
        }
    }

    assert!(*closed.borrow());
    assert_eq!(g.state(), CoroutineState::Done);
}

#[test]
fn iter_yields_error_once() {
    let g = Coroutine::start(
        Steps::new()
            .step(|_| Ok(Step::Yield(Value::Smi(1))))
            .step(|_| Err(JsError::thrown("broken"))),
    );
    let items: Vec<_> = g.iter().collect();
    assert_eq!(items, vec![Ok(Value::Smi(1)), Err(JsError::thrown("broken"))]);
}

#[test]
fn async_function_awaits_in_order() {
    let event_loop = EventLoop::new();
    let log = Rc::new(RefCell::new(Vec::new()));

    let l = log.clone();
    let result = Rc::new(RefCell::new(None));
    let r = result.clone();
    event_loop.run_until_idle(move |scheduler| {
        let (a, b) = (l.clone(), l.clone());
        let first = scheduler.sleep(100).and_then(|_| Ok(Value::Smi(1)));
        let second = scheduler.sleep(50).and_then(|_| Ok(Value::Smi(2)));
        let done = scheduler.spawn_async(
            Steps::new()
                .step(move |_| Ok(Step::Yield(first.clone().into())))
                .step(move |v| {
                    a.borrow_mut().push(v);
                    Ok(Step::Yield(second.clone().into()))
                })
                .step(move |v| {
                    b.borrow_mut().push(v);
                    Ok(Step::Return(Value::from("done")))
                }),
        );
        *r.borrow_mut() = Some(done);
        l.borrow_mut().push(Value::from("sync"));
        Ok(())
    });

    assert_eq!(
        *log.borrow(),
        vec![Value::from("sync"), Value::Smi(1), Value::Smi(2)]
    );
    let done = result.borrow().clone().expect("spawned");
    assert_eq!(done.value(), Some(Value::from("done")));
}

#[test]
fn async_function_receives_rejections_as_throws() {
    let event_loop = EventLoop::new();
    let scheduler = event_loop.scheduler();
    let failing = scheduler.rejected(JsError::thrown("network down"));
    let result = scheduler.spawn_async(
        Steps::new()
            .step(move |_| Ok(Step::Yield(failing.clone().into())))
            .step_catching(|input| match input {
                Resume::Throw(e) => {
                    Ok(Step::Return(Value::from(format!("recovered: {}", e.message))))
                }
                Resume::Next(v) => Ok(Step::Return(v)),
                Resume::Start => Ok(Step::Return(Value::Undefined)),
            }),
    );

    let report = event_loop.run_until_idle(|_| Ok(()));
    assert_eq!(result.value(), Some(Value::from("recovered: network down")));
    assert!(report.unhandled_rejections.is_empty());
}

#[test]
fn async_function_uncaught_error_rejects_result() {
    let event_loop = EventLoop::new();
    let scheduler = event_loop.scheduler();
    let result = scheduler.spawn_async(|input: Resume| match input {
        Resume::Start => Ok(Step::Yield(Value::Smi(1))),
        _ => Err(JsError::range_error("out of range")),
    });
    result.catch(|_| Ok(Value::Undefined));
    event_loop.run_until_idle(|_| Ok(()));
    assert_eq!(result.reason().map(|e| e.kind), Some(ErrorKind::RangeError));
}

#[test]
fn async_function_runs_synchronously_until_first_await() {
    let event_loop = EventLoop::new();
    let scheduler = event_loop.scheduler();
    let started = Rc::new(RefCell::new(false));
    let s = started.clone();
    let result = scheduler.spawn_async(move |_input: Resume| {
        *s.borrow_mut() = true;
        Ok(Step::Return(Value::Smi(7)))
    });
    assert!(*started.borrow());
    assert_eq!(result.value(), Some(Value::Smi(7)));
}

#[test]
fn long_await_chain_does_not_grow_the_stack() {
    const AWAITS: i32 = 100_000;
    let event_loop = EventLoop::new();
    let scheduler = event_loop.scheduler();

    let mut count = 0;
    let result = scheduler.spawn_async(move |input: Resume| {
        if let Resume::Next(Value::Smi(n)) = input {
            count = n;
        }
        if count >= AWAITS {
            Ok(Step::Return(Value::Smi(count)))
        } else {
            Ok(Step::Yield(Value::Smi(count + 1)))
        }
    });

    let report = event_loop.run_until_idle(|_| Ok(()));
    assert_eq!(result.value(), Some(Value::Smi(AWAITS)));
    assert!(report.microtasks_run >= AWAITS as usize);
}
