//! Scheduling Scenario Tests
//!
//! Whole programs run through EventLoop::run_until_idle, checking the
//! observable order of synchronous code, microtasks and timers.

use core_types::{JsError, Value};
use event_runtime::{EventLoop, Resume, Scheduler, Step, Steps};
use std::cell::RefCell;
use std::rc::Rc;

type Trace = Rc<RefCell<Vec<String>>>;

fn new_trace() -> Trace {
    Rc::new(RefCell::new(Vec::new()))
}

fn note(trace: &Trace, scheduler: &Scheduler, what: &str) {
    trace
        .borrow_mut()
        .push(format!("{}@{}", what, scheduler.now()));
}

#[test]
fn each_timer_owns_its_loop_snapshot() {
    let event_loop = EventLoop::new();
    let seen = Rc::new(RefCell::new(Vec::new()));

    let s = seen.clone();
    event_loop.run_until_idle(move |scheduler| {
        for i in 0..3 {
            let s = s.clone();
            scheduler.set_timeout(0, move |_| {
                s.borrow_mut().push(i);
                Ok(())
            });
        }
        Ok(())
    });

    assert_eq!(*seen.borrow(), vec![0, 1, 2]);
}

#[test]
fn microtask_from_timer_runs_before_sibling_timer() {
    let event_loop = EventLoop::new();
    let trace = new_trace();

    let t = trace.clone();
    event_loop.run_until_idle(move |scheduler| {
        let (a, b) = (t.clone(), t.clone());
        scheduler.set_timeout(10, move |scheduler| {
            note(&a, scheduler, "timer A");
            let m = a.clone();
            scheduler.queue_microtask(move |scheduler| {
                note(&m, scheduler, "micro from A");
                Ok(())
            });
            Ok(())
        });
        scheduler.set_timeout(10, move |scheduler| {
            note(&b, scheduler, "timer B");
            Ok(())
        });
        Ok(())
    });

    assert_eq!(
        *trace.borrow(),
        vec!["timer A@10", "micro from A@10", "timer B@10"]
    );
}

#[test]
fn interleaved_async_functions() {
    let event_loop = EventLoop::new();
    let trace = new_trace();

    let t = trace.clone();
    event_loop.run_until_idle(move |scheduler| {
        for (name, pause) in [("fast", 10u64), ("slow", 25u64)] {
            let (t1, t2, t3) = (t.clone(), t.clone(), t.clone());
            let (s1, s2) = (scheduler.clone(), scheduler.clone());
            let (s3, s4) = (scheduler.clone(), scheduler.clone());
            scheduler.spawn_async(
                Steps::new()
                    .step(move |_| {
                        note(&t1, &s1, &format!("{name} start"));
                        Ok(Step::Yield(s2.sleep(pause).into()))
                    })
                    .step(move |_| {
                        note(&t2, &s3, &format!("{name} middle"));
                        Ok(Step::Yield(s4.sleep(pause).into()))
                    })
                    .step(move |_| {
                        let now = t3.borrow().len();
                        t3.borrow_mut().push(format!("{name} end #{now}"));
                        Ok(Step::Return(Value::Undefined))
                    }),
            );
        }
        Ok(())
    });

    assert_eq!(
        *trace.borrow(),
        vec![
            "fast start@0",
            "slow start@0",
            "fast middle@10",
            "fast end #3",
            "slow middle@25",
            "slow end #5",
        ]
    );
}

#[test]
fn await_inside_timer_callback() {
    let event_loop = EventLoop::new();
    let trace = new_trace();

    let t = trace.clone();
    event_loop.run_until_idle(move |scheduler| {
        let outer = t.clone();
        scheduler.set_timeout(5, move |scheduler| {
            note(&outer, scheduler, "timer");
            let inner = outer.clone();
            let s = scheduler.clone();
            scheduler.spawn_async(move |input: Resume| match input {
                Resume::Start => Ok(Step::Yield(s.resolved("value").into())),
                Resume::Next(v) => {
                    inner.borrow_mut().push(format!("awaited {v}"));
                    Ok(Step::Return(v))
                }
                Resume::Throw(e) => Err(e),
            });
            note(&outer, scheduler, "timer end");
            Ok(())
        });
        let later = t.clone();
        scheduler.set_timeout(5, move |scheduler| {
            note(&later, scheduler, "second timer");
            Ok(())
        });
        Ok(())
    });

    assert_eq!(
        *trace.borrow(),
        vec!["timer@5", "timer end@5", "awaited value", "second timer@5"]
    );
}

#[test]
fn failures_are_isolated_per_task() {
    let event_loop = EventLoop::new();
    let trace = new_trace();

    let t = trace.clone();
    let report = event_loop.run_until_idle(move |scheduler| {
        for n in 0..4 {
            let t = t.clone();
            scheduler.set_timeout(10 * (n + 1), move |scheduler| {
                if n % 2 == 0 {
                    return Err(JsError::thrown(format!("task {n} failed")));
                }
                note(&t, scheduler, &format!("task {n}"));
                Ok(())
            });
        }
        Ok(())
    });

    assert_eq!(*trace.borrow(), vec!["task 1@20", "task 3@40"]);
    assert_eq!(report.task_errors.len(), 2);
    assert_eq!(report.macrotasks_run, 4);
}
