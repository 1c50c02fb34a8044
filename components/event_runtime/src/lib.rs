//! Deterministic single-threaded event runtime.
//!
//! This crate provides a cooperative scheduler with JavaScript semantics:
//! - Promises with Promise/A+ resolution, thenable adoption and combinators
//! - A microtask queue drained completely between macrotasks
//! - A timer registry with cancellation and drift-free intervals
//! - Resumable coroutines, usable as generators or as async functions
//!
//! # Overview
//!
//! - [`EventLoop`] - Owns the queues and drives them until idle
//! - [`Scheduler`] - Handle passed to every callback; creates promises and timers
//! - [`PromiseCell`] - Single-assignment asynchronous result
//! - [`Coroutine`] - Generator protocol over a [`CoroutineBody`]
//! - [`Debounce`] / [`Throttle`] - Timer-based call coalescing
//!
//! # Examples
//!
//! ## Ordering
//!
//! ```
//! use event_runtime::EventLoop;
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let event_loop = EventLoop::new();
//! let log = Rc::new(RefCell::new(Vec::new()));
//!
//! let l = log.clone();
//! event_loop.run_until_idle(move |scheduler| {
//!     l.borrow_mut().push(1);
//!     let (a, b) = (l.clone(), l.clone());
//!     scheduler.set_timeout(0, move |_| {
//!         a.borrow_mut().push(3);
//!         Ok(())
//!     });
//!     scheduler.resolved(0).and_then(move |v| {
//!         b.borrow_mut().push(2);
//!         Ok(v)
//!     });
//!     Ok(())
//! });
//!
//! assert_eq!(*log.borrow(), vec![1, 2, 3]);
//! ```
//!
//! ## Async functions
//!
//! ```
//! use event_runtime::{EventLoop, Step, Steps};
//! use core_types::Value;
//!
//! let event_loop = EventLoop::new();
//! let scheduler = event_loop.scheduler();
//!
//! let nap = scheduler.sleep(500);
//! let result = scheduler.spawn_async(
//!     Steps::new()
//!         .step(move |_| Ok(Step::Yield(nap.clone().into())))
//!         .step(|_| Ok(Step::Return(Value::from("done")))),
//! );
//!
//! let report = event_loop.run_until_idle(|_| Ok(()));
//! assert_eq!(result.value(), Some(Value::from("done")));
//! assert_eq!(report.elapsed_ms, 500);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod clock;
pub mod combinators;
pub mod config;
pub mod coroutine;
pub mod event_loop;
pub mod promise;
pub mod remote;
pub mod scheduler;
pub mod task_queue;
pub mod timer;
pub mod timing;

// Re-export main types at crate root
pub use clock::Clock;
pub use combinators::SettledOutcome;
pub use config::{ClockMode, ConfigError, LoopConfig};
pub use coroutine::{
    Coroutine, CoroutineBody, CoroutineIter, CoroutineState, IteratorResult, Resume, Step, Steps,
};
pub use event_loop::{EventLoop, RunReport};
pub use promise::{
    FulfillHandler, PromiseCell, PromiseReaction, PromiseState, Reject, RejectHandler, Resolve,
};
pub use remote::{RemoteHandle, RemoteTask};
pub use scheduler::Scheduler;
pub use task_queue::{MicroTask, MicrotaskQueue, Task};
pub use timer::{MAX_TIMER_DELAY_MS, Timer, TimerCallback, TimerId, TimerRegistry};
pub use timing::{Debounce, Throttle};
