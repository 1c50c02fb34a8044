//! Task and microtask types and the microtask queue.
//!
//! Tasks are macrotasks: they are scheduled through the timer registry and
//! one runs per loop step. Microtasks are drained completely before the next
//! task runs, including microtasks queued while draining.

use core_types::JsResult;
use std::collections::VecDeque;
use std::fmt;

use crate::scheduler::Scheduler;
use crate::timer::TimerCallback;

/// A one-shot macrotask.
///
/// Examples include posted callbacks and work injected from other threads.
pub struct Task {
    callback: Box<dyn FnOnce(&Scheduler) -> JsResult<()>>,
}

impl Task {
    /// Creates a new Task from a closure.
    ///
    /// # Arguments
    ///
    /// * `f` - The function to execute when the task runs
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce(&Scheduler) -> JsResult<()> + 'static,
    {
        Self {
            callback: Box::new(f),
        }
    }

    /// Executes the task.
    pub fn run(self, scheduler: &Scheduler) -> JsResult<()> {
        (self.callback)(scheduler)
    }

    pub(crate) fn into_callback(self) -> TimerCallback {
        let mut slot = Some(self);
        Box::new(move |scheduler| match slot.take() {
            Some(task) => task.run(scheduler),
            None => Ok(()),
        })
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Task {{ ... }}")
    }
}

/// A microtask to be executed by the event loop.
///
/// Promise reactions, thenable jobs and `queue_microtask` callbacks are all
/// microtasks. The label names the source in logs and task error reports.
pub struct MicroTask {
    label: &'static str,
    callback: Box<dyn FnOnce(&Scheduler) -> JsResult<()>>,
}

impl MicroTask {
    /// Creates a new MicroTask from a closure.
    ///
    /// # Arguments
    ///
    /// * `label` - Short description of the microtask's source
    /// * `f` - The function to execute when the microtask runs
    pub fn new<F>(label: &'static str, f: F) -> Self
    where
        F: FnOnce(&Scheduler) -> JsResult<()> + 'static,
    {
        Self {
            label,
            callback: Box::new(f),
        }
    }

    /// Returns the label given at creation.
    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Executes the microtask.
    pub fn run(self, scheduler: &Scheduler) -> JsResult<()> {
        (self.callback)(scheduler)
    }
}

impl fmt::Debug for MicroTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MicroTask {{ label: {:?} }}", self.label)
    }
}

/// A strict FIFO queue for microtasks.
///
/// The queue itself is passive; the scheduler drains it one task at a time
/// so that tasks can enqueue more work while the drain is in progress.
#[derive(Debug, Default)]
pub struct MicrotaskQueue {
    queue: VecDeque<MicroTask>,
}

impl MicrotaskQueue {
    /// Creates a new empty MicrotaskQueue.
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Adds a microtask to the end of the queue.
    pub fn enqueue(&mut self, microtask: MicroTask) {
        self.queue.push_back(microtask);
    }

    /// Removes and returns the next microtask from the queue.
    pub fn dequeue(&mut self) -> Option<MicroTask> {
        self.queue.pop_front()
    }

    /// Returns true if the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Returns the number of microtasks in the queue.
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Drops every queued microtask.
    pub fn clear(&mut self) {
        self.queue.clear();
    }
}
