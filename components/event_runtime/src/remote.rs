//! Posting work to an event loop from other threads.
//!
//! The loop itself is single-threaded. Other threads hold a [`RemoteHandle`]
//! and push boxed tasks onto one mutex-protected queue; the loop moves them
//! into its macrotask tier between steps.

use core_types::JsResult;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::scheduler::Scheduler;

/// A task posted from another thread.
pub type RemoteTask = Box<dyn FnOnce(&Scheduler) -> JsResult<()> + Send>;

struct RemoteState {
    tasks: VecDeque<RemoteTask>,
    handles: usize,
}

pub(crate) struct RemoteQueue {
    state: Mutex<RemoteState>,
    signal: Condvar,
}

impl RemoteQueue {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(RemoteState {
                tasks: VecDeque::new(),
                handles: 0,
            }),
            signal: Condvar::new(),
        }
    }

    fn push(&self, task: RemoteTask) {
        self.state.lock().tasks.push_back(task);
        self.signal.notify_one();
    }

    pub(crate) fn take_all(&self) -> VecDeque<RemoteTask> {
        std::mem::take(&mut self.state.lock().tasks)
    }

    pub(crate) fn has_handles(&self) -> bool {
        self.state.lock().handles > 0
    }

    /// Blocks until a task is posted, the last handle is dropped, or
    /// `timeout` elapses.
    pub(crate) fn wait(&self, timeout: Duration) {
        let mut state = self.state.lock();
        if state.tasks.is_empty() {
            self.signal.wait_for(&mut state, timeout);
        }
    }

    /// Waits for posted work while any handle is alive.
    ///
    /// Returns false once no handle is alive and nothing is queued.
    pub(crate) fn wait_for_work(&self) -> bool {
        let mut state = self.state.lock();
        if !state.tasks.is_empty() {
            return true;
        }
        if state.handles == 0 {
            return false;
        }
        self.signal.wait(&mut state);
        true
    }

    fn register(&self) {
        self.state.lock().handles += 1;
    }

    fn unregister(&self) {
        let mut state = self.state.lock();
        state.handles = state.handles.saturating_sub(1);
        drop(state);
        self.signal.notify_all();
    }
}

/// A `Send + Sync` handle for posting tasks to an event loop.
///
/// While any handle is alive the loop waits for posted work instead of
/// returning from `run_until_idle`.
///
/// # Examples
///
/// ```
/// use event_runtime::EventLoop;
///
/// let event_loop = EventLoop::new();
/// let handle = event_loop.remote_handle();
/// let worker = std::thread::spawn(move || {
///     handle.post(|_| Ok(()));
/// });
///
/// let report = event_loop.run_until_idle(|_| Ok(()));
/// worker.join().unwrap();
/// assert_eq!(report.macrotasks_run, 1);
/// ```
pub struct RemoteHandle {
    queue: Arc<RemoteQueue>,
}

impl RemoteHandle {
    pub(crate) fn new(queue: Arc<RemoteQueue>) -> Self {
        queue.register();
        Self { queue }
    }

    /// Posts a task to run as a macrotask on the loop thread.
    pub fn post<F>(&self, task: F)
    where
        F: FnOnce(&Scheduler) -> JsResult<()> + Send + 'static,
    {
        self.queue.push(Box::new(task));
    }
}

impl Clone for RemoteHandle {
    fn clone(&self) -> Self {
        Self::new(self.queue.clone())
    }
}

impl Drop for RemoteHandle {
    fn drop(&mut self) {
        self.queue.unregister();
    }
}

impl fmt::Debug for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteHandle").finish_non_exhaustive()
    }
}
