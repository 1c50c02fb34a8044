//! Timer registry.
//!
//! Timers are kept in a min-heap ordered by fire time, with ties broken by
//! insertion sequence. Cancellation is lazy: heap entries whose timer is gone
//! or was re-armed are skipped when they surface.

use core_types::JsResult;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::fmt;

use crate::scheduler::Scheduler;

/// Longest delay a timer accepts, in milliseconds. Longer delays are capped.
pub const MAX_TIMER_DELAY_MS: u64 = i32::MAX as u64;

/// Callback run when a timer fires.
pub type TimerCallback = Box<dyn FnMut(&Scheduler) -> JsResult<()>>;

/// Handle returned when scheduling a timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

impl TimerId {
    /// Returns the raw id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A timer taken out of the registry to be run.
///
/// Hand it back with [`TimerRegistry::complete`] once the callback returned,
/// so repeating timers can be re-armed.
pub struct Timer {
    /// The timer's id
    pub id: TimerId,
    /// When the timer was due
    pub fire_at: u64,
    /// Period of a repeating timer
    pub repeat_interval: Option<u64>,
    callback: TimerCallback,
}

impl Timer {
    /// Runs the callback.
    pub fn run(&mut self, scheduler: &Scheduler) -> JsResult<()> {
        (self.callback)(scheduler)
    }
}

impl fmt::Debug for Timer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Timer")
            .field("id", &self.id)
            .field("fire_at", &self.fire_at)
            .field("repeat_interval", &self.repeat_interval)
            .finish()
    }
}

struct TimerEntry {
    fire_at: u64,
    seq: u64,
    repeat_interval: Option<u64>,
    cancelled: bool,
    running: bool,
    callback: Option<TimerCallback>,
}

/// Min-heap of scheduled callbacks.
///
/// # Examples
///
/// ```
/// use event_runtime::TimerRegistry;
///
/// let mut timers = TimerRegistry::new(1);
/// let late = timers.schedule(0, 10, Box::new(|_| Ok(())), false);
/// let early = timers.schedule(0, 5, Box::new(|_| Ok(())), false);
///
/// assert!(timers.pop_ready(4).is_none());
/// let timer = timers.pop_ready(10).unwrap();
/// assert_eq!(timer.id, early);
/// timers.complete(timer);
/// assert_eq!(timers.pop_ready(10).map(|t| t.id), Some(late));
/// ```
pub struct TimerRegistry {
    heap: BinaryHeap<Reverse<(u64, u64, TimerId)>>,
    entries: HashMap<TimerId, TimerEntry>,
    min_delay_ms: u64,
    next_id: u64,
    next_seq: u64,
}

impl TimerRegistry {
    /// Creates an empty registry. Delays below `min_delay_ms` are raised to it.
    pub fn new(min_delay_ms: u64) -> Self {
        Self {
            heap: BinaryHeap::new(),
            entries: HashMap::new(),
            min_delay_ms: min_delay_ms.max(1),
            next_id: 1,
            next_seq: 0,
        }
    }

    /// Schedules `callback` to fire `delay_ms` after `now`.
    ///
    /// A zero delay is clamped to the minimum delay so that microtasks queued
    /// before the timer still run first, and a delay above
    /// [`MAX_TIMER_DELAY_MS`] is capped to it. A repeating timer re-fires every
    /// `delay_ms` (clamped the same way) until cancelled.
    pub fn schedule(
        &mut self,
        now: u64,
        delay_ms: u64,
        callback: TimerCallback,
        repeat: bool,
    ) -> TimerId {
        let delay = delay_ms.max(self.min_delay_ms).min(MAX_TIMER_DELAY_MS);
        let repeat_interval = if repeat { Some(delay) } else { None };
        self.insert(now.saturating_add(delay), repeat_interval, callback)
    }

    /// Schedules a one-shot callback at an exact time, without clamping.
    pub fn schedule_at(&mut self, fire_at: u64, callback: TimerCallback) -> TimerId {
        self.insert(fire_at, None, callback)
    }

    fn insert(
        &mut self,
        fire_at: u64,
        repeat_interval: Option<u64>,
        callback: TimerCallback,
    ) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;
        let seq = self.bump_seq();
        self.entries.insert(
            id,
            TimerEntry {
                fire_at,
                seq,
                repeat_interval,
                cancelled: false,
                running: false,
                callback: Some(callback),
            },
        );
        self.heap.push(Reverse((fire_at, seq, id)));
        id
    }

    fn bump_seq(&mut self) -> u64 {
        let seq = self.next_seq;
        self.next_seq += 1;
        seq
    }

    /// Cancels a timer.
    ///
    /// Cancelling an unknown, fired or already cancelled timer is a no-op.
    /// A timer cancelled from inside its own callback finishes the current
    /// run and never fires again. Returns whether a live timer was cancelled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let Some(entry) = self.entries.get_mut(&id) else {
            return false;
        };
        if entry.cancelled {
            return false;
        }
        entry.cancelled = true;
        entry.callback = None;
        if !entry.running {
            self.entries.remove(&id);
        }
        true
    }

    /// Takes the earliest live timer due at or before `now`.
    pub fn pop_ready(&mut self, now: u64) -> Option<Timer> {
        let (fire_at, id) = self.peek_live()?;
        if fire_at > now {
            return None;
        }
        self.heap.pop();
        let entry = self.entries.get_mut(&id)?;
        let callback = entry.callback.take()?;
        entry.running = true;
        Some(Timer {
            id,
            fire_at,
            repeat_interval: entry.repeat_interval,
            callback,
        })
    }

    /// Returns a timer after its callback ran.
    ///
    /// Repeating timers are re-armed at `fire_at + interval`, measured from
    /// when they were due rather than when they ran, so latency does not
    /// accumulate as drift.
    pub fn complete(&mut self, timer: Timer) {
        let seq = self.bump_seq();
        let Some(entry) = self.entries.get_mut(&timer.id) else {
            return;
        };
        entry.running = false;
        match (entry.cancelled, timer.repeat_interval) {
            (false, Some(interval)) => {
                entry.fire_at = timer.fire_at.saturating_add(interval);
                entry.seq = seq;
                entry.callback = Some(timer.callback);
                self.heap.push(Reverse((entry.fire_at, seq, timer.id)));
            }
            _ => {
                self.entries.remove(&timer.id);
            }
        }
    }

    /// Returns when the next live timer is due.
    pub fn next_fire_at(&mut self) -> Option<u64> {
        self.peek_live().map(|(fire_at, _)| fire_at)
    }

    fn peek_live(&mut self) -> Option<(u64, TimerId)> {
        while let Some(&Reverse((fire_at, seq, id))) = self.heap.peek() {
            let live = matches!(
                self.entries.get(&id),
                Some(entry) if entry.seq == seq && !entry.cancelled && entry.callback.is_some()
            );
            if live {
                return Some((fire_at, id));
            }
            self.heap.pop();
        }
        None
    }

    /// Returns true if any timer is scheduled or running.
    pub fn has_pending(&self) -> bool {
        !self.entries.is_empty()
    }

    /// Returns the number of scheduled or running timers.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no timer is scheduled or running.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drops every timer.
    pub fn clear(&mut self) {
        self.heap.clear();
        self.entries.clear();
    }
}

impl fmt::Debug for TimerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimerRegistry")
            .field("pending", &self.entries.len())
            .field("min_delay_ms", &self.min_delay_ms)
            .finish()
    }
}
