//! Virtual and wall clocks.

use std::time::Instant;

use crate::config::ClockMode;

/// Millisecond clock shared by the scheduler and its timers.
///
/// Switching modes keeps the current reading, so time never jumps backwards.
#[derive(Debug)]
pub struct Clock {
    mode: ClockMode,
    virtual_now: u64,
    origin: Instant,
    base: u64,
}

impl Clock {
    /// Creates a clock reading zero.
    pub fn new(mode: ClockMode) -> Self {
        Self {
            mode,
            virtual_now: 0,
            origin: Instant::now(),
            base: 0,
        }
    }

    /// Returns the active mode.
    pub fn mode(&self) -> ClockMode {
        self.mode
    }

    /// Returns the current time in milliseconds.
    pub fn now(&self) -> u64 {
        match self.mode {
            ClockMode::Virtual => self.virtual_now,
            ClockMode::WallClock => self.base + self.origin.elapsed().as_millis() as u64,
        }
    }

    /// Switches mode, returning the previous one.
    pub fn set_mode(&mut self, mode: ClockMode) -> ClockMode {
        let now = self.now();
        let previous = self.mode;
        self.mode = mode;
        self.virtual_now = now;
        self.base = now;
        self.origin = Instant::now();
        previous
    }

    /// Moves virtual time forward to `time`. Never moves backwards.
    ///
    /// Has no effect on a wall clock.
    pub fn advance_to(&mut self, time: u64) {
        if self.mode == ClockMode::Virtual && time > self.virtual_now {
            self.virtual_now = time;
        }
    }
}
