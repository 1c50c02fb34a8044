//! Event loop configuration.

use serde::{Deserialize, Serialize};

/// How the loop measures time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// Simulated time; the loop jumps straight to the next timer.
    #[default]
    Virtual,
    /// Real time; the loop sleeps until the next timer is due.
    WallClock,
}

/// Errors raised while loading a [`LoopConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The JSON document could not be parsed
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    /// A field holds an unusable value
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Configuration for an [`EventLoop`](crate::EventLoop).
///
/// # Examples
///
/// ```
/// use event_runtime::{ClockMode, LoopConfig};
///
/// let config = LoopConfig::new()
///     .with_clock(ClockMode::WallClock)
///     .with_min_timer_delay(4);
/// assert_eq!(config.min_timer_delay_ms, 4);
///
/// let parsed = LoopConfig::from_json(r#"{ "clock": "wall_clock" }"#).unwrap();
/// assert_eq!(parsed.clock, ClockMode::WallClock);
/// assert_eq!(parsed.min_timer_delay_ms, 1);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopConfig {
    /// Clock used by `run_until_idle`
    pub clock: ClockMode,
    /// Smallest delay a timer can be scheduled with, in milliseconds
    pub min_timer_delay_ms: u64,
    /// Whether rejections nobody handles are reported
    pub track_unhandled_rejections: bool,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            clock: ClockMode::Virtual,
            min_timer_delay_ms: 1,
            track_unhandled_rejections: true,
        }
    }
}

impl LoopConfig {
    /// Creates the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the clock mode.
    pub fn with_clock(mut self, clock: ClockMode) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the minimum timer delay. Zero is raised to one millisecond.
    pub fn with_min_timer_delay(mut self, delay_ms: u64) -> Self {
        self.min_timer_delay_ms = delay_ms.max(1);
        self
    }

    /// Enables or disables unhandled rejection reports.
    pub fn with_unhandled_rejection_tracking(mut self, enabled: bool) -> Self {
        self.track_unhandled_rejections = enabled;
        self
    }

    /// Parses and validates a JSON configuration document.
    ///
    /// Missing fields take their default values.
    pub fn from_json(source: &str) -> Result<Self, ConfigError> {
        let config: LoopConfig = serde_json::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks that every field holds a usable value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_timer_delay_ms == 0 {
            return Err(ConfigError::Invalid(
                "min_timer_delay_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
