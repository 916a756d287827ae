//! Fixed-interval flush timer.
//!
//! The engine runs on a single event loop, so the timer does not own a thread
//! or a callback registration: the loop passes the current `Instant` to
//! [`Throttle::poll`], which reports when the armed deadline has passed.

use std::time::{Duration, Instant};

use crate::config::ConfigError;
use crate::stream::StreamKind;

pub const MIN_INTERVAL_MS: u64 = 50;
pub const MAX_INTERVAL_MS: u64 = 1000;
pub const INTERVAL_STEP_MS: u64 = 50;
pub const DEFAULT_INTERVAL_MS: u64 = 200;

/// A validated flush interval: 50..=1000 ms in steps of 50.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThrottleInterval(u64);

impl ThrottleInterval {
    pub fn new(millis: u64) -> Result<Self, ConfigError> {
        Self::validate(millis, "throttle")
    }

    pub(crate) fn for_stream(kind: StreamKind, millis: u64) -> Result<Self, ConfigError> {
        Self::validate(millis, kind.as_str())
    }

    fn validate(millis: u64, stream: &'static str) -> Result<Self, ConfigError> {
        if (MIN_INTERVAL_MS..=MAX_INTERVAL_MS).contains(&millis) && millis % INTERVAL_STEP_MS == 0 {
            Ok(Self(millis))
        } else {
            Err(ConfigError::InvalidInterval { stream, millis })
        }
    }

    pub fn millis(self) -> u64 {
        self.0
    }

    pub fn duration(self) -> Duration {
        Duration::from_millis(self.0)
    }
}

impl Default for ThrottleInterval {
    fn default() -> Self {
        Self(DEFAULT_INTERVAL_MS)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Scheduled { due: Instant },
    Cancelled,
}

/// `Idle → Scheduled → Idle` on fire, `Scheduled → Cancelled` on cancel.
/// At most one deadline is pending at a time.
#[derive(Debug)]
pub struct Throttle {
    interval: ThrottleInterval,
    state: TimerState,
}

impl Throttle {
    pub fn new(interval: ThrottleInterval) -> Self {
        Self {
            interval,
            state: TimerState::Idle,
        }
    }

    pub fn interval(&self) -> ThrottleInterval {
        self.interval
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_armed(&self) -> bool {
        matches!(self.state, TimerState::Scheduled { .. })
    }

    pub fn due(&self) -> Option<Instant> {
        match self.state {
            TimerState::Scheduled { due } => Some(due),
            _ => None,
        }
    }

    /// Arm the timer unless it already is. Returns true if newly armed.
    pub fn schedule(&mut self, now: Instant) -> bool {
        if self.is_armed() {
            return false;
        }
        self.state = TimerState::Scheduled {
            due: now + self.interval.duration(),
        };
        true
    }

    /// Returns true exactly once per armed deadline, when `now` has reached it.
    pub fn poll(&mut self, now: Instant) -> bool {
        match self.state {
            TimerState::Scheduled { due } if now >= due => {
                self.state = TimerState::Idle;
                true
            }
            _ => false,
        }
    }

    /// Disarm for an immediate flush. Returns true if a deadline was pending.
    pub fn disarm(&mut self) -> bool {
        let was_armed = self.is_armed();
        self.state = TimerState::Idle;
        was_armed
    }

    pub fn cancel(&mut self) {
        self.state = TimerState::Cancelled;
    }
}
