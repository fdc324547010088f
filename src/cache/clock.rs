//! Time source and re-validation delay for the resolution cache.

use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::time::Duration;

/// Source of "now" for staleness checks.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        let delta = chrono::Duration::from_std(by).unwrap_or_else(|_| chrono::Duration::zero());
        *now = *now + delta;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// How long a cached lookup result is trusted before the loader is asked again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateDelay {
    /// Re-check on every request.
    Always,
    /// Re-check once the entry is at least this old.
    Every(Duration),
    /// Never re-check.
    Never,
}

impl UpdateDelay {
    /// A zero duration means [`UpdateDelay::Always`], `Duration::MAX` means
    /// [`UpdateDelay::Never`].
    pub fn from_duration(delay: Duration) -> Self {
        if delay.is_zero() {
            UpdateDelay::Always
        } else if delay == Duration::MAX {
            UpdateDelay::Never
        } else {
            UpdateDelay::Every(delay)
        }
    }

    /// Whether an entry checked at `last_checked` can be used at `now` without
    /// asking the loader.
    pub fn is_fresh(&self, last_checked: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            UpdateDelay::Always => false,
            UpdateDelay::Never => true,
            UpdateDelay::Every(delay) => match now.signed_duration_since(last_checked).to_std() {
                Ok(elapsed) => elapsed < *delay,
                // clock went backwards
                Err(_) => true,
            },
        }
    }
}
