#![deny(unsafe_code)]

//! Upstream budget enforcement: a rolling-window request limiter and an
//! exponential-backoff retry for transient faults.
//!
//! SAM publishes a daily request ceiling; the limiter enforces it in
//! process by sleeping into the next allowed slot instead of erroring.
//! Time is injected so tests never sleep for real.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, warn};

use crate::error::{ReferenceError, Result};

/// Documented SAM ceiling: requests per rolling 24 hours.
pub const SAM_DAILY_REQUEST_LIMIT: u32 = 259_000;

/// Injectable wall clock.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
    fn sleep(&self, duration: StdDuration);
}

#[derive(Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: StdDuration) {
        std::thread::sleep(duration);
    }
}

/// At most `max_requests` events inside any rolling `window`; `acquire`
/// sleeps until the oldest event leaves the window.
pub struct RollingWindowLimiter<'a> {
    max_requests: u32,
    window: Duration,
    events: Mutex<VecDeque<DateTime<Utc>>>,
    clock: &'a dyn Clock,
}

impl<'a> RollingWindowLimiter<'a> {
    pub fn new(max_requests: u32, window: Duration, clock: &'a dyn Clock) -> Self {
        Self {
            max_requests,
            window,
            events: Mutex::new(VecDeque::new()),
            clock,
        }
    }

    pub fn sam_daily(clock: &'a dyn Clock) -> Self {
        Self::new(SAM_DAILY_REQUEST_LIMIT, Duration::hours(24), clock)
    }

    /// Blocks until a slot is free, then records the event.
    pub fn acquire(&self) {
        loop {
            let now = self.clock.now();
            let mut events = self
                .events
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            while let Some(oldest) = events.front()
                && now - *oldest >= self.window
            {
                events.pop_front();
            }
            if events.len() < self.max_requests as usize {
                events.push_back(now);
                return;
            }
            let oldest = *events.front().unwrap_or(&now);
            drop(events);
            let wait = (oldest + self.window) - now;
            let wait = wait.to_std().unwrap_or(StdDuration::from_millis(1));
            debug!(wait_ms = wait.as_millis() as u64, "request budget exhausted, sleeping");
            self.clock.sleep(wait);
        }
    }

    pub fn in_flight(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }
}

/// Exponential backoff over `ReferenceError::is_retryable` faults only.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: StdDuration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay: StdDuration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    pub fn run<T>(
        &self,
        clock: &dyn Clock,
        what: &str,
        mut op: impl FnMut() -> Result<T>,
    ) -> Result<T> {
        let mut attempt = 0u32;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt + 1 < self.max_attempts => {
                    let delay = self.base_delay * 2u32.saturating_pow(attempt);
                    warn!(%err, attempt = attempt + 1, delay_ms = delay.as_millis() as u64,
                        "{what} failed, retrying");
                    clock.sleep(delay);
                    attempt += 1;
                }
                Err(err) if err.is_retryable() => {
                    return Err(ReferenceError::RetriesExhausted {
                        attempts: self.max_attempts,
                        message: err.to_string(),
                    });
                }
                Err(err) => return Err(err),
            }
        }
    }
}
