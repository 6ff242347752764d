//! Whole-run retry with a delay schedule
//!
//! ```text
//! Attempting -> Success
//!            -> Waiting -> Attempting -> ... -> GaveUp
//! ```
//!
//! Fatal errors skip the schedule and surface immediately.

use std::fmt::Display;
use std::time::Duration;

use backoff::backoff::Backoff;
use tracing::{error, info, warn};

use crate::error::{Classify, ErrorClass};

/// Escalating waits used when no fixed delay is configured. The last entry
/// repeats.
pub const DEFAULT_SCHEDULE: [Duration; 8] = [
    Duration::from_secs(10),
    Duration::from_secs(30),
    Duration::from_secs(60),
    Duration::from_secs(5 * 60),
    Duration::from_secs(10 * 60),
    Duration::from_secs(15 * 60),
    Duration::from_secs(60 * 60),
    Duration::from_secs(2 * 60 * 60),
];

/// Yields `max_retries` waits, then stops.
#[derive(Debug, Clone)]
pub struct DelaySchedule {
    fixed: Option<Duration>,
    max_retries: u32,
    issued: u32,
}

impl DelaySchedule {
    pub fn new(max_retries: u32, fixed: Option<Duration>) -> Self {
        Self {
            fixed,
            max_retries,
            issued: 0,
        }
    }
}

impl Backoff for DelaySchedule {
    fn reset(&mut self) {
        self.issued = 0;
    }

    fn next_backoff(&mut self) -> Option<Duration> {
        if self.issued >= self.max_retries {
            return None;
        }
        let step = (self.issued as usize).min(DEFAULT_SCHEDULE.len() - 1);
        self.issued += 1;
        Some(self.fixed.unwrap_or(DEFAULT_SCHEDULE[step]))
    }
}

impl Iterator for DelaySchedule {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        self.next_backoff()
    }
}

/// Runs an action until it succeeds, fails fatally, or the schedule is
/// exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryDriver {
    pub max_retries: u32,
    pub fixed_delay: Option<Duration>,
}

impl Default for RetryDriver {
    fn default() -> Self {
        Self {
            max_retries: 8,
            fixed_delay: None,
        }
    }
}

impl RetryDriver {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            fixed_delay: None,
        }
    }

    pub fn with_fixed_delay(mut self, delay: Duration) -> Self {
        self.fixed_delay = Some(delay);
        self
    }

    /// A driver that makes exactly one attempt.
    pub fn once() -> Self {
        Self::new(0)
    }

    pub fn schedule(&self) -> DelaySchedule {
        DelaySchedule::new(self.max_retries, self.fixed_delay)
    }

    /// Invoke `action` with the 1-based attempt number. At most
    /// `max_retries + 1` attempts are made; the last failure is returned
    /// unchanged.
    pub fn run<T, E, F>(&self, mut action: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Result<T, E>,
        E: Classify + Display,
    {
        let mut attempt = 0u32;
        let total = self.max_retries + 1;

        let outcome = backoff::retry_notify(
            self.schedule(),
            || {
                attempt += 1;
                info!(attempt, of = total, "attempting synchronization");
                action(attempt).map_err(|err| match err.class() {
                    ErrorClass::Fatal => {
                        error!(attempt, error = %err, "fatal error, not retrying");
                        backoff::Error::permanent(err)
                    }
                    ErrorClass::Retryable => backoff::Error::transient(err),
                })
            },
            |err: E, delay: Duration| {
                warn!(error = %err, delay_secs = delay.as_secs(), "attempt failed, waiting");
            },
        );

        outcome.map_err(|err| match err {
            backoff::Error::Permanent(err) => err,
            backoff::Error::Transient { err, .. } => {
                error!(attempts = attempt, error = %err, "giving up");
                err
            }
        })
    }
}
