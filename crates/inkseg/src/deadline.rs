//! Time budgets for segmentation call chains.
//!
//! A [`Deadline`] is computed once at the top of a call chain and passed
//! by value into every nested call; it is never extended. Checks are
//! cooperative: code calls [`Deadline::check`] (or ticks a
//! [`Checkpoint`] inside long loops) and bails out with a
//! [`TimeoutError`] when the budget is spent. Nothing interrupts a
//! computation that never checks.
//!
//! Timestamps come from the `web-time` crate, which uses
//! `performance.now()` on WASM and `std::time::Instant` on native.

use std::time::Duration;

use web_time::Instant;

/// Per-point iterations between clock reads in detector, objective,
/// and KDE loops.
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 1024;

/// The budget was exhausted before an operation finished.
///
/// Distinct from every "bad input" error so callers can tell "retry
/// with more time" apart from "this stroke is degenerate".
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("time budget of {budget:?} exceeded after {elapsed:?}")]
pub struct TimeoutError {
    /// Time spent when the overrun was detected.
    pub elapsed: Duration,
    /// The budget that was exceeded.
    pub budget: Duration,
}

/// A start timestamp plus a maximum duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Deadline {
    start: Instant,
    max_duration: Duration,
}

impl Deadline {
    /// A deadline starting now.
    #[must_use]
    pub fn new(max_duration: Duration) -> Self {
        Self::starting_at(Instant::now(), max_duration)
    }

    /// A deadline with an explicit start timestamp.
    #[must_use]
    pub const fn starting_at(start: Instant, max_duration: Duration) -> Self {
        Self {
            start,
            max_duration,
        }
    }

    /// A deadline that never expires in practice.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::new(Duration::MAX)
    }

    /// When the budget started.
    #[must_use]
    pub const fn start(&self) -> Instant {
        self.start
    }

    /// The total budget.
    #[must_use]
    pub const fn max_duration(&self) -> Duration {
        self.max_duration
    }

    /// Time spent since the start.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Time left before expiry (zero once expired).
    #[must_use]
    pub fn remaining(&self) -> Duration {
        self.max_duration.saturating_sub(self.elapsed())
    }

    /// Returns `true` once `elapsed >= max_duration`.
    ///
    /// A zero budget is therefore expired from the moment it is created.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.max_duration
    }

    /// Fail with [`TimeoutError`] if the budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutError`] when [`is_expired`](Self::is_expired).
    pub fn check(&self) -> Result<(), TimeoutError> {
        let elapsed = self.elapsed();
        if elapsed >= self.max_duration {
            return Err(TimeoutError {
                elapsed,
                budget: self.max_duration,
            });
        }
        Ok(())
    }

    /// A checkpoint that re-checks this deadline once every `interval`
    /// ticks. An interval of 0 is treated as 1.
    #[must_use]
    pub const fn checkpoint(self, interval: usize) -> Checkpoint {
        let interval = if interval == 0 { 1 } else { interval };
        Checkpoint {
            deadline: self,
            interval,
            countdown: interval,
        }
    }
}

/// Rate-limited deadline checks for per-point loops.
///
/// Reading the clock on every point of a long stroke costs more than
/// the geometry; ticking a checkpoint reads it once per `interval`
/// iterations instead, bounding the overrun to one interval's work.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    deadline: Deadline,
    interval: usize,
    countdown: usize,
}

impl Checkpoint {
    /// Count one iteration; check the deadline when the interval is up.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutError`] if the check runs and the deadline has
    /// expired.
    pub fn tick(&mut self) -> Result<(), TimeoutError> {
        self.countdown -= 1;
        if self.countdown == 0 {
            self.countdown = self.interval;
            self.deadline.check()?;
        }
        Ok(())
    }

    /// Check the deadline immediately, regardless of the interval.
    ///
    /// # Errors
    ///
    /// Returns [`TimeoutError`] if the deadline has expired.
    pub fn check_now(&mut self) -> Result<(), TimeoutError> {
        self.countdown = self.interval;
        self.deadline.check()
    }

    /// The deadline being checked.
    #[must_use]
    pub const fn deadline(&self) -> Deadline {
        self.deadline
    }
}
