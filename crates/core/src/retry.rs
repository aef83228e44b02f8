//! Retry policy for backend requests.
//!
//! A [`RetryPolicy`] is a plain value: how many attempts a request gets
//! and how long to wait between them. The async runner that applies it
//! lives in the tuner crate; keeping the policy here makes it testable
//! without any I/O.

use std::time::Duration;

/// Attempt budget for a single status query.
pub const STATUS_POLL_MAX_ATTEMPTS: u32 = 3;

/// Attempt budget for the result fetch.
pub const RESULT_FETCH_MAX_ATTEMPTS: u32 = 4;

/// Classifies a failure as worth retrying or terminal.
///
/// A terminal failure ends the retry budget immediately.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

// ---------------------------------------------------------------------------
// Backoff
// ---------------------------------------------------------------------------

/// Delay strategy between attempts.
#[derive(Debug, Clone, PartialEq)]
pub enum Backoff {
    /// Same delay after every failed attempt.
    Fixed(Duration),
    /// `initial * multiplier^(attempt - 1)`, clamped to `max`.
    Exponential {
        initial: Duration,
        max: Duration,
        multiplier: f64,
    },
}

impl Backoff {
    /// Delay to wait after the `attempt`-th failure (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match self {
            Backoff::Fixed(delay) => *delay,
            Backoff::Exponential {
                initial,
                max,
                multiplier,
            } => {
                let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
                let ms = initial.as_millis() as f64 * multiplier.powi(exponent);
                if !ms.is_finite() || ms >= max.as_millis() as f64 {
                    *max
                } else {
                    Duration::from_millis(ms as u64)
                }
            }
        }
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Backoff::Exponential {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

// ---------------------------------------------------------------------------
// RetryPolicy
// ---------------------------------------------------------------------------

/// Bounded retry budget for one logical request.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Zero is treated as one.
    pub max_attempts: u32,
    pub backoff: Backoff,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Backoff) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    /// Budget for one status query (3 attempts).
    pub fn status_poll() -> Self {
        Self::new(STATUS_POLL_MAX_ATTEMPTS, Backoff::default())
    }

    /// Budget for the result fetch (4 attempts).
    pub fn result_fetch() -> Self {
        Self::new(RESULT_FETCH_MAX_ATTEMPTS, Backoff::default())
    }

    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self::new(1, Backoff::Fixed(Duration::ZERO))
    }

    /// Return a copy with a different attempt budget.
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn effective_max_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Whether another attempt may follow `attempts_made` failed ones.
    pub fn allows_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.effective_max_attempts()
    }

    /// Delay to wait after the `attempt`-th failure.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff.delay_for(attempt)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
