//! Backoff Policies
//!
//! Two delay policies drive the pipeline:
//!
//! - [`RetryPolicy`]: linear backoff between attempts inside one session
//!   (`attempt * base_delay`), optionally jittered.
//! - [`IntervalPolicy`]: the scheduler's trigger interval, doubled per
//!   failure once consecutive failures exceed a threshold, capped, and
//!   restored to its base on the next success.

use std::time::Duration;

use rand::Rng;

// =============================================================================
// Retry Policy
// =============================================================================

/// Configuration for in-session retries.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Total attempts per session, including the first.
    pub max_retries: u32,
    /// Unit of the linear backoff.
    pub base_delay: Duration,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(5),
            jitter_factor: 0.0,
        }
    }
}

/// Linear retry backoff bounded by a total attempt budget.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    /// Create a new retry policy.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Total attempt budget.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.config.max_retries
    }

    /// Whether another attempt is allowed after `attempts_made`.
    #[must_use]
    pub const fn should_retry(&self, attempts_made: u32) -> bool {
        attempts_made < self.config.max_retries
    }

    /// Delay before the attempt following `attempts_made` failures.
    #[must_use]
    pub fn delay_for(&self, attempts_made: u32) -> Duration {
        let delay = self.config.base_delay.saturating_mul(attempts_made.max(1));
        apply_jitter(delay, self.config.jitter_factor)
    }
}

fn apply_jitter(duration: Duration, jitter_factor: f64) -> Duration {
    if jitter_factor <= 0.0 || duration.is_zero() {
        return duration;
    }

    #[allow(clippy::cast_precision_loss)]
    let base_millis = duration.as_millis() as f64;
    let jitter_range = base_millis * jitter_factor;
    let jitter: f64 = rand::rng().random_range(-jitter_range..=jitter_range);
    let adjusted_millis = (base_millis + jitter).max(1.0);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let adjusted_u64 = adjusted_millis as u64;
    Duration::from_millis(adjusted_u64)
}

// =============================================================================
// Interval Policy
// =============================================================================

/// Configuration for the scheduler interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalConfig {
    /// Interval while sessions succeed.
    pub base: Duration,
    /// Hard cap on the widened interval.
    pub max: Duration,
    /// Consecutive failures tolerated before widening.
    pub max_consecutive_failures: u32,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(60),
            max: Duration::from_secs(900),
            max_consecutive_failures: 3,
        }
    }
}

/// Adaptive scheduler interval.
#[derive(Debug, Clone)]
pub struct IntervalPolicy {
    config: IntervalConfig,
    current: Duration,
    consecutive_failures: u32,
}

impl IntervalPolicy {
    /// Create a policy at its base interval.
    #[must_use]
    pub const fn new(config: IntervalConfig) -> Self {
        let current = config.base;
        Self {
            config,
            current,
            consecutive_failures: 0,
        }
    }

    /// Interval to wait before the next trigger.
    #[must_use]
    pub const fn current(&self) -> Duration {
        self.current
    }

    /// Failures since the last success.
    #[must_use]
    pub const fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether the interval is above its base.
    #[must_use]
    pub fn is_widened(&self) -> bool {
        self.current > self.config.base
    }

    /// Record a success and return the (base) interval.
    pub const fn on_success(&mut self) -> Duration {
        self.consecutive_failures = 0;
        self.current = self.config.base;
        self.current
    }

    /// Record a failure and return the possibly widened interval.
    pub fn on_failure(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures > self.config.max_consecutive_failures {
            self.current = self.current.saturating_mul(2).min(self.config.max);
        }
        self.current
    }
}
