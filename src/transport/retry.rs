//! Reconnect policy.
//!
//! Decides whether a closed connection is reopened and how long to wait
//! first. The default policy never reconnects.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use jscall::RetryPolicy;
//!
//! let policy = RetryPolicy::exponential(5)
//!     .with_initial_interval(Duration::from_millis(250))
//!     .with_retry_codes([1005, 1006]);
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use backoff::ExponentialBackoff;

// ============================================================================
// Constants
// ============================================================================

/// Close code reported when the peer closed without a status.
pub const NO_STATUS_RECEIVED: u16 = 1005;

/// Close code reported when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Default first backoff interval.
const DEFAULT_INITIAL_INTERVAL: Duration = Duration::from_millis(500);

/// Default cap on a single backoff interval.
const DEFAULT_MAX_INTERVAL: Duration = Duration::from_secs(30);

/// Default interval growth factor.
const DEFAULT_MULTIPLIER: f64 = 2.0;

// ============================================================================
// RetryPolicy
// ============================================================================

/// Reconnect policy for closed connections.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Reconnect attempts allowed after one close.
    max_attempts: u32,
    /// Close codes that trigger a reconnect.
    retry_codes: Vec<u16>,
    /// First backoff interval.
    initial_interval: Duration,
    /// Cap on a single interval.
    max_interval: Duration,
    /// Growth factor between intervals.
    multiplier: f64,
    /// Jitter applied to each interval, in `[0, 1]`.
    randomization_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::never()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl RetryPolicy {
    /// A policy that never reconnects.
    #[must_use]
    pub fn never() -> Self {
        Self::exponential(0)
    }

    /// Exponential backoff with up to `max_attempts` reconnects, retrying on
    /// [`NO_STATUS_RECEIVED`].
    #[must_use]
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            retry_codes: vec![NO_STATUS_RECEIVED],
            initial_interval: DEFAULT_INITIAL_INTERVAL,
            max_interval: DEFAULT_MAX_INTERVAL,
            multiplier: DEFAULT_MULTIPLIER,
            randomization_factor: 0.0,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl RetryPolicy {
    /// Replaces the set of close codes that trigger a reconnect.
    #[must_use]
    pub fn with_retry_codes(mut self, codes: impl IntoIterator<Item = u16>) -> Self {
        self.retry_codes = codes.into_iter().collect();
        self
    }

    /// Sets the first backoff interval.
    #[inline]
    #[must_use]
    pub fn with_initial_interval(mut self, interval: Duration) -> Self {
        self.initial_interval = interval;
        self
    }

    /// Sets the cap on a single interval.
    #[inline]
    #[must_use]
    pub fn with_max_interval(mut self, interval: Duration) -> Self {
        self.max_interval = interval;
        self
    }

    /// Sets the growth factor.
    #[inline]
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the jitter, clamped to `[0, 1]`.
    #[inline]
    #[must_use]
    pub fn with_randomization(mut self, factor: f64) -> Self {
        self.randomization_factor = factor.clamp(0.0, 1.0);
        self
    }
}

// ============================================================================
// Decisions
// ============================================================================

impl RetryPolicy {
    /// Returns the maximum number of reconnect attempts.
    #[inline]
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns `true` if a close with `code` after `attempt` failed
    /// reconnects should be followed by another attempt.
    #[must_use]
    pub fn should_retry(&self, code: u16, attempt: u32) -> bool {
        attempt < self.max_attempts && self.retry_codes.contains(&code)
    }

    /// Creates a fresh backoff schedule.
    #[must_use]
    pub fn schedule(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_interval,
            initial_interval: self.initial_interval,
            randomization_factor: self.randomization_factor,
            multiplier: self.multiplier,
            max_interval: self.max_interval,
            max_elapsed_time: None,
            ..Default::default()
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
