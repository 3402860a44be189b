//! Registration retry backoff
//!
//! When the transport reports a recoverable registration failure the manager
//! waits before registering again. The delay grows with each consecutive
//! failure and is capped; a successful registration resets it.
//!
//! ```rust
//! use softphone_call_core::recovery::{BackoffStrategy, RetryConfig};
//! use std::time::Duration;
//!
//! let config = RetryConfig {
//!     initial_delay_ms: 1_000,
//!     max_delay_ms: 2_500,
//!     strategy: BackoffStrategy::Linear,
//! };
//! assert_eq!(config.delay_for_attempt(1), Duration::from_millis(1_000));
//! assert_eq!(config.delay_for_attempt(2), Duration::from_millis(2_000));
//! assert_eq!(config.delay_for_attempt(3), Duration::from_millis(2_500));
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// How the delay grows between consecutive failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// base, 2×base, 3×base, ...
    Linear,
    /// base, 2×base, 4×base, ...
    Exponential,
}

/// Configuration for registration retries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    /// Upper bound for any retry delay
    pub max_delay_ms: u64,
    /// Growth of the delay per consecutive failure
    pub strategy: BackoffStrategy,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 1_000,
            max_delay_ms: 30_000,
            strategy: BackoffStrategy::Linear,
        }
    }
}

impl RetryConfig {
    /// Delay to wait after the `attempt`-th consecutive failure (1-based)
    ///
    /// Attempt 0 is treated as attempt 1. The result never exceeds
    /// `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1) as u64;
        let factor = match self.strategy {
            BackoffStrategy::Linear => attempt,
            BackoffStrategy::Exponential => {
                1u64.checked_shl((attempt - 1) as u32).unwrap_or(u64::MAX)
            }
        };
        let millis = self.initial_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(millis)
    }
}

/// Tracks consecutive registration failures and the retry they call for
#[derive(Debug, Clone)]
pub struct RegistrationBackoff {
    config: RetryConfig,
    consecutive_failures: u32,
    pending_retry: Option<Duration>,
    abandoned: bool,
}

impl RegistrationBackoff {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            consecutive_failures: 0,
            pending_retry: None,
            abandoned: false,
        }
    }

    /// Record a recoverable failure and schedule the next retry
    pub fn record_failure(&mut self) -> Duration {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.abandoned = false;
        let delay = self.config.delay_for_attempt(self.consecutive_failures);
        warn!(
            attempt = self.consecutive_failures,
            next_delay_ms = delay.as_millis() as u64,
            "Registration failed, scheduling retry"
        );
        self.pending_retry = Some(delay);
        delay
    }

    /// Forget failures after a successful registration
    pub fn reset(&mut self) {
        if self.consecutive_failures > 0 {
            debug!(failures = self.consecutive_failures, "Registration recovered");
        }
        self.consecutive_failures = 0;
        self.pending_retry = None;
        self.abandoned = false;
    }

    /// Give up on retrying until the next recoverable failure
    pub fn abandon(&mut self) {
        self.pending_retry = None;
        self.abandoned = true;
    }

    /// Take the retry delay scheduled by the last failure, if any
    pub fn take_pending_retry(&mut self) -> Option<Duration> {
        self.pending_retry.take()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether a retry scheduled earlier is still wanted
    ///
    /// False once registration succeeded or failed for good.
    pub fn is_retrying(&self) -> bool {
        self.consecutive_failures > 0 && !self.abandoned
    }
}
