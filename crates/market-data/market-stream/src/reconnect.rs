//! Reconnection policy and per-channel retry bookkeeping
//!
//! Capped exponential backoff with a "never give up" tail: once the attempt
//! budget is spent the counter resets and the channel waits out a fixed cooldown
//! before trying again. A long-lived dashboard should keep retrying, so no
//! channel ever goes permanently dark.

use crate::errors::{Result, StreamError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff constants, shared by every channel of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay before the first retry
    pub base_delay_ms: u64,
    /// Upper bound for the exponential delay
    pub max_delay_ms: u64,
    /// Consecutive attempts before the cooldown kicks in
    pub max_attempts: u32,
    /// Fixed wait once `max_attempts` is exhausted
    pub cooldown_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 30_000,
            max_attempts: 10,
            cooldown_ms: 60_000,
        }
    }
}

impl BackoffPolicy {
    /// Delay for the given 1-based attempt: `min(base * 2^(attempt-1), max)`
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(63);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let millis = self
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.max_delay_ms);
        Duration::from_millis(millis)
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }

    /// # Errors
    ///
    /// Returns [`StreamError::InvalidConfig`] when the policy could spin without delay.
    pub fn validate(&self) -> Result<()> {
        if self.base_delay_ms == 0 || self.cooldown_ms == 0 {
            return Err(StreamError::InvalidConfig(
                "backoff delays must be non-zero".to_string(),
            ));
        }
        if self.max_delay_ms < self.base_delay_ms {
            return Err(StreamError::InvalidConfig(
                "max_delay_ms must be >= base_delay_ms".to_string(),
            ));
        }
        if self.max_attempts == 0 {
            return Err(StreamError::InvalidConfig(
                "max_attempts must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// What the channel should do after a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPlan {
    /// Regular exponential step
    Backoff { attempt: u32, delay: Duration },
    /// Attempt budget exhausted; counter was reset
    Cooldown { delay: Duration },
}

impl RetryPlan {
    #[must_use]
    pub const fn delay(&self) -> Duration {
        match self {
            Self::Backoff { delay, .. } | Self::Cooldown { delay } => *delay,
        }
    }
}

/// Retry state of a single channel
///
/// Counts the attempt before computing its delay and resets on every successful
/// open. It also remembers whether the channel went through a failure since its
/// last successful open, so the open that ends an outage can be reported as a
/// reconnect.
#[derive(Debug, Clone)]
pub struct ReconnectSupervisor {
    policy: BackoffPolicy,
    attempts: u32,
    pending_resync: bool,
    reconnects: u64,
}

impl ReconnectSupervisor {
    #[must_use]
    pub const fn new(policy: BackoffPolicy) -> Self {
        Self {
            policy,
            attempts: 0,
            pending_resync: false,
            reconnects: 0,
        }
    }

    /// Record a failed open or an unexpected close and plan the next attempt
    pub fn on_failure(&mut self) -> RetryPlan {
        self.pending_resync = true;

        if self.attempts >= self.policy.max_attempts {
            self.attempts = 0;
            return RetryPlan::Cooldown {
                delay: self.policy.cooldown(),
            };
        }

        self.attempts += 1;
        RetryPlan::Backoff {
            attempt: self.attempts,
            delay: self.policy.delay_for(self.attempts),
        }
    }

    /// Record a successful open
    ///
    /// Returns `true` when this open ends an outage, i.e. dependent state should be
    /// refreshed from a fresh snapshot.
    pub fn on_open(&mut self) -> bool {
        self.attempts = 0;
        let resync = std::mem::take(&mut self.pending_resync);
        if resync {
            self.reconnects += 1;
        }
        resync
    }

    #[must_use]
    pub const fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Completed reconnects over the supervisor's lifetime
    #[must_use]
    pub const fn reconnects(&self) -> u64 {
        self.reconnects
    }

    #[must_use]
    pub const fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }
}
