//! Exponential backoff: within a tick for publish/commit retries, and across
//! ticks while the state store is down.

use std::time::Duration;

use tokio::time::Instant;

/// Bounded exponential backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Always >= 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay after the `attempt`-th failure (0-based): `base * 2^attempt`,
    /// clamped to `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Cross-tick pause after consecutive state-store outages.
///
/// Each failed tick doubles the pause (bounded by the policy); one healthy
/// tick resets it.
#[derive(Debug, Clone)]
pub struct OutageBackoff {
    policy: RetryPolicy,
    consecutive: u32,
    resume_at: Option<Instant>,
}

impl OutageBackoff {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            consecutive: 0,
            resume_at: None,
        }
    }

    /// Register a failed tick at `now`; returns the pause before the next one.
    pub fn record_outage(&mut self, now: Instant) -> Duration {
        let pause = self.policy.delay_for_attempt(self.consecutive);
        self.consecutive = self.consecutive.saturating_add(1);
        self.resume_at = Some(now + pause);
        pause
    }

    pub fn record_healthy(&mut self) {
        self.consecutive = 0;
        self.resume_at = None;
    }

    /// `true` when a tick may run at `now`.
    pub fn ready(&self, now: Instant) -> bool {
        self.resume_at.map_or(true, |at| now >= at)
    }

    pub fn resume_at(&self) -> Option<Instant> {
        self.resume_at
    }

    pub fn consecutive_outages(&self) -> u32 {
        self.consecutive
    }
}
