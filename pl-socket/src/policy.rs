//! Reconnect policy.
//!
//! A pure decision from the number of attempts already made to either
//! "retry after this delay" or "give up". The delay grows linearly:
//! attempt `n` waits `n * base_delay` (5s, 10s, 15s, ... with the defaults).

use std::time::Duration;

use pl_core::config::ReconnectConfig;
use pl_core::constants;

/// Outcome of consulting the policy after an abnormal closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectDecision {
    /// Wait `delay`, then run attempt number `attempt` (1-based).
    Retry { attempt: u32, delay: Duration },
    /// Attempts exhausted.
    GiveUp,
}

/// Bounded, linearly increasing reconnect backoff.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Maximum consecutive attempts; 0 disables reconnection.
    pub max_attempts: u32,
    /// Delay unit multiplied by the attempt number.
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: constants::DEFAULT_MAX_RECONNECT_ATTEMPTS,
            base_delay: Duration::from_millis(constants::DEFAULT_RECONNECT_BASE_DELAY_MS),
        }
    }
}

impl From<&ReconnectConfig> for ReconnectPolicy {
    fn from(config: &ReconnectConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay_ms),
        }
    }
}

impl ReconnectPolicy {
    /// Create a policy.
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    /// Decide what to do given the attempts already made since the last
    /// successful connection.
    pub fn decide(&self, attempts_made: u32) -> ReconnectDecision {
        if attempts_made < self.max_attempts {
            let attempt = attempts_made + 1;
            ReconnectDecision::Retry {
                attempt,
                delay: self.delay_for(attempt),
            }
        } else {
            ReconnectDecision::GiveUp
        }
    }

    /// Delay before attempt number `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}
