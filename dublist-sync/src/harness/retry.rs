//! Retry schedules

use dublist_common::config::RetryConfig;
use std::time::Duration;

/// Transient-failure budget and delay schedules
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    attempts: u32,
    delays: Vec<Duration>,
    rate_limit_fallback: Vec<Duration>,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delays: Vec<Duration>, rate_limit_fallback: Vec<Duration>) -> Self {
        Self {
            attempts: attempts.max(1),
            delays,
            rate_limit_fallback,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.attempts,
            config.delays_secs.iter().map(|s| Duration::from_secs(*s)).collect(),
            config
                .rate_limit_fallback_secs
                .iter()
                .map(|s| Duration::from_secs(*s))
                .collect(),
        )
    }

    /// Total attempts before a transient failure is final
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Sleep after the `index`-th failed attempt (0-based)
    pub fn retry_delay(&self, index: u32) -> Duration {
        pick(&self.delays, index)
    }

    /// Sleep after the `index`-th rate-limited reply that carried no server delay
    pub fn rate_limit_delay(&self, index: u32) -> Duration {
        pick(&self.rate_limit_fallback, index)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

/// Index into a schedule, repeating the last entry
fn pick(schedule: &[Duration], index: u32) -> Duration {
    schedule
        .get(index as usize)
        .or_else(|| schedule.last())
        .copied()
        .unwrap_or(Duration::ZERO)
}
