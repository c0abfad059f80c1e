//! What the scheduler does when the ledger cannot be queried.
//!
//! Gate skips (unconfirmed tip, not enough confirmations) are always benign.
//! Ledger failures are not: the cursor stays put, so the missed range is never
//! lost, and the policy picks between giving up and trying again.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Exponential backoff configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Consecutive failed cycles tolerated before halting.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry.
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// Cap on the delay.
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// Multiplier applied on each further retry.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_retries() -> u32 { 5 }
fn default_initial_backoff_ms() -> u64 { 500 }
fn default_max_backoff_ms() -> u64 { 30_000 }
fn default_multiplier() -> f64 { 2.0 }

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetryConfig {
    /// Returns the delay before the `attempt`-th retry (1-based), or `None`
    /// once `attempt` exceeds `max_retries`.
    pub fn next_delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_retries {
            return None;
        }
        let base_ms = self.initial_backoff_ms as f64 * self.multiplier.powi((attempt - 1) as i32);
        let capped = base_ms.min(self.max_backoff_ms as f64);
        Some(Duration::from_millis(capped as u64))
    }
}

/// Ledger-failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Stop the watcher on the first ledger failure.
    #[default]
    Halt,
    /// Keep polling at the regular interval, forever.
    Skip,
    /// Retry with exponential backoff, halting after `max_retries` failures in a row.
    Backoff(RetryConfig),
}

/// What the scheduler should do after a failed cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureAction {
    Halt,
    /// Retry after the given delay, or after the regular interval for `None`.
    RetryAfter(Option<Duration>),
}

impl FailurePolicy {
    /// Decide after `attempt` consecutive failures (1-based).
    pub fn decide(&self, attempt: u32) -> FailureAction {
        match self {
            Self::Halt => FailureAction::Halt,
            Self::Skip => FailureAction::RetryAfter(None),
            Self::Backoff(retry) => match retry.next_delay(attempt) {
                Some(delay) => FailureAction::RetryAfter(Some(delay)),
                None => FailureAction::Halt,
            },
        }
    }
}
