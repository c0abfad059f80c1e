//! Watcher configuration, start-time overrides and a fluent builder.
//!
//! # Example
//!
//! ```rust,no_run
//! use chainwatch_core::{ConfirmationGate, FailurePolicy, MemoryLedger, WatcherBuilder};
//!
//! let watcher = WatcherBuilder::new()
//!     .start_block(19_000_000)
//!     .poll_interval_ms(2_000)
//!     .gate(ConfirmationGate::ranged(12, 100))
//!     .failure_policy(FailurePolicy::Skip)
//!     .build(MemoryLedger::new())
//!     .unwrap();
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::WatchError;
use crate::gate::ConfirmationGate;
use crate::ledger::LedgerClient;
use crate::policy::FailurePolicy;
use crate::types::BlockNumber;
use crate::watcher::Watcher;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10_000;

/// Configuration for a watcher instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Initial cursor position. `None` uses the gate's default (0 tip, 1 ranged).
    #[serde(default)]
    pub start_block: Option<BlockNumber>,
    /// Delay between the end of one cycle and the start of the next.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default)]
    pub gate: ConfirmationGate,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
}

fn default_poll_interval_ms() -> u64 { DEFAULT_POLL_INTERVAL_MS }

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            start_block: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            gate: ConfirmationGate::default(),
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl WatcherConfig {
    /// Defaults for confirmed-range mode (wait 20 blocks, read 20 per window).
    pub fn ranged() -> Self {
        Self {
            gate: ConfirmationGate::Ranged {
                blocks_to_wait: crate::gate::DEFAULT_BLOCKS_TO_WAIT,
                blocks_to_read: crate::gate::DEFAULT_BLOCKS_TO_READ,
            },
            ..Self::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self, WatchError> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| WatchError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, WatchError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| WatchError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&raw)
    }

    pub fn validate(&self) -> Result<(), WatchError> {
        if self.poll_interval_ms == 0 {
            return Err(WatchError::Config("poll_interval_ms must be greater than 0".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// The start block after falling back to the gate default.
    pub fn resolved_start_block(&self) -> BlockNumber {
        self.start_block
            .unwrap_or_else(|| self.gate.default_start_block())
    }
}

/// Per-`start` overrides. Unset fields keep the current configuration and,
/// for `from_block`, the current cursor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartOptions {
    pub from_block: Option<BlockNumber>,
    pub poll_interval_ms: Option<u64>,
    /// Confirmation depth; applies to both gate modes.
    pub blocks_to_wait: Option<u64>,
    /// Window size; ranged mode only.
    pub blocks_to_read: Option<u64>,
}

impl StartOptions {
    pub fn from_block(mut self, block: BlockNumber) -> Self {
        self.from_block = Some(block);
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = Some(ms);
        self
    }

    pub fn blocks_to_wait(mut self, blocks: u64) -> Self {
        self.blocks_to_wait = Some(blocks);
        self
    }

    pub fn blocks_to_read(mut self, blocks: u64) -> Self {
        self.blocks_to_read = Some(blocks);
        self
    }

    /// Fold the overrides into `config` (everything except `from_block`).
    pub(crate) fn apply(&self, config: &mut WatcherConfig) -> Result<(), WatchError> {
        if let Some(ms) = self.poll_interval_ms {
            config.poll_interval_ms = ms;
        }
        if let Some(depth) = self.blocks_to_wait {
            config.gate = config.gate.with_blocks_to_wait(depth);
        }
        if let Some(size) = self.blocks_to_read {
            config.gate = config.gate.with_blocks_to_read(size);
        }
        config.validate()
    }
}

/// Fluent builder for [`WatcherConfig`] and [`Watcher`].
#[derive(Default)]
pub struct WatcherBuilder {
    config: WatcherConfig,
}

impl WatcherBuilder {
    pub fn new() -> Self {
        Self {
            config: WatcherConfig::default(),
        }
    }

    /// Set the first block the cursor points at.
    pub fn start_block(mut self, block: BlockNumber) -> Self {
        self.config.start_block = Some(block);
        self
    }

    /// Set the delay between cycles in milliseconds.
    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn gate(mut self, gate: ConfirmationGate) -> Self {
        self.config.gate = gate;
        self
    }

    /// Switch to confirmed-range mode.
    pub fn ranged(mut self, blocks_to_wait: u64, blocks_to_read: u64) -> Self {
        self.config.gate = ConfirmationGate::ranged(blocks_to_wait, blocks_to_read);
        self
    }

    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.config.failure_policy = policy;
        self
    }

    pub fn build_config(self) -> WatcherConfig {
        self.config
    }

    /// Build a watcher over `ledger`.
    pub fn build<L: LedgerClient + 'static>(self, ledger: L) -> Result<Watcher<L>, WatchError> {
        Watcher::new(ledger, self.config)
    }
}
