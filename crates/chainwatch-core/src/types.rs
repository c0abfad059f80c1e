//! Shared types for the watch pipeline.

use serde::{Deserialize, Serialize};

/// Height of a block on the ledger.
pub type BlockNumber = u64;

// ─── EventRecord ──────────────────────────────────────────────────────────────

/// A decoded event log, as handed over by the ledger client.
///
/// The engine routes on `contract` and `event` only; `payload` is forwarded to
/// handlers untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Registry name of the contract that emitted the event.
    pub contract: String,
    /// Event name (e.g. `"Transfer"`).
    pub event: String,
    /// Block the event was emitted in.
    pub block_number: BlockNumber,
    /// Position of the log within its block.
    #[serde(default)]
    pub log_index: u32,
    /// Decoded event arguments.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EventRecord {
    pub fn new(
        contract: impl Into<String>,
        event: impl Into<String>,
        block_number: BlockNumber,
    ) -> Self {
        Self {
            contract: contract.into(),
            event: event.into(),
            block_number,
            log_index: 0,
            payload: serde_json::Value::Null,
        }
    }

    /// Set the log index.
    pub fn with_log_index(mut self, log_index: u32) -> Self {
        self.log_index = log_index;
        self
    }

    /// Attach a decoded payload.
    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ─── BlockRange ───────────────────────────────────────────────────────────────

/// An inclusive range of blocks `[from, to]`.
///
/// Deserialization rejects `from > to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRange")]
pub struct BlockRange {
    pub from: BlockNumber,
    pub to: BlockNumber,
}

#[derive(Deserialize)]
struct RawRange {
    from: BlockNumber,
    to: BlockNumber,
}

impl TryFrom<RawRange> for BlockRange {
    type Error = String;

    fn try_from(raw: RawRange) -> Result<Self, Self::Error> {
        Self::new(raw.from, raw.to)
            .ok_or_else(|| format!("block range start {} is above its end {}", raw.from, raw.to))
    }
}

impl BlockRange {
    /// Returns `None` when `from > to`.
    pub fn new(from: BlockNumber, to: BlockNumber) -> Option<Self> {
        (from <= to).then_some(Self { from, to })
    }

    /// Number of blocks covered by the range; 0 for an inverted literal.
    pub fn len(&self) -> u64 {
        self.to
            .checked_sub(self.from)
            .map_or(0, |span| span.saturating_add(1))
    }

    /// `false` for any range built through [`BlockRange::new`] or serde.
    pub fn is_empty(&self) -> bool {
        self.from > self.to
    }

    pub fn contains(&self, block: BlockNumber) -> bool {
        self.from <= block && block <= self.to
    }
}

impl std::fmt::Display for BlockRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}, {}]", self.from, self.to)
    }
}

// ─── RunState ─────────────────────────────────────────────────────────────────

/// Whether the scheduler loop is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RunState {
    #[default]
    Stopped,
    Running,
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stopped => write!(f, "stopped"),
            Self::Running => write!(f, "running"),
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
