//! Confirmation gate: decides whether the next block range is safe to read.
//!
//! Two policies:
//!
//! - **Tip**: read everything from the block after the cursor up to the
//!   confirmed head (`latest - confirmations`). With the default depth of 0
//!   the query ends at the latest block.
//! - **Ranged**: keep a fixed window `[from, to]` and only read it once more
//!   than `blocks_to_wait` blocks sit on top of `to`. The next window starts
//!   right after `to`.

use serde::{Deserialize, Serialize};

use crate::cursor::Cursor;
use crate::error::WatchError;
use crate::types::{BlockNumber, BlockRange};

pub const DEFAULT_BLOCKS_TO_WAIT: u64 = 20;
pub const DEFAULT_BLOCKS_TO_READ: u64 = 20;

/// Block-range admission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ConfirmationGate {
    Tip {
        #[serde(default)]
        confirmations: u64,
    },
    Ranged {
        #[serde(default = "default_blocks_to_wait")]
        blocks_to_wait: u64,
        #[serde(default = "default_blocks_to_read")]
        blocks_to_read: u64,
    },
}

fn default_blocks_to_wait() -> u64 { DEFAULT_BLOCKS_TO_WAIT }
fn default_blocks_to_read() -> u64 { DEFAULT_BLOCKS_TO_READ }

impl Default for ConfirmationGate {
    fn default() -> Self {
        Self::Tip { confirmations: 0 }
    }
}

/// Why a cycle did not advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The ledger reported a head it cannot serve yet.
    UnconfirmedTip { latest: BlockNumber },
    /// Tip mode: nothing confirmed past the cursor.
    NoNewBlocks { latest: BlockNumber },
    /// Ranged mode: the window is not buried deep enough.
    InsufficientConfirmations {
        latest: BlockNumber,
        to: BlockNumber,
        required: u64,
    },
}

impl SkipReason {
    /// The error-taxonomy equivalent, for reporting. `None` for an idle chain.
    pub fn as_error(&self) -> Option<WatchError> {
        match *self {
            Self::UnconfirmedTip { latest } => Some(WatchError::UnconfirmedTip { block: latest }),
            Self::NoNewBlocks { .. } => None,
            Self::InsufficientConfirmations {
                latest,
                to,
                required,
            } => Some(WatchError::InsufficientConfirmations {
                latest,
                to,
                required,
            }),
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnconfirmedTip { latest } => write!(f, "block {latest} not queryable yet"),
            Self::NoNewBlocks { latest } => write!(f, "no new block since {latest}"),
            Self::InsufficientConfirmations {
                latest,
                to,
                required,
            } => write!(
                f,
                "window end {to} has {} of >{required} confirmations",
                latest.saturating_sub(*to)
            ),
        }
    }
}

/// Outcome of evaluating the gate against the chain head.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    /// Query `query`, then move the cursor to `next`.
    Advance { query: BlockRange, next: Cursor },
    Skip(SkipReason),
}

impl ConfirmationGate {
    pub fn ranged(blocks_to_wait: u64, blocks_to_read: u64) -> Self {
        Self::Ranged {
            blocks_to_wait,
            blocks_to_read,
        }
    }

    /// Start block used when the configuration does not name one.
    pub fn default_start_block(&self) -> BlockNumber {
        match self {
            Self::Tip { .. } => 0,
            Self::Ranged { .. } => 1,
        }
    }

    /// The cursor a watcher starting at `start` begins with.
    pub fn initial_cursor(&self, start: BlockNumber) -> Cursor {
        match *self {
            Self::Tip { .. } => Cursor::at(start),
            Self::Ranged { blocks_to_read, .. } => Cursor::window(start, blocks_to_read),
        }
    }

    /// Override the confirmation depth (`confirmations` / `blocks_to_wait`).
    pub fn with_blocks_to_wait(self, depth: u64) -> Self {
        match self {
            Self::Tip { .. } => Self::Tip {
                confirmations: depth,
            },
            Self::Ranged { blocks_to_read, .. } => Self::Ranged {
                blocks_to_wait: depth,
                blocks_to_read,
            },
        }
    }

    /// Override the window size. Tip mode has no window and is returned as is.
    pub fn with_blocks_to_read(self, size: u64) -> Self {
        match self {
            Self::Tip { .. } => self,
            Self::Ranged { blocks_to_wait, .. } => Self::Ranged {
                blocks_to_wait,
                blocks_to_read: size,
            },
        }
    }

    /// Decide what to do given the cursor and the latest chain height.
    pub fn evaluate(&self, cursor: &Cursor, latest: BlockNumber) -> GateDecision {
        match *self {
            Self::Tip { confirmations } => {
                let confirmed = latest.saturating_sub(confirmations);
                if confirmed <= cursor.to_block() {
                    return GateDecision::Skip(SkipReason::NoNewBlocks { latest });
                }
                GateDecision::Advance {
                    query: BlockRange {
                        from: cursor.to_block() + 1,
                        to: confirmed,
                    },
                    next: Cursor::at(confirmed),
                }
            }
            Self::Ranged {
                blocks_to_wait,
                blocks_to_read,
            } => {
                let to = cursor.to_block();
                if latest.saturating_sub(to) <= blocks_to_wait {
                    return GateDecision::Skip(SkipReason::InsufficientConfirmations {
                        latest,
                        to,
                        required: blocks_to_wait,
                    });
                }
                GateDecision::Advance {
                    query: cursor.range(),
                    next: Cursor::window(to.saturating_add(1), blocks_to_read),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn advance(decision: GateDecision) -> (BlockRange, Cursor) {
        match decision {
            GateDecision::Advance { query, next } => (query, next),
            GateDecision::Skip(reason) => panic!("expected advance, got skip: {reason}"),
        }
    }

    #[test]
    fn tip_reads_from_next_block_to_latest() {
        let gate = ConfirmationGate::default();
        let (query, next) = advance(gate.evaluate(&Cursor::at(5), 8));
        assert_eq!(query, BlockRange { from: 6, to: 8 });
        assert_eq!(next, Cursor::at(8));
    }

    #[test]
    fn tip_skips_when_no_progress() {
        let gate = ConfirmationGate::default();
        assert_eq!(
            gate.evaluate(&Cursor::at(8), 8),
            GateDecision::Skip(SkipReason::NoNewBlocks { latest: 8 })
        );
        // A lagging node reporting an older head must not move the cursor back.
        assert!(matches!(
            gate.evaluate(&Cursor::at(8), 6),
            GateDecision::Skip(_)
        ));
    }

    #[test]
    fn tip_respects_confirmation_depth() {
        let gate = ConfirmationGate::Tip { confirmations: 3 };
        assert!(matches!(gate.evaluate(&Cursor::at(5), 8), GateDecision::Skip(_)));
        let (query, next) = advance(gate.evaluate(&Cursor::at(5), 10));
        assert_eq!(query, BlockRange { from: 6, to: 7 });
        assert_eq!(next, Cursor::at(7));
    }

    #[test]
    fn tip_successive_ranges_are_disjoint() {
        let gate = ConfirmationGate::default();
        let mut cursor = Cursor::at(0);
        let mut last_to = 0;
        for latest in [3u64, 3, 7, 8, 8, 15] {
            if let GateDecision::Advance { query, next } = gate.evaluate(&cursor, latest) {
                assert!(query.from > last_to);
                assert!(query.to <= latest);
                last_to = query.to;
                assert!(cursor.commit(next));
            }
        }
        assert_eq!(cursor, Cursor::at(15));
    }

    #[test]
    fn ranged_waits_for_confirmations() {
        let gate = ConfirmationGate::ranged(20, 20);
        let cursor = gate.initial_cursor(1);
        assert_eq!(cursor, Cursor::new(1, 21).unwrap());

        // 41 - 21 = 20, not strictly greater than 20.
        assert!(matches!(
            gate.evaluate(&cursor, 41),
            GateDecision::Skip(SkipReason::InsufficientConfirmations { .. })
        ));

        let (query, next) = advance(gate.evaluate(&cursor, 42));
        assert_eq!(query, BlockRange { from: 1, to: 21 });
        assert_eq!(next, Cursor::new(22, 42).unwrap());
    }

    #[test]
    fn ranged_windows_are_contiguous() {
        let gate = ConfirmationGate::ranged(0, 1);
        let mut cursor = gate.initial_cursor(1);
        let (query, next) = advance(gate.evaluate(&cursor, 5));
        assert_eq!(query, BlockRange { from: 1, to: 2 });
        cursor.commit(next);

        let (query2, _) = advance(gate.evaluate(&cursor, 5));
        assert_eq!(query2.from, query.to + 1);
    }

    #[test]
    fn overrides_target_the_right_mode() {
        let tip = ConfirmationGate::default().with_blocks_to_wait(4).with_blocks_to_read(9);
        assert_eq!(tip, ConfirmationGate::Tip { confirmations: 4 });

        let ranged = ConfirmationGate::ranged(20, 20)
            .with_blocks_to_wait(0)
            .with_blocks_to_read(1);
        assert_eq!(ranged, ConfirmationGate::ranged(0, 1));
        assert_eq!(ranged.default_start_block(), 1);
    }

    #[test]
    fn gate_deserializes_with_defaults() {
        let gate: ConfirmationGate = serde_json::from_str(r#"{"mode":"ranged"}"#).unwrap();
        assert_eq!(gate, ConfirmationGate::ranged(20, 20));
        let gate: ConfirmationGate = serde_json::from_str(r#"{"mode":"tip"}"#).unwrap();
        assert_eq!(gate, ConfirmationGate::default());
    }
}
