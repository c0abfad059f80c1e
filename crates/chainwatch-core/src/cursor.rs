//! Watcher cursor: the block range the engine has reached.

use serde::{Deserialize, Serialize};

use crate::error::WatchError;
use crate::types::{BlockNumber, BlockRange};

/// The watcher's position in the chain.
///
/// In tip mode the cursor is `{n, n}` where `n` is the last processed block.
/// In ranged mode it is the next window to read. Either way `from <= to`, and
/// a commit never moves either bound backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCursor")]
pub struct Cursor {
    from: BlockNumber,
    to: BlockNumber,
}

#[derive(Deserialize)]
struct RawCursor {
    from: BlockNumber,
    to: BlockNumber,
}

impl TryFrom<RawCursor> for Cursor {
    type Error = WatchError;

    fn try_from(raw: RawCursor) -> Result<Self, Self::Error> {
        Cursor::new(raw.from, raw.to)
    }
}

impl Cursor {
    pub fn new(from: BlockNumber, to: BlockNumber) -> Result<Self, WatchError> {
        if from > to {
            return Err(WatchError::Config(format!(
                "cursor start {from} is above its end {to}"
            )));
        }
        Ok(Self { from, to })
    }

    /// A cursor parked on a single block.
    pub fn at(block: BlockNumber) -> Self {
        Self {
            from: block,
            to: block,
        }
    }

    /// The window `[from, from + extra]`.
    pub fn window(from: BlockNumber, extra: u64) -> Self {
        Self {
            from,
            to: from.saturating_add(extra),
        }
    }

    pub fn from_block(&self) -> BlockNumber {
        self.from
    }

    pub fn to_block(&self) -> BlockNumber {
        self.to
    }

    pub fn range(&self) -> BlockRange {
        BlockRange {
            from: self.from,
            to: self.to,
        }
    }

    /// Move to `next`. Returns `false` (and leaves the cursor alone) if that
    /// would move either bound backwards.
    pub fn commit(&mut self, next: Cursor) -> bool {
        if next.from < self.from || next.to < self.to {
            tracing::warn!(current = %self, rejected = %next, "Refusing to move cursor backwards");
            return false;
        }
        *self = next;
        true
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.from == self.to {
            write!(f, "{}", self.to)
        } else {
            write!(f, "[{}, {}]", self.from, self.to)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cursor_rejects_inverted_window() {
        assert!(Cursor::new(10, 5).is_err());
        let c = Cursor::new(1, 21).unwrap();
        assert_eq!(c.range().len(), 21);
        assert_eq!(Cursor::window(1, 20), c);
    }

    #[test]
    fn cursor_commit_advances() {
        let mut cursor = Cursor::at(5);
        assert!(cursor.commit(Cursor::at(8)));
        assert_eq!(cursor, Cursor::at(8));
        assert_eq!(cursor.to_string(), "8");
    }

    #[test]
    fn cursor_commit_refuses_regression() {
        let mut cursor = Cursor::at(8);
        assert!(!cursor.commit(Cursor::at(7)));
        assert_eq!(cursor, Cursor::at(8));
    }

    #[test]
    fn cursor_serializes_as_bounds() {
        let json = serde_json::to_string(&Cursor::new(3, 4).unwrap()).unwrap();
        assert_eq!(json, r#"{"from":3,"to":4}"#);
    }

    #[test]
    fn persisted_cursor_is_validated_on_load() {
        let restored: Cursor = serde_json::from_str(r#"{"from":22,"to":42}"#).unwrap();
        assert_eq!(restored, Cursor::new(22, 42).unwrap());

        let err = serde_json::from_str::<Cursor>(r#"{"from":9,"to":3}"#).unwrap_err();
        assert!(err.to_string().contains("cursor start 9 is above its end 3"));
    }
}
