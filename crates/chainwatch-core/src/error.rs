//! Error types for the watch pipeline.

use thiserror::Error;

use crate::types::BlockNumber;

/// Rejected registry operations.
///
/// These never escape as failures of the engine itself: the public `bool`
/// surface of [`crate::Watcher`] maps them to `false`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("contract '{0}' is already registered")]
    AlreadyRegistered(String),

    #[error("contract '{0}' is not registered")]
    NotRegistered(String),

    #[error("cannot use event '{event}': contract '{contract}' is not registered")]
    ContractNotRegistered { contract: String, event: String },

    #[error("event '{event}' is not subscribed on contract '{contract}'")]
    NotSubscribed { contract: String, event: String },

    #[error("contract '{contract}' does not declare event '{event}'")]
    UnknownEvent { contract: String, event: String },
}

/// Errors that can occur while polling and dispatching.
#[derive(Debug, Clone, Error)]
pub enum WatchError {
    /// The ledger client failed to answer (transport or RPC failure).
    #[error("ledger query failed: {0}")]
    Ledger(String),

    /// The reported chain tip cannot be read back yet.
    #[error("latest block {block} is not queryable yet")]
    UnconfirmedTip { block: BlockNumber },

    /// The ranged gate has not seen enough blocks past the window.
    #[error("block {to} is not confirmed at height {latest}: needs more than {required} blocks on top")]
    InsufficientConfirmations {
        latest: BlockNumber,
        to: BlockNumber,
        required: u64,
    },

    #[error("handler for '{contract}:{event}' failed: {reason}")]
    Handler {
        contract: String,
        event: String,
        reason: String,
    },

    #[error("watcher is already running")]
    AlreadyRunning,

    /// The failure policy gave up on the ledger.
    #[error("watcher halted after {attempts} failed attempt(s): {reason}")]
    Halted { attempts: u32, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl WatchError {
    /// Build a handler error from any displayable reason.
    pub fn handler(
        contract: impl Into<String>,
        event: impl Into<String>,
        reason: impl std::fmt::Display,
    ) -> Self {
        Self::Handler {
            contract: contract.into(),
            event: event.into(),
            reason: reason.to_string(),
        }
    }

    /// Returns `true` if the error only costs the current cycle.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::UnconfirmedTip { .. } | Self::InsufficientConfirmations { .. } | Self::Handler { .. }
        )
    }

    /// Returns `true` for ledger transport/RPC failures.
    pub fn is_ledger(&self) -> bool {
        matches!(self, Self::Ledger(_))
    }
}
