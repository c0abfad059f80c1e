//! Ledger client interface.
//!
//! The engine treats the ledger as a sequence of numbered blocks from which
//! decoded event logs can be queried. Transport, provider setup and ABI
//! decoding all live behind this trait.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WatchError;
use crate::registry::ContractHandle;
use crate::types::{BlockNumber, EventRecord};

/// Trait for reading heights and event logs from a ledger node.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Height of the most recent block the node knows about.
    async fn latest_block_number(&self) -> Result<BlockNumber, WatchError>;

    /// Whether block `number` can be fetched from the node right now.
    async fn block_exists(&self, number: BlockNumber) -> Result<bool, WatchError>;

    /// All decoded events emitted by `contract` in `[from, to]`, in ledger order.
    ///
    /// Fails with [`WatchError::Ledger`] on transport or RPC failure.
    async fn get_logs(
        &self,
        contract: &ContractHandle,
        from: BlockNumber,
        to: BlockNumber,
    ) -> Result<Vec<EventRecord>, WatchError>;
}

#[async_trait]
impl<L: LedgerClient + ?Sized> LedgerClient for Arc<L> {
    async fn latest_block_number(&self) -> Result<BlockNumber, WatchError> {
        (**self).latest_block_number().await
    }

    async fn block_exists(&self, number: BlockNumber) -> Result<bool, WatchError> {
        (**self).block_exists(number).await
    }

    async fn get_logs(
        &self,
        contract: &ContractHandle,
        from: BlockNumber,
        to: BlockNumber,
    ) -> Result<Vec<EventRecord>, WatchError> {
        (**self).get_logs(contract, from, to).await
    }
}
