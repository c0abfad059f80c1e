//! In-memory ledger client.
//!
//! Holds a chain height, per-contract event logs and injectable failures in
//! RAM. Useful for tests, local simulations and examples; nothing is fetched
//! from a real node.

use async_trait::async_trait;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::error::WatchError;
use crate::ledger::LedgerClient;
use crate::registry::ContractHandle;
use crate::types::{BlockNumber, BlockRange, EventRecord};

/// A `get_logs` call observed by [`MemoryLedger`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQuery {
    pub contract: String,
    pub range: BlockRange,
}

#[derive(Debug, Clone)]
enum Failure {
    Once(String),
    Always(String),
}

#[derive(Default)]
struct State {
    latest: BlockNumber,
    hidden: BTreeSet<BlockNumber>,
    events: HashMap<String, Vec<EventRecord>>,
    head_failure: Option<Failure>,
    log_failures: HashMap<String, Failure>,
    queries: Vec<LogQuery>,
    head_polls: u64,
    log_latency: Option<Duration>,
}

/// Scripted in-memory [`LedgerClient`].
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<State>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger whose chain head is `latest`.
    pub fn with_latest(latest: BlockNumber) -> Self {
        let ledger = Self::new();
        ledger.set_latest(latest);
        ledger
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_latest(&self, latest: BlockNumber) {
        self.state().latest = latest;
    }

    /// Mine `blocks` empty blocks and return the new head.
    pub fn advance(&self, blocks: u64) -> BlockNumber {
        let mut state = self.state();
        state.latest = state.latest.saturating_add(blocks);
        state.latest
    }

    pub fn latest(&self) -> BlockNumber {
        self.state().latest
    }

    /// Make `block_exists(number)` report `false` (a node that lags its own head).
    pub fn hide_block(&self, number: BlockNumber) {
        self.state().hidden.insert(number);
    }

    pub fn reveal_block(&self, number: BlockNumber) {
        self.state().hidden.remove(&number);
    }

    /// Record an event under its `contract` name.
    pub fn push_event(&self, event: EventRecord) {
        self.state()
            .events
            .entry(event.contract.clone())
            .or_default()
            .push(event);
    }

    /// Fail the next `latest_block_number` call.
    pub fn fail_next_head(&self, reason: impl Into<String>) {
        self.state().head_failure = Some(Failure::Once(reason.into()));
    }

    /// Fail every `latest_block_number` call until [`Self::clear_failures`].
    pub fn fail_head(&self, reason: impl Into<String>) {
        self.state().head_failure = Some(Failure::Always(reason.into()));
    }

    /// Fail the next `get_logs` call for `contract`.
    pub fn fail_next_logs(&self, contract: &str, reason: impl Into<String>) {
        self.state()
            .log_failures
            .insert(contract.to_string(), Failure::Once(reason.into()));
    }

    /// Fail every `get_logs` call for `contract` until [`Self::clear_failures`].
    pub fn fail_logs(&self, contract: &str, reason: impl Into<String>) {
        self.state()
            .log_failures
            .insert(contract.to_string(), Failure::Always(reason.into()));
    }

    /// Delay every `get_logs` call by `latency` before it answers.
    pub fn set_log_latency(&self, latency: Duration) {
        self.state().log_latency = Some(latency);
    }

    pub fn clear_failures(&self) {
        let mut state = self.state();
        state.head_failure = None;
        state.log_failures.clear();
    }

    /// All `get_logs` calls seen so far, in call order.
    pub fn queries(&self) -> Vec<LogQuery> {
        self.state().queries.clone()
    }

    /// Number of `latest_block_number` calls seen so far.
    pub fn head_polls(&self) -> u64 {
        self.state().head_polls
    }
}

fn take_failure(slot: &mut Option<Failure>) -> Option<String> {
    match slot.take() {
        Some(Failure::Once(reason)) => Some(reason),
        Some(Failure::Always(reason)) => {
            *slot = Some(Failure::Always(reason.clone()));
            Some(reason)
        }
        None => None,
    }
}

#[async_trait]
impl LedgerClient for MemoryLedger {
    async fn latest_block_number(&self) -> Result<BlockNumber, WatchError> {
        let mut state = self.state();
        state.head_polls += 1;
        if let Some(reason) = take_failure(&mut state.head_failure) {
            return Err(WatchError::Ledger(reason));
        }
        Ok(state.latest)
    }

    async fn block_exists(&self, number: BlockNumber) -> Result<bool, WatchError> {
        let state = self.state();
        Ok(number <= state.latest && !state.hidden.contains(&number))
    }

    async fn get_logs(
        &self,
        contract: &ContractHandle,
        from: BlockNumber,
        to: BlockNumber,
    ) -> Result<Vec<EventRecord>, WatchError> {
        let latency = self.state().log_latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.state();
        state.queries.push(LogQuery {
            contract: contract.name.clone(),
            range: BlockRange { from, to },
        });

        let mut failure = state.log_failures.remove(&contract.name);
        if let Some(reason) = take_failure(&mut failure) {
            if let Some(kept) = failure {
                state.log_failures.insert(contract.name.clone(), kept);
            }
            return Err(WatchError::Ledger(reason));
        }

        let mut logs: Vec<EventRecord> = state
            .events
            .get(&contract.name)
            .map(|events| {
                events
                    .iter()
                    .filter(|e| from <= e.block_number && e.block_number <= to)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        logs.sort_by_key(|e| (e.block_number, e.log_index));
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token() -> ContractHandle {
        ContractHandle::new("Token", "0x0")
    }

    #[tokio::test]
    async fn logs_are_filtered_and_ordered() {
        let ledger = MemoryLedger::with_latest(10);
        ledger.push_event(EventRecord::new("Token", "Transfer", 9).with_log_index(1));
        ledger.push_event(EventRecord::new("Token", "Approval", 9));
        ledger.push_event(EventRecord::new("Token", "Transfer", 3));
        ledger.push_event(EventRecord::new("Other", "Transfer", 4));

        let logs = ledger.get_logs(&token(), 4, 10).await.unwrap();
        assert_eq!(logs.len(), 2);
        assert_eq!(logs[0].event, "Approval");
        assert_eq!(logs[1].log_index, 1);

        assert_eq!(
            ledger.queries(),
            vec![LogQuery {
                contract: "Token".into(),
                range: BlockRange { from: 4, to: 10 },
            }]
        );
    }

    #[tokio::test]
    async fn one_shot_failure_clears_itself() {
        let ledger = MemoryLedger::with_latest(5);
        ledger.fail_next_logs("Token", "connection reset");

        assert!(ledger.get_logs(&token(), 1, 5).await.is_err());
        assert!(ledger.get_logs(&token(), 1, 5).await.is_ok());
    }

    #[tokio::test]
    async fn persistent_head_failure() {
        let ledger = MemoryLedger::with_latest(5);
        ledger.fail_head("node down");
        assert!(ledger.latest_block_number().await.is_err());
        assert!(ledger.latest_block_number().await.is_err());

        ledger.clear_failures();
        assert_eq!(ledger.latest_block_number().await.unwrap(), 5);
        assert_eq!(ledger.head_polls(), 3);
    }

    #[tokio::test]
    async fn hidden_and_future_blocks_do_not_exist() {
        let ledger = MemoryLedger::with_latest(8);
        ledger.hide_block(8);
        assert!(!ledger.block_exists(8).await.unwrap());
        assert!(!ledger.block_exists(9).await.unwrap());
        ledger.reveal_block(8);
        assert!(ledger.block_exists(8).await.unwrap());
    }
}
