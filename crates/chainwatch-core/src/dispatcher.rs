//! Dispatcher: one query-and-dispatch pass over a block range.
//!
//! 1. `get_logs` for every contract in the snapshot, concurrently. If any
//!    query fails, the cycle fails before a single handler runs.
//! 2. Contracts are dispatched concurrently; the events of one contract go to
//!    their handlers one at a time, in ledger order.
//! 3. A handler error or panic is recorded and dispatch moves on. By the time
//!    `run_cycle` returns, every handler call it started has finished.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures::future::{join_all, try_join_all};
use futures::FutureExt;
use serde::Serialize;

use crate::error::WatchError;
use crate::ledger::LedgerClient;
use crate::registry::{ContractView, RegistrySnapshot};
use crate::types::{BlockNumber, BlockRange, EventRecord};

/// A handler call that returned an error or panicked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HandlerFailure {
    pub contract: String,
    pub event: String,
    pub block_number: BlockNumber,
    pub reason: String,
}

impl HandlerFailure {
    pub fn to_error(&self) -> WatchError {
        WatchError::handler(&self.contract, &self.event, &self.reason)
    }
}

/// Summary of a completed cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub range: BlockRange,
    /// Events returned by the ledger across all contracts.
    pub events: usize,
    /// Events that had a subscribed handler.
    pub dispatched: usize,
    pub failures: Vec<HandlerFailure>,
    /// Unix timestamp of when dispatch finished.
    pub completed_at: i64,
}

/// Runs cycles against a ledger client.
pub struct Dispatcher<'a, L: ?Sized> {
    ledger: &'a L,
}

impl<'a, L: LedgerClient + ?Sized> Dispatcher<'a, L> {
    pub fn new(ledger: &'a L) -> Self {
        Self { ledger }
    }

    /// Query and dispatch every contract in `snapshot` over `range`.
    pub async fn run_cycle(
        &self,
        snapshot: &RegistrySnapshot,
        range: BlockRange,
    ) -> Result<CycleReport, WatchError> {
        let ledger = self.ledger;
        let queries = snapshot.contracts().iter().map(|view| async move {
            let logs = ledger.get_logs(&view.handle, range.from, range.to).await?;
            Ok::<_, WatchError>((view, logs))
        });
        let fetched = try_join_all(queries).await.map_err(|e| {
            tracing::error!(%range, error = %e, "Log query failed, cycle abandoned");
            e
        })?;

        let events = fetched.iter().map(|(_, logs)| logs.len()).sum();
        let outcomes = join_all(
            fetched
                .into_iter()
                .map(|(view, logs)| dispatch_contract(view, logs)),
        )
        .await;

        let mut dispatched = 0;
        let mut failures = Vec::new();
        for (count, mut failed) in outcomes {
            dispatched += count;
            failures.append(&mut failed);
        }

        Ok(CycleReport {
            range,
            events,
            dispatched,
            failures,
            completed_at: chrono::Utc::now().timestamp(),
        })
    }
}

async fn dispatch_contract(
    view: &ContractView,
    logs: Vec<EventRecord>,
) -> (usize, Vec<HandlerFailure>) {
    let contract = view.handle.name.as_str();
    let mut dispatched = 0;
    let mut failures = Vec::new();

    for log in logs {
        tracing::info!(
            contract,
            event = %log.event,
            block = log.block_number,
            log_index = log.log_index,
            "Event received"
        );
        let Some(handler) = view.handler(&log.event) else {
            continue;
        };
        dispatched += 1;

        let reason = match AssertUnwindSafe(handler.handle(&log)).catch_unwind().await {
            Ok(Ok(())) => continue,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("handler panicked: {}", panic_message(panic.as_ref())),
        };
        tracing::error!(
            contract,
            event = %log.event,
            block = log.block_number,
            %reason,
            "Handler failed to process event"
        );
        failures.push(HandlerFailure {
            contract: contract.to_string(),
            event: log.event.clone(),
            block_number: log.block_number,
            reason,
        });
    }
    (dispatched, failures)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s
    } else {
        "unknown panic"
    }
}
