//! The watcher: lifecycle, scheduler loop and the per-cycle state machine.
//!
//! # Cycle
//!
//! ```text
//! Idle → Polling → Skipping  → Idle
//!                → Advancing → Idle
//! ```
//!
//! Polling reads the chain head and checks the head block can be served.
//! The confirmation gate then either skips the cycle or hands a block range
//! to the dispatcher. After dispatch the cursor is committed and the
//! cycle-complete observers fire, in that order. If `start` repositioned the
//! cursor while the cycle was dispatching, the commit is dropped and no
//! completion is reported for that range.
//!
//! # Scheduling
//!
//! One scheduler task per running watcher. Cycles never overlap: the next
//! sleep starts only once the previous cycle has settled, and `tick()` shares
//! the same cycle lock. `stop()` cancels the sleep; a cycle already running
//! is allowed to finish but nothing is scheduled after it. Each `start`
//! opens a new run generation; a loop from an older generation never touches
//! the run state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{StartOptions, WatcherConfig};
use crate::cursor::Cursor;
use crate::dispatcher::{CycleReport, Dispatcher};
use crate::error::{RegistrationError, WatchError};
use crate::gate::{GateDecision, SkipReason};
use crate::handler::EventHandler;
use crate::ledger::LedgerClient;
use crate::metrics::WatcherMetrics;
use crate::observer::{notify_complete, notify_error, CompleteFn, CycleObserver, ErrorFn};
use crate::policy::FailureAction;
use crate::registry::{ContractHandle, Registry};
use crate::types::{BlockRange, RunState};

/// Result of a single cycle.
#[derive(Debug, Clone)]
pub enum CycleOutcome {
    Completed(CycleReport),
    Skipped(SkipReason),
    /// Handlers ran, but the cursor was repositioned meanwhile and was left
    /// where `start` put it.
    Superseded(CycleReport),
}

impl CycleOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    /// The range the cursor advanced past, if any.
    pub fn range(&self) -> Option<BlockRange> {
        match self {
            Self::Completed(report) => Some(report.range),
            Self::Skipped(_) | Self::Superseded(_) => None,
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn read<T>(l: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    l.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(l: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    l.write().unwrap_or_else(PoisonError::into_inner)
}

/// Cursor plus a generation counter bumped whenever `start` repositions it,
/// so a cycle that began before the reposition does not overwrite it.
struct CursorSlot {
    cursor: Cursor,
    epoch: u64,
}

/// Run state plus the generation of the scheduler loop that owns it.
struct RunSlot {
    state: RunState,
    generation: u64,
}

struct Shared<L> {
    ledger: L,
    config: Mutex<WatcherConfig>,
    registry: RwLock<Registry>,
    cursor: Mutex<CursorSlot>,
    cycle: tokio::sync::Mutex<()>,
    observers: RwLock<Vec<Arc<dyn CycleObserver>>>,
    metrics: Mutex<WatcherMetrics>,
    run: Mutex<RunSlot>,
}

impl<L: LedgerClient> Shared<L> {
    fn observers(&self) -> Vec<Arc<dyn CycleObserver>> {
        read(&self.observers).clone()
    }

    fn ledger_failure(&self, error: WatchError) -> WatchError {
        lock(&self.metrics).ledger_errors += 1;
        tracing::error!(%error, "Ledger query failed");
        notify_error(&self.observers(), &error);
        error
    }

    fn skip(&self, reason: SkipReason) -> CycleOutcome {
        lock(&self.metrics).cycles_skipped += 1;
        tracing::debug!(%reason, "Skipping cycle");
        CycleOutcome::Skipped(reason)
    }

    async fn tick(&self) -> Result<CycleOutcome, WatchError> {
        let _cycle = self.cycle.lock().await;

        let (cursor, epoch) = {
            let slot = lock(&self.cursor);
            (slot.cursor, slot.epoch)
        };
        let gate = lock(&self.config).gate;

        let latest = self
            .ledger
            .latest_block_number()
            .await
            .map_err(|e| self.ledger_failure(e))?;
        let tip_exists = self
            .ledger
            .block_exists(latest)
            .await
            .map_err(|e| self.ledger_failure(e))?;
        if !tip_exists {
            return Ok(self.skip(SkipReason::UnconfirmedTip { latest }));
        }

        let (query, next) = match gate.evaluate(&cursor, latest) {
            GateDecision::Skip(reason) => return Ok(self.skip(reason)),
            GateDecision::Advance { query, next } => (query, next),
        };
        tracing::debug!(from = query.from, to = query.to, latest, "Polling block range");

        let snapshot = read(&self.registry).snapshot();
        let report = Dispatcher::new(&self.ledger)
            .run_cycle(&snapshot, query)
            .await
            .map_err(|e| self.ledger_failure(e))?;

        let committed = {
            let mut slot = lock(&self.cursor);
            slot.epoch == epoch && slot.cursor.commit(next)
        };
        {
            let mut metrics = lock(&self.metrics);
            if committed {
                metrics.cycles_completed += 1;
            }
            metrics.events_dispatched += report.dispatched as u64;
            metrics.handler_errors += report.failures.len() as u64;
        }

        let observers = self.observers();
        for failure in &report.failures {
            notify_error(&observers, &failure.to_error());
        }
        if !committed {
            tracing::warn!(%query, "Cursor repositioned during cycle; range not committed");
            return Ok(CycleOutcome::Superseded(report));
        }
        notify_complete(&observers, query);

        tracing::info!(
            from = query.from,
            to = query.to,
            events = report.events,
            dispatched = report.dispatched,
            failures = report.failures.len(),
            "Cycle complete"
        );
        Ok(CycleOutcome::Completed(report))
    }
}

async fn run_loop<L: LedgerClient + 'static>(
    shared: Arc<Shared<L>>,
    cancel: CancellationToken,
    generation: u64,
) -> Result<(), WatchError> {
    let mut failures = 0u32;
    loop {
        if cancel.is_cancelled() {
            break;
        }
        let (interval, policy) = {
            let config = lock(&shared.config);
            (config.poll_interval(), config.failure_policy)
        };

        let delay: Duration = match shared.tick().await {
            Ok(_) => {
                failures = 0;
                interval
            }
            Err(_) if cancel.is_cancelled() => break,
            Err(error) => {
                failures += 1;
                match policy.decide(failures) {
                    FailureAction::RetryAfter(delay) => {
                        let delay = delay.unwrap_or(interval);
                        tracing::warn!(
                            %error,
                            attempt = failures,
                            retry_in_ms = delay.as_millis() as u64,
                            "Cycle failed, retrying"
                        );
                        delay
                    }
                    FailureAction::Halt => {
                        let halted = WatchError::Halted {
                            attempts: failures,
                            reason: error.to_string(),
                        };
                        tracing::error!(%halted, "Halting watcher");
                        {
                            let mut run = lock(&shared.run);
                            if run.generation == generation {
                                run.state = RunState::Stopped;
                            }
                        }
                        notify_error(&shared.observers(), &halted);
                        return Err(halted);
                    }
                }
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    tracing::info!("Watcher loop stopped");
    Ok(())
}

/// Polls a ledger for contract events and dispatches them to subscribers.
pub struct Watcher<L: LedgerClient + 'static> {
    shared: Arc<Shared<L>>,
    cancel: Mutex<Option<CancellationToken>>,
    handle: Mutex<Option<JoinHandle<Result<(), WatchError>>>>,
}

impl<L: LedgerClient + 'static> Watcher<L> {
    pub fn new(ledger: L, config: WatcherConfig) -> Result<Self, WatchError> {
        config.validate()?;
        let cursor = config.gate.initial_cursor(config.resolved_start_block());
        Ok(Self {
            shared: Arc::new(Shared {
                ledger,
                config: Mutex::new(config),
                registry: RwLock::new(Registry::new()),
                cursor: Mutex::new(CursorSlot { cursor, epoch: 0 }),
                cycle: tokio::sync::Mutex::new(()),
                observers: RwLock::new(Vec::new()),
                metrics: Mutex::new(WatcherMetrics::default()),
                run: Mutex::new(RunSlot {
                    state: RunState::Stopped,
                    generation: 0,
                }),
            }),
            cancel: Mutex::new(None),
            handle: Mutex::new(None),
        })
    }

    pub fn ledger(&self) -> &L {
        &self.shared.ledger
    }

    // ─── Registry ────────────────────────────────────────────────────────────

    pub fn try_add_contract(&self, handle: ContractHandle) -> Result<(), RegistrationError> {
        write(&self.shared.registry).add_contract(handle)
    }

    /// Register a contract. Returns `false` if the name is already taken.
    pub fn add_contract(&self, handle: ContractHandle) -> bool {
        let name = handle.name.clone();
        match self.try_add_contract(handle) {
            Ok(()) => {
                tracing::info!(contract = %name, "Contract registered");
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot register contract");
                false
            }
        }
    }

    pub fn try_remove_contract(&self, name: &str) -> Result<(), RegistrationError> {
        write(&self.shared.registry).remove_contract(name)
    }

    /// Remove a contract and all of its subscriptions.
    pub fn remove_contract(&self, name: &str) -> bool {
        match self.try_remove_contract(name) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Cannot remove contract");
                false
            }
        }
    }

    pub fn try_subscribe(
        &self,
        contract: &str,
        event: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), RegistrationError> {
        write(&self.shared.registry).subscribe(contract, event, handler)
    }

    pub fn subscribe(&self, contract: &str, event: &str, handler: Arc<dyn EventHandler>) -> bool {
        match self.try_subscribe(contract, event, handler) {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(error = %e, "Cannot subscribe");
                false
            }
        }
    }

    pub fn try_unsubscribe(&self, contract: &str, event: &str) -> Result<(), RegistrationError> {
        write(&self.shared.registry).unsubscribe(contract, event)
    }

    pub fn unsubscribe(&self, contract: &str, event: &str) -> bool {
        match self.try_unsubscribe(contract, event) {
            Ok(()) => true,
            Err(e @ RegistrationError::NotSubscribed { .. }) => {
                tracing::warn!(error = %e, "Cannot unsubscribe");
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot unsubscribe");
                false
            }
        }
    }

    // ─── Observers ───────────────────────────────────────────────────────────

    pub fn add_observer(&self, observer: Arc<dyn CycleObserver>) {
        write(&self.shared.observers).push(observer);
    }

    /// Call `f(range)` after every completed cycle.
    pub fn on_cycle_complete<F>(&self, f: F)
    where
        F: Fn(BlockRange) + Send + Sync + 'static,
    {
        self.add_observer(Arc::new(CompleteFn(f)));
    }

    /// Call `f(error)` for handler failures, ledger failures and halts.
    pub fn on_error<F>(&self, f: F)
    where
        F: Fn(&WatchError) + Send + Sync + 'static,
    {
        self.add_observer(Arc::new(ErrorFn(f)));
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────────

    /// Run one cycle now. Waits for any cycle already in flight.
    ///
    /// Ledger failures are returned; the failure policy only applies to the
    /// scheduler loop.
    pub async fn tick(&self) -> Result<CycleOutcome, WatchError> {
        self.shared.tick().await
    }

    /// Start the scheduler loop. Must be called from within a Tokio runtime.
    ///
    /// The first cycle runs immediately. `from_block` repositions the cursor;
    /// otherwise polling resumes where the cursor stands, with the window
    /// resized if `blocks_to_read` changed it.
    pub fn start(&self, options: StartOptions) -> Result<(), WatchError> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| WatchError::Other(format!("start requires a Tokio runtime: {e}")))?;

        let mut cancel_slot = lock(&self.cancel);
        let generation = {
            let mut run = lock(&self.shared.run);
            if run.state == RunState::Running {
                return Err(WatchError::AlreadyRunning);
            }

            let mut config = lock(&self.shared.config);
            let mut updated = config.clone();
            options.apply(&mut updated)?;
            *config = updated;

            let mut slot = lock(&self.shared.cursor);
            let from = options.from_block.unwrap_or(slot.cursor.from_block());
            let repositioned = config.gate.initial_cursor(from);
            let resized = repositioned.range().len() != slot.cursor.range().len();
            if options.from_block.is_some() || resized {
                slot.cursor = repositioned;
                slot.epoch += 1;
            }

            run.state = RunState::Running;
            run.generation += 1;
            run.generation
        };

        let cursor = self.cursor();
        tracing::info!(%cursor, generation, "Starting watcher");

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(run_loop(
            Arc::clone(&self.shared),
            cancel.clone(),
            generation,
        ));
        *cancel_slot = Some(cancel);
        *lock(&self.handle) = Some(handle);
        Ok(())
    }

    /// Stop scheduling cycles. A cycle in flight completes; no further cycle
    /// starts.
    pub fn stop(&self) {
        if let Some(cancel) = lock(&self.cancel).take() {
            tracing::info!("Stopping watcher");
            cancel.cancel();
        }
        lock(&self.shared.run).state = RunState::Stopped;
    }

    /// Wait for the scheduler task to end.
    ///
    /// Returns [`WatchError::Halted`] if the failure policy stopped it.
    pub async fn wait(&self) -> Result<(), WatchError> {
        let handle = lock(&self.handle).take();
        match handle {
            None => Ok(()),
            Some(handle) => handle
                .await
                .map_err(|e| WatchError::Other(format!("scheduler task failed: {e}")))?,
        }
    }

    pub fn state(&self) -> RunState {
        lock(&self.shared.run).state
    }

    pub fn cursor(&self) -> Cursor {
        lock(&self.shared.cursor).cursor
    }

    pub fn metrics(&self) -> WatcherMetrics {
        lock(&self.shared.metrics).clone()
    }

    pub fn config(&self) -> WatcherConfig {
        lock(&self.shared.config).clone()
    }
}

impl<L: LedgerClient + 'static> Drop for Watcher<L> {
    fn drop(&mut self) {
        if let Some(cancel) = lock(&self.cancel).take() {
            cancel.cancel();
        }
    }
}
