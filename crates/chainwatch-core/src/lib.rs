//! chainwatch-core: block-range cursor and event dispatch engine.
//!
//! # Architecture
//!
//! ```text
//! Watcher::start → scheduler loop (one cycle in flight, cancellable sleep)
//!                      ├── LedgerClient      (latest height, tip check, logs)
//!                      ├── ConfirmationGate  (tip / confirmed-range policy)
//!                      ├── Cursor            (last committed block range)
//!                      ├── Registry          (contracts → event → handler)
//!                      ├── Dispatcher        (query + isolated handler fan-out)
//!                      ├── FailurePolicy     (halt / skip / backoff)
//!                      └── CycleObserver     (cycle-complete + error reports)
//! ```

pub mod config;
pub mod cursor;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod handler;
pub mod ledger;
pub mod memory;
pub mod metrics;
pub mod observer;
pub mod policy;
pub mod registry;
pub mod types;
pub mod watcher;

pub use config::{StartOptions, WatcherBuilder, WatcherConfig};
pub use cursor::Cursor;
pub use dispatcher::{CycleReport, Dispatcher, HandlerFailure};
pub use error::{RegistrationError, WatchError};
pub use gate::{ConfirmationGate, GateDecision, SkipReason};
pub use handler::{async_handler_fn, handler_fn, EventHandler};
pub use ledger::LedgerClient;
pub use memory::MemoryLedger;
pub use metrics::WatcherMetrics;
pub use observer::CycleObserver;
pub use policy::{FailureAction, FailurePolicy, RetryConfig};
pub use registry::{ContractHandle, Registry, RegistrySnapshot};
pub use types::{BlockNumber, BlockRange, EventRecord, RunState};
pub use watcher::{CycleOutcome, Watcher};
