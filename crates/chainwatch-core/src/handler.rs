//! Event handler trait and closure adapters.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::WatchError;
use crate::types::EventRecord;

/// Trait for user-provided event handlers.
///
/// A handler is subscribed to one `(contract, event)` pair and receives every
/// matching record in ledger order. Returning `Err` (or panicking) is reported
/// through the watcher's error observers and never affects other handlers.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &EventRecord) -> Result<(), WatchError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&EventRecord) -> Result<(), WatchError> + Send + Sync,
{
    async fn handle(&self, event: &EventRecord) -> Result<(), WatchError> {
        (self.0)(event)
    }
}

struct AsyncFnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for AsyncFnHandler<F>
where
    F: Fn(EventRecord) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), WatchError>> + Send,
{
    async fn handle(&self, event: &EventRecord) -> Result<(), WatchError> {
        (self.0)(event.clone()).await
    }
}

/// Wrap a synchronous closure as an [`EventHandler`].
pub fn handler_fn<F>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(&EventRecord) -> Result<(), WatchError> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}

/// Wrap a closure returning a future as an [`EventHandler`].
///
/// The closure receives an owned copy of the record so the future can be
/// `'static`.
pub fn async_handler_fn<F, Fut>(f: F) -> Arc<dyn EventHandler>
where
    F: Fn(EventRecord) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), WatchError>> + Send + 'static,
{
    Arc::new(AsyncFnHandler(f))
}
