//! Cycle observers: completion and error notifications.
//!
//! Observers are kept in a list; adding one never replaces another.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::WatchError;
use crate::types::BlockRange;

/// Receives watcher notifications. Both methods default to no-ops.
pub trait CycleObserver: Send + Sync {
    /// Called once per completed cycle, after the cursor has moved past `range`.
    fn on_cycle_complete(&self, _range: BlockRange) {}

    /// Called for handler failures, ledger failures and a policy halt.
    fn on_error(&self, _error: &WatchError) {}
}

pub(crate) struct CompleteFn<F>(pub F);

impl<F> CycleObserver for CompleteFn<F>
where
    F: Fn(BlockRange) + Send + Sync,
{
    fn on_cycle_complete(&self, range: BlockRange) {
        (self.0)(range)
    }
}

pub(crate) struct ErrorFn<F>(pub F);

impl<F> CycleObserver for ErrorFn<F>
where
    F: Fn(&WatchError) + Send + Sync,
{
    fn on_error(&self, error: &WatchError) {
        (self.0)(error)
    }
}

pub(crate) fn notify_complete(observers: &[Arc<dyn CycleObserver>], range: BlockRange) {
    for observer in observers {
        if catch_unwind(AssertUnwindSafe(|| observer.on_cycle_complete(range))).is_err() {
            tracing::error!(%range, "Cycle observer panicked");
        }
    }
}

pub(crate) fn notify_error(observers: &[Arc<dyn CycleObserver>], error: &WatchError) {
    for observer in observers {
        if catch_unwind(AssertUnwindSafe(|| observer.on_error(error))).is_err() {
            tracing::error!(%error, "Error observer panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn observers_accumulate_and_survive_panics() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = seen.clone();
        let observers: Vec<Arc<dyn CycleObserver>> = vec![
            Arc::new(CompleteFn(|_: BlockRange| panic!("observer bug"))),
            Arc::new(CompleteFn(move |r: BlockRange| s.lock().unwrap().push(r))),
        ];

        notify_complete(&observers, BlockRange { from: 1, to: 2 });
        assert_eq!(*seen.lock().unwrap(), vec![BlockRange { from: 1, to: 2 }]);
    }

    #[test]
    fn error_observer_ignores_completions() {
        let errors = Arc::new(Mutex::new(0));
        let e = errors.clone();
        let observers: Vec<Arc<dyn CycleObserver>> =
            vec![Arc::new(ErrorFn(move |_: &WatchError| *e.lock().unwrap() += 1))];

        notify_complete(&observers, BlockRange { from: 1, to: 1 });
        notify_error(&observers, &WatchError::Ledger("down".into()));
        assert_eq!(*errors.lock().unwrap(), 1);
    }
}
