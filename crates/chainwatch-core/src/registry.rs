//! Registry of watched contracts and their event subscriptions.
//!
//! Each contract owns a map `event name → handler`. The map lives and dies with
//! the contract entry, so a subscription can never outlive its contract.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::RegistrationError;
use crate::handler::EventHandler;

/// A contract the watcher queries logs for.
///
/// Identity is `name`; `address` is handed back to the ledger client untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractHandle {
    pub name: String,
    pub address: String,
    /// Events the contract declares. Empty means "accept any event name".
    #[serde(default)]
    pub events: BTreeSet<String>,
}

impl ContractHandle {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            events: BTreeSet::new(),
        }
    }

    /// Declare the events this contract can emit.
    pub fn with_events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events.extend(events.into_iter().map(Into::into));
        self
    }

    /// Returns `true` if `event` may be subscribed on this contract.
    pub fn declares(&self, event: &str) -> bool {
        self.events.is_empty() || self.events.contains(event)
    }
}

struct ContractEntry {
    handle: Arc<ContractHandle>,
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

/// Mutable registry of contracts and handlers.
#[derive(Default)]
pub struct Registry {
    contracts: HashMap<String, ContractEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a contract. A duplicate name leaves the first registration intact.
    pub fn add_contract(&mut self, handle: ContractHandle) -> Result<(), RegistrationError> {
        if self.contracts.contains_key(&handle.name) {
            return Err(RegistrationError::AlreadyRegistered(handle.name));
        }
        self.contracts.insert(
            handle.name.clone(),
            ContractEntry {
                handle: Arc::new(handle),
                handlers: HashMap::new(),
            },
        );
        Ok(())
    }

    /// Remove a contract together with all of its subscriptions.
    pub fn remove_contract(&mut self, name: &str) -> Result<(), RegistrationError> {
        self.contracts
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| RegistrationError::NotRegistered(name.to_string()))
    }

    /// Route `event` on `contract` to `handler`, replacing any previous handler.
    pub fn subscribe(
        &mut self,
        contract: &str,
        event: &str,
        handler: Arc<dyn EventHandler>,
    ) -> Result<(), RegistrationError> {
        let entry = self.contracts.get_mut(contract).ok_or_else(|| {
            RegistrationError::ContractNotRegistered {
                contract: contract.to_string(),
                event: event.to_string(),
            }
        })?;
        if !entry.handle.declares(event) {
            return Err(RegistrationError::UnknownEvent {
                contract: contract.to_string(),
                event: event.to_string(),
            });
        }
        entry.handlers.insert(event.to_string(), handler);
        Ok(())
    }

    pub fn unsubscribe(&mut self, contract: &str, event: &str) -> Result<(), RegistrationError> {
        let entry = self.contracts.get_mut(contract).ok_or_else(|| {
            RegistrationError::ContractNotRegistered {
                contract: contract.to_string(),
                event: event.to_string(),
            }
        })?;
        entry
            .handlers
            .remove(event)
            .map(|_| ())
            .ok_or_else(|| RegistrationError::NotSubscribed {
                contract: contract.to_string(),
                event: event.to_string(),
            })
    }

    pub fn contains(&self, contract: &str) -> bool {
        self.contracts.contains_key(contract)
    }

    pub fn is_subscribed(&self, contract: &str, event: &str) -> bool {
        self.contracts
            .get(contract)
            .is_some_and(|e| e.handlers.contains_key(event))
    }

    /// Number of registered contracts.
    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Freeze the current contracts and handlers for one poll cycle.
    pub fn snapshot(&self) -> RegistrySnapshot {
        let contracts = self
            .contracts
            .values()
            .map(|entry| ContractView {
                handle: entry.handle.clone(),
                handlers: entry.handlers.clone(),
            })
            .collect();
        RegistrySnapshot { contracts }
    }
}

/// Immutable view of one contract inside a [`RegistrySnapshot`].
#[derive(Clone)]
pub struct ContractView {
    pub handle: Arc<ContractHandle>,
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl ContractView {
    pub fn handler(&self, event: &str) -> Option<&Arc<dyn EventHandler>> {
        self.handlers.get(event)
    }
}

/// Point-in-time copy of the registry.
///
/// Later registry mutations do not show up here, so a cycle always works on
/// one consistent set of contracts and handlers.
#[derive(Clone, Default)]
pub struct RegistrySnapshot {
    contracts: Vec<ContractView>,
}

impl RegistrySnapshot {
    pub fn contracts(&self) -> &[ContractView] {
        &self.contracts
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}
