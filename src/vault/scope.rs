use super::Vault;
use crate::core::{Result, VaultError};
use crate::property::PropertyCell;
use crate::transaction::Transaction;
use std::sync::Arc;

/// Handle passed to an action body.
pub struct ActionScope<'a> {
    vault: &'a Vault,
    transaction: &'a Transaction,
}

impl<'a> ActionScope<'a> {
    pub(crate) fn new(vault: &'a Vault, transaction: &'a Transaction) -> Self {
        Self { vault, transaction }
    }

    pub fn vault(&self) -> &'a Vault {
        self.vault
    }

    pub fn transaction(&self) -> &'a Transaction {
        self.transaction
    }

    pub fn mutate<T>(&self, property: &Arc<PropertyCell<T>>, value: T) -> Result<()>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.vault.mutate(property, value)
    }

    /// Mutate with a value computed from the current one.
    ///
    /// `f` sees the same view as [`PropertyCell::read`], so on a cell with a
    /// transformer it receives `get(stored)` and its result goes through
    /// `set` again before being stored.
    pub fn update<T>(&self, property: &Arc<PropertyCell<T>>, f: impl FnOnce(&T) -> T) -> Result<()>
    where
        T: Clone + Send + Sync + 'static,
    {
        let next = f(&property.read());
        self.vault.mutate(property, next)
    }

    pub fn read<T>(&self, property: &Arc<PropertyCell<T>>) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        property.read()
    }

    /// Fail the action with a business-level reason.
    pub fn abort<R>(&self, reason: impl Into<String>) -> Result<R> {
        Err(VaultError::aborted(reason))
    }
}
