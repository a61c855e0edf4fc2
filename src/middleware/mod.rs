// ============================================================================
// Middleware
// ============================================================================
//
// Interceptors wrapped around each transaction's unit of work. Hooks are
// side-effecting observers: they see the outcome but cannot change it.
//
// ============================================================================

pub mod builtin;
pub mod chain;

pub use builtin::{TimingMiddleware, TimingStats, TracingMiddleware};
pub use chain::MiddlewareChain;

use crate::core::VaultError;
use crate::transaction::Transaction;
use crate::vault::Vault;
use serde_json::Value;
use std::collections::HashMap;

pub trait Middleware: Send + Sync {
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn on_start(&self, _ctx: &mut MiddlewareContext<'_>) {}

    fn on_complete(&self, _ctx: &mut MiddlewareContext<'_>) {}

    fn on_error(&self, _ctx: &mut MiddlewareContext<'_>, _error: &VaultError) {}
}

/// Progress of one transaction through the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MiddlewarePhase {
    NotStarted,
    Started,
    Completed,
    Errored,
}

/// Scratch space scoped to a single transaction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Metadata {
    entries: HashMap<String, Value>,
}

impl Metadata {
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.entries.remove(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// What a hook can see. Valid only for the duration of the hook call.
pub struct MiddlewareContext<'a> {
    vault: &'a Vault,
    transaction: &'a Transaction,
    pub metadata: Metadata,
    phase: MiddlewarePhase,
}

impl<'a> MiddlewareContext<'a> {
    pub(crate) fn new(vault: &'a Vault, transaction: &'a Transaction) -> Self {
        Self {
            vault,
            transaction,
            metadata: Metadata::default(),
            phase: MiddlewarePhase::NotStarted,
        }
    }

    pub fn vault(&self) -> &'a Vault {
        self.vault
    }

    pub fn transaction(&self) -> &'a Transaction {
        self.transaction
    }

    pub fn phase(&self) -> MiddlewarePhase {
        self.phase
    }

    pub(crate) fn set_phase(&mut self, phase: MiddlewarePhase) {
        debug_assert!(
            matches!(
                (self.phase, phase),
                (MiddlewarePhase::NotStarted, MiddlewarePhase::Started)
                    | (MiddlewarePhase::Started, MiddlewarePhase::Completed)
                    | (MiddlewarePhase::Started, MiddlewarePhase::Errored)
            ),
            "invalid middleware phase transition {:?} -> {:?}",
            self.phase,
            phase
        );
        self.phase = phase;
    }
}
