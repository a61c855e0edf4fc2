use crate::core::{Result, VaultError};
use crate::transaction::{PoolStats, TransactionInfo};

/// Outcome of [`Vault::action`](super::Vault::action).
///
/// Business failures (validation, aborts, foreign errors) land in
/// `Error` after the transaction was rolled back. Misuse and broken
/// transaction logs never appear here; they are returned as `Err` by
/// `action` itself.
#[derive(Debug)]
pub enum ActionResult<R> {
    Success {
        value: R,
        transaction: TransactionInfo,
    },
    Error {
        cause: VaultError,
        transaction: TransactionInfo,
    },
}

impl<R> ActionResult<R> {
    pub fn is_success(&self) -> bool {
        matches!(self, ActionResult::Success { .. })
    }

    pub fn is_error(&self) -> bool {
        !self.is_success()
    }

    pub fn transaction(&self) -> &TransactionInfo {
        match self {
            ActionResult::Success { transaction, .. } | ActionResult::Error { transaction, .. } => {
                transaction
            }
        }
    }

    pub fn value(&self) -> Option<&R> {
        match self {
            ActionResult::Success { value, .. } => Some(value),
            ActionResult::Error { .. } => None,
        }
    }

    pub fn cause(&self) -> Option<&VaultError> {
        match self {
            ActionResult::Success { .. } => None,
            ActionResult::Error { cause, .. } => Some(cause),
        }
    }

    /// Collapse into a plain `Result`, dropping the transaction info.
    pub fn into_result(self) -> Result<R> {
        match self {
            ActionResult::Success { value, .. } => Ok(value),
            ActionResult::Error { cause, .. } => Err(cause),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(R) -> U) -> ActionResult<U> {
        match self {
            ActionResult::Success { value, transaction } => ActionResult::Success {
                value: f(value),
                transaction,
            },
            ActionResult::Error { cause, transaction } => ActionResult::Error { cause, transaction },
        }
    }
}

/// Counters kept by a vault since it was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultStats {
    pub commits: u64,
    pub rollbacks: u64,
    /// Rollbacks that could not restore every property
    pub failures: u64,
    /// Actions that joined an already active transaction
    pub nested: u64,
    pub pool: PoolStats,
}
