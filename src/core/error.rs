use std::any::Any;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VaultError {
    #[error("Validation failed for '{property}': {reason}")]
    Validation { property: String, reason: String },

    #[error("Action aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),

    #[error("Illegal use: {0}")]
    IllegalUse(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Rollback of {transaction} failed while restoring '{property}': {reason}")]
    RollbackFailed {
        transaction: String,
        property: String,
        reason: String,
    },

    #[error("Lock error: {0}")]
    Lock(String),

    #[error("Property '{property}' is not of type {expected}")]
    TypeMismatch {
        property: String,
        expected: &'static str,
    },

    #[error("Property '{0}' not found")]
    UnknownProperty(String),

    #[error("Bridge error: {0}")]
    Bridge(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Execution error: {0}")]
    Execution(String),
}

impl VaultError {
    pub fn validation(property: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            property: property.into(),
            reason: reason.into(),
        }
    }

    pub fn aborted(reason: impl Into<String>) -> Self {
        Self::Aborted(reason.into())
    }

    /// Fatal errors signal misuse or a broken transaction log. They escape
    /// `Vault::action` as `Err` instead of becoming an `ActionResult::Error`.
    pub fn is_fatal(&self) -> bool {
        match self {
            VaultError::Validation { .. }
            | VaultError::Aborted(_)
            | VaultError::Other(_)
            | VaultError::Bridge(_) => false,
            VaultError::IllegalUse(_)
            | VaultError::Transaction(_)
            | VaultError::RollbackFailed { .. }
            | VaultError::Lock(_)
            | VaultError::TypeMismatch { .. }
            | VaultError::UnknownProperty(_)
            | VaultError::Config(_)
            | VaultError::Execution(_) => true,
        }
    }
}

pub type Result<T> = std::result::Result<T, VaultError>;

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl<T> From<std::sync::PoisonError<T>> for VaultError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Lock(err.to_string())
    }
}
