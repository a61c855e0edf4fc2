// ============================================================================
// Transaction State Management
// ============================================================================
//
// A transaction is an append-only change log plus a terminal status.
//
// State transitions:
//   Active ──commit────> Committed
//     ├────rollback──> RolledBack
//     └────rollback──> Failed      (a logged value could not be restored)
//
// The log keeps, per property, the raw value observed before the
// transaction's first write to it. Later writes to the same property
// leave that entry untouched.
//
// ============================================================================

use super::ChangeRecord;
use crate::core::{Result, VaultError};
use crate::property::TrackedCell;
use crate::vault::PropertyRegistry;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{Level, event};

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TransactionId(u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Active,
    Committed,
    RolledBack,
    Failed,
}

impl TransactionStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionStatus::Active)
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionStatus::Active => write!(f, "ACTIVE"),
            TransactionStatus::Committed => write!(f, "COMMITTED"),
            TransactionStatus::RolledBack => write!(f, "ROLLED_BACK"),
            TransactionStatus::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Default)]
struct ChangeLog {
    status: TransactionStatus,
    records: Vec<ChangeRecord>,
    /// Set while rollback restores values; blocks re-recording.
    restoring: bool,
    /// Set when a nested action failed; the transaction may no longer commit.
    abort_reason: Option<String>,
}

/// Point-in-time description of a transaction, handed back to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionInfo {
    pub id: TransactionId,
    pub status: TransactionStatus,
    /// Properties written by the transaction, in first-write order.
    pub modified: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    started_at: DateTime<Utc>,
    start_time: Instant,
    log: Mutex<ChangeLog>,
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            id: TransactionId::new(),
            started_at: Utc::now(),
            start_time: Instant::now(),
            log: Mutex::new(ChangeLog::default()),
        }
    }

    /// Prepare a recycled transaction for another unit of work.
    pub(crate) fn reset(&mut self) {
        self.id = TransactionId::new();
        self.started_at = Utc::now();
        self.start_time = Instant::now();
        let log = self.log.get_mut().unwrap_or_else(PoisonError::into_inner);
        log.status = TransactionStatus::Active;
        log.records.clear();
        log.restoring = false;
        log.abort_reason = None;
    }

    /// Drop the logged values so a pooled transaction holds no cells.
    pub(crate) fn clear(&mut self) {
        self.log
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .clear();
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn status(&self) -> TransactionStatus {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .status
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn duration(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Names of the properties written so far, in first-write order.
    pub fn modified(&self) -> Vec<String> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .iter()
            .map(|record| record.property().to_string())
            .collect()
    }

    pub fn change_count(&self) -> usize {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .records
            .len()
    }

    pub fn is_rollback_only(&self) -> bool {
        self.abort_reason().is_some()
    }

    pub fn abort_reason(&self) -> Option<String> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .abort_reason
            .clone()
    }

    /// Forbid commit. The first reason is kept.
    pub(crate) fn mark_rollback_only(&self, reason: impl Into<String>) {
        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        if log.abort_reason.is_none() {
            log.abort_reason = Some(reason.into());
        }
    }

    pub fn info(&self) -> TransactionInfo {
        TransactionInfo {
            id: self.id,
            status: self.status(),
            modified: self.modified(),
            started_at: self.started_at,
            duration: self.duration(),
        }
    }

    /// Log the cell's current value unless the cell was already logged.
    ///
    /// Returns `true` when a new entry was recorded.
    ///
    /// # Errors
    /// Returns `VaultError::Transaction` if the transaction is no longer active.
    pub(crate) fn record_first_change(&self, cell: &Arc<dyn TrackedCell>) -> Result<bool> {
        let mut log = self.log.lock()?;

        if !log.status.is_active() || log.restoring {
            return Err(VaultError::Transaction(format!(
                "Cannot record change to '{}': transaction {} is {}",
                cell.name(),
                self.id,
                if log.restoring { "rolling back".to_string() } else { log.status.to_string() }
            )));
        }

        if log.records.iter().any(|record| record.is_for(cell)) {
            return Ok(false);
        }

        log.records.push(ChangeRecord::capture(cell));
        Ok(true)
    }

    /// Append an already captured record, bypassing first-write detection.
    #[cfg(test)]
    pub(crate) fn push_record(&self, record: ChangeRecord) -> Result<()> {
        let mut log = self.log.lock()?;
        if !log.status.is_active() {
            return Err(VaultError::Transaction(format!(
                "Cannot record change: transaction {} is {}",
                self.id, log.status
            )));
        }
        log.records.push(record);
        Ok(())
    }

    /// Mark the transaction as committed.
    ///
    /// # Errors
    /// Returns `VaultError::Transaction` if the transaction is not active or
    /// touched a cell that `registry` does not know.
    pub fn commit(&self, registry: &PropertyRegistry) -> Result<()> {
        let mut log = self.log.lock()?;

        if !log.status.is_active() || log.restoring {
            return Err(VaultError::Transaction(format!(
                "Cannot commit: transaction {} is already {}",
                self.id, log.status
            )));
        }

        if let Some(stray) = log
            .records
            .iter()
            .find(|record| !registry.recognizes(record.property(), record.cell()))
        {
            return Err(VaultError::Transaction(format!(
                "Cannot commit {}: property '{}' is not registered with this vault",
                self.id,
                stray.property()
            )));
        }

        log.status = TransactionStatus::Committed;
        Ok(())
    }

    /// Restore every logged property to its pre-transaction value.
    ///
    /// Restoring bypasses validation and transformation. A restore failure
    /// does not stop the remaining restores; the transaction ends `Failed`
    /// and the first failure is returned.
    ///
    /// # Errors
    /// `VaultError::Transaction` if the transaction is not active,
    /// `VaultError::RollbackFailed` if a value could not be restored.
    pub fn rollback(&self) -> Result<()> {
        let records = {
            let mut log = self.log.lock()?;
            if !log.status.is_active() || log.restoring {
                return Err(VaultError::Transaction(format!(
                    "Cannot rollback: transaction {} is already {}",
                    self.id, log.status
                )));
            }
            log.restoring = true;
            std::mem::take(&mut log.records)
        };

        // Restores run without the log lock: observers notified by a
        // restore may inspect this transaction.
        let mut failure: Option<(String, String)> = None;
        for record in records.iter().rev() {
            let reason = match catch_unwind(AssertUnwindSafe(|| record.restore())) {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => err.to_string(),
                Err(_) => "restore panicked".to_string(),
            };
            event!(
                Level::ERROR,
                transaction = %self.id,
                property = record.property(),
                reason = %reason,
                "failed to restore property during rollback"
            );
            if failure.is_none() {
                failure = Some((record.property().to_string(), reason));
            }
        }

        let mut log = self.log.lock().unwrap_or_else(PoisonError::into_inner);
        log.records = records;
        log.restoring = false;

        match failure {
            None => {
                log.status = TransactionStatus::RolledBack;
                Ok(())
            }
            Some((property, reason)) => {
                log.status = TransactionStatus::Failed;
                Err(VaultError::RollbackFailed {
                    transaction: self.id.to_string(),
                    property,
                    reason,
                })
            }
        }
    }
}
