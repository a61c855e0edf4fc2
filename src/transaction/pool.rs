use super::Transaction;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

/// Transaction pool
///
/// Recycles `Transaction` allocations between actions. A released
/// transaction is cleared so it does not keep property cells or logged
/// values alive while it waits in the pool.
#[derive(Debug)]
pub struct TransactionPool {
    /// Maximum number of idle transactions kept
    capacity: usize,
    /// Idle transactions
    available: Mutex<Vec<Transaction>>,
    /// Transactions allocated because the pool was empty
    created: AtomicU64,
    /// Transactions served from the pool
    reused: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub available: usize,
    pub capacity: usize,
    pub created: u64,
    pub reused: u64,
}

impl TransactionPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            available: Mutex::new(Vec::with_capacity(capacity)),
            created: AtomicU64::new(0),
            reused: AtomicU64::new(0),
        }
    }

    /// Hand out a fresh transaction, reusing an idle one when possible.
    pub fn acquire(&self) -> Transaction {
        let recycled = self
            .available
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop();

        match recycled {
            Some(mut txn) => {
                txn.reset();
                self.reused.fetch_add(1, Ordering::Relaxed);
                txn
            }
            None => {
                self.created.fetch_add(1, Ordering::Relaxed);
                Transaction::new()
            }
        }
    }

    /// Return a finished transaction. Dropped when the pool is full.
    pub fn release(&self, mut txn: Transaction) {
        if self.capacity == 0 {
            return;
        }

        txn.clear();
        let mut available = self.available.lock().unwrap_or_else(PoisonError::into_inner);
        if available.len() < self.capacity {
            available.push(txn);
        }
    }

    /// Return a shared transaction if this is the last handle to it.
    pub(crate) fn recycle(&self, txn: Arc<Transaction>) {
        if let Ok(txn) = Arc::try_unwrap(txn) {
            self.release(txn);
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            available: self
                .available
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
            capacity: self.capacity,
            created: self.created.load(Ordering::Relaxed),
            reused: self.reused.load(Ordering::Relaxed),
        }
    }
}
