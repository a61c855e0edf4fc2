// ============================================================================
// Transaction Module
// ============================================================================
//
// All-or-nothing units of work over property cells.
//
// Design Patterns Used:
// - State Pattern: Transaction status (Active, Committed, RolledBack, Failed)
// - Memento Pattern: first-write value capture for rollback
// - Object Pool: recycled Transaction allocations
//
// ============================================================================

pub mod change;
pub mod pool;
pub mod state;

pub use change::ChangeRecord;
pub use pool::{PoolStats, TransactionPool};
pub use state::{Transaction, TransactionId, TransactionInfo, TransactionStatus};
