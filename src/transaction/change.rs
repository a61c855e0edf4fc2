// ============================================================================
// Transaction Change Record
// ============================================================================
//
// One entry of the change log: the property touched by a transaction and
// the raw value it held before the transaction's first write to it.
//
// ============================================================================

use crate::core::Result;
use crate::property::TrackedCell;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

pub struct ChangeRecord {
    cell: Arc<dyn TrackedCell>,
    prior: Box<dyn Any + Send + Sync>,
}

impl ChangeRecord {
    pub(crate) fn new(cell: Arc<dyn TrackedCell>, prior: Box<dyn Any + Send + Sync>) -> Self {
        Self { cell, prior }
    }

    pub(crate) fn capture(cell: &Arc<dyn TrackedCell>) -> Self {
        Self::new(Arc::clone(cell), cell.snapshot())
    }

    pub fn property(&self) -> &str {
        self.cell.name()
    }

    pub(crate) fn cell(&self) -> &Arc<dyn TrackedCell> {
        &self.cell
    }

    pub(crate) fn is_for(&self, cell: &Arc<dyn TrackedCell>) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.cell), Arc::as_ptr(cell))
    }

    /// Put the logged value back into the cell.
    pub(crate) fn restore(&self) -> Result<()> {
        self.cell.restore(self.prior.as_ref())
    }
}

impl fmt::Debug for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeRecord")
            .field("property", &self.property())
            .finish_non_exhaustive()
    }
}
