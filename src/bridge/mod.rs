// ============================================================================
// Bridges
// ============================================================================
//
// A bridge links one property cell to an external data source in both
// directions:
// - outbound: every stored write is handed to `publish`
// - inbound: values produced externally are pushed through an
//   `ExternalSink`, which updates the cell without recording them in a
//   transaction and without echoing them back out
//
// Inbound writes are therefore not rollback-safe.
//
// ============================================================================

pub mod channel;
pub mod memory;

pub use channel::ChannelBridge;
pub use memory::MemoryBridge;

use crate::core::{Result, VaultError};
use crate::property::{PropertyCell, Subscription};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

/// External duplex data source bound to a property.
pub trait Bridge<T>: Send + Sync {
    /// Push a stored value outward. `Ok(false)` means the value was declined.
    fn publish(&self, value: &T) -> Result<bool>;

    /// Subscribe a cell to values produced on the external side.
    fn observe(&self, sink: ExternalSink<T>) -> Subscription;
}

/// Inbound write handle for one property cell.
pub struct ExternalSink<T> {
    cell: Weak<PropertyCell<T>>,
}

impl<T> ExternalSink<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new(cell: Weak<PropertyCell<T>>) -> Self {
        Self { cell }
    }

    pub fn push(&self, value: T) -> Result<()> {
        let cell = self
            .cell
            .upgrade()
            .ok_or_else(|| VaultError::Bridge("target property no longer exists".into()))?;
        cell.external_write(value)
    }

    pub fn property_name(&self) -> Option<String> {
        self.cell.upgrade().map(|cell| cell.name().to_string())
    }

    pub fn is_connected(&self) -> bool {
        self.cell.strong_count() > 0
    }
}

impl<T> Clone for ExternalSink<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Weak::clone(&self.cell),
        }
    }
}

/// Sink registry shared by the bundled bridge implementations.
pub(crate) struct SinkSet<T> {
    sinks: Arc<Mutex<Vec<(u64, ExternalSink<T>)>>>,
    next_id: AtomicU64,
}

impl<T> SinkSet<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            sinks: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
        }
    }

    pub(crate) fn subscribe(&self, sink: ExternalSink<T>) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, sink));

        let sinks = Arc::downgrade(&self.sinks);
        Subscription::new(move || {
            if let Some(sinks) = sinks.upgrade() {
                sinks
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(entry, _)| *entry != id);
            }
        })
    }

    /// Deliver `value` to every subscribed cell; returns how many accepted it.
    pub(crate) fn deliver(&self, value: &T) -> usize {
        let sinks: Vec<ExternalSink<T>> = self
            .sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, sink)| sink.clone())
            .collect();

        sinks
            .iter()
            .filter(|sink| sink.push(value.clone()).is_ok())
            .count()
    }

    pub(crate) fn len(&self) -> usize {
        self.sinks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
