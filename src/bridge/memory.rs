use super::{Bridge, ExternalSink, SinkSet};
use crate::core::{Result, VaultError};
use crate::property::Subscription;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

/// In-memory repository. Keeps every published value and lets callers
/// inject values as if they came from outside.
pub struct MemoryBridge<T> {
    published: Mutex<Vec<T>>,
    sinks: SinkSet<T>,
    accepting: AtomicBool,
    failure: Mutex<Option<String>>,
}

impl<T> Default for MemoryBridge<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<T> MemoryBridge<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            published: Mutex::new(Vec::new()),
            sinks: SinkSet::new(),
            accepting: AtomicBool::new(true),
            failure: Mutex::new(None),
        }
    }

    /// Values received through `publish`, oldest first.
    pub fn published(&self) -> Vec<T> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn last_published(&self) -> Option<T> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }

    /// When `false`, `publish` declines values without storing them.
    pub fn set_accepting(&self, accepting: bool) {
        self.accepting.store(accepting, Ordering::SeqCst);
    }

    /// Make every subsequent `publish` fail with `reason`; `None` clears it.
    pub fn fail_with(&self, reason: Option<&str>) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = reason.map(str::to_string);
    }

    /// Push an externally produced value into every bound cell.
    pub fn emit(&self, value: T) -> usize {
        self.sinks.deliver(&value)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.len()
    }
}

impl<T> Bridge<T> for MemoryBridge<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn publish(&self, value: &T) -> Result<bool> {
        if let Some(reason) = self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(VaultError::Bridge(reason));
        }

        if !self.accepting.load(Ordering::SeqCst) {
            return Ok(false);
        }

        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(value.clone());
        Ok(true)
    }

    fn observe(&self, sink: ExternalSink<T>) -> Subscription {
        self.sinks.subscribe(sink)
    }
}
