// ============================================================================
// Property Cell
// ============================================================================
//
// A named, typed, observable value slot. Writes pass through the cell's
// guard (validator or transformer), are stored, fan out synchronously to
// observers and are published to the bound bridge. Observer and bridge
// failures are contained: a write that reached the store is never undone
// by a misbehaving collaborator.
//
// ============================================================================

use super::{Guard, Subscription};
use crate::bridge::{Bridge, ExternalSink};
use crate::core::{Result, VaultError};
use std::any::{Any, type_name};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{Level, event};

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Type-erased view of a cell used by the transaction log.
pub(crate) trait TrackedCell: Send + Sync {
    fn name(&self) -> &str;

    /// Raw stored value, bypassing the transformer.
    fn snapshot(&self) -> Box<dyn Any + Send + Sync>;

    /// Write `prior` back without validation, transformation or recording.
    fn restore(&self, prior: &(dyn Any + Send + Sync)) -> Result<()>;
}

struct BoundBridge<T> {
    bridge: Arc<dyn Bridge<T>>,
    // Dropping the link detaches the inbound direction.
    _inbound: Subscription,
}

pub struct PropertyCell<T> {
    name: String,
    value: RwLock<T>,
    guard: Guard<T>,
    observers: Mutex<Vec<(u64, Observer<T>)>>,
    next_observer_id: AtomicU64,
    bridge: Mutex<Option<BoundBridge<T>>>,
}

impl<T> PropertyCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, initial: T, guard: Guard<T>) -> Self {
        Self {
            name: name.into(),
            value: RwLock::new(initial),
            guard,
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(1),
            bridge: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current value, passed through the transformer's `get` side.
    pub fn read(&self) -> T {
        let raw = self.raw();
        match &self.guard {
            Guard::Transformer(transformer) => transformer.get(&raw),
            _ => raw,
        }
    }

    pub(crate) fn raw(&self) -> T {
        self.value
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Validated, transformed write. Only reachable through `Vault::mutate`,
    /// which records the prior value first.
    pub(crate) fn write(&self, value: T) -> Result<()> {
        let value = self.admit(value)?;
        self.store(value.clone());
        self.notify(&value);
        self.publish(&value);
        Ok(())
    }

    /// Inbound path for bridge-originated values. Not recorded by any
    /// transaction and never published back to the bridge.
    pub(crate) fn external_write(&self, value: T) -> Result<()> {
        let value = self.admit(value).inspect_err(|err| {
            event!(
                Level::WARN,
                property = %self.name,
                error = %err,
                "rejected external write"
            );
        })?;
        self.store(value.clone());
        self.notify(&value);
        Ok(())
    }

    fn admit(&self, value: T) -> Result<T> {
        match &self.guard {
            Guard::Validator(validator) => {
                if !validator.validate(&value) {
                    return Err(VaultError::validation(
                        self.name.clone(),
                        validator.error_message(&value),
                    ));
                }
                Ok(value)
            }
            Guard::Transformer(transformer) => Ok(transformer.set(value)),
            Guard::None => Ok(value),
        }
    }

    fn store(&self, value: T) {
        *self.value.write().unwrap_or_else(PoisonError::into_inner) = value;
    }

    fn notify(&self, value: &T) {
        let observers: Vec<(u64, Observer<T>)> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        if observers.is_empty() {
            return;
        }

        let visible = match &self.guard {
            Guard::Transformer(transformer) => transformer.get(value),
            _ => value.clone(),
        };

        for (id, observer) in observers {
            if catch_unwind(AssertUnwindSafe(|| observer(&visible))).is_err() {
                event!(
                    Level::WARN,
                    property = %self.name,
                    observer = id,
                    "observer panicked; notification discarded"
                );
            }
        }
    }

    fn publish(&self, value: &T) {
        let bridge = self
            .bridge
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|bound| Arc::clone(&bound.bridge));

        let Some(bridge) = bridge else {
            return;
        };

        match catch_unwind(AssertUnwindSafe(|| bridge.publish(value))) {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => {
                event!(Level::DEBUG, property = %self.name, "bridge declined published value");
            }
            Ok(Err(err)) => {
                event!(Level::WARN, property = %self.name, error = %err, "bridge publish failed");
            }
            Err(_) => {
                event!(Level::WARN, property = %self.name, "bridge publish panicked");
            }
        }
    }

    /// Register an observer. It is invoked once right away with the current
    /// value and then after every stored change, in write order.
    pub fn observe(self: &Arc<Self>, observer: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        let observer: Observer<T> = Arc::new(observer);

        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::clone(&observer)));

        let current = self.read();
        if catch_unwind(AssertUnwindSafe(|| observer(&current))).is_err() {
            event!(
                Level::WARN,
                property = %self.name,
                observer = id,
                "observer panicked on initial snapshot"
            );
        }

        let cell = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(cell) = cell.upgrade() {
                cell.observers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .retain(|(entry, _)| *entry != id);
            }
        })
    }

    pub fn observer_count(&self) -> usize {
        self.observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Link the cell to an external data source. Replaces any previous link.
    pub fn bind_bridge(self: &Arc<Self>, bridge: Arc<dyn Bridge<T>>) {
        let inbound = bridge.observe(ExternalSink::new(Arc::downgrade(self)));
        let previous = self
            .bridge
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(BoundBridge {
                bridge,
                _inbound: inbound,
            });

        if previous.is_some() {
            event!(Level::DEBUG, property = %self.name, "bridge replaced");
        }
    }

    pub fn unbind_bridge(&self) -> bool {
        self.bridge
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some()
    }

    pub fn has_bridge(&self) -> bool {
        self.bridge
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<T> TrackedCell for PropertyCell<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn snapshot(&self) -> Box<dyn Any + Send + Sync> {
        Box::new(self.raw())
    }

    fn restore(&self, prior: &(dyn Any + Send + Sync)) -> Result<()> {
        let value = prior
            .downcast_ref::<T>()
            .ok_or_else(|| VaultError::TypeMismatch {
                property: self.name.clone(),
                expected: type_name::<T>(),
            })?
            .clone();

        self.store(value.clone());
        self.notify(&value);
        self.publish(&value);
        Ok(())
    }
}

impl<T> fmt::Debug for PropertyCell<T>
where
    T: Clone + Send + Sync + fmt::Debug + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyCell")
            .field("name", &self.name)
            .field("value", &self.raw())
            .field("guard", &self.guard)
            .field("observers", &self.observer_count())
            .field("bridged", &self.has_bridge())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::{FnTransformer, LengthValidator};

    fn username() -> Arc<PropertyCell<String>> {
        Arc::new(PropertyCell::new(
            "username",
            "guest".to_string(),
            Guard::validator(LengthValidator::new(3, 50)),
        ))
    }

    #[test]
    fn test_validator_rejects_without_mutating() {
        let cell = username();

        let err = cell.write("x".to_string()).unwrap_err();
        assert!(matches!(err, VaultError::Validation { ref property, .. } if property == "username"));
        assert_eq!(cell.read(), "guest");

        cell.write("john_doe".to_string()).unwrap();
        assert_eq!(cell.read(), "john_doe");
    }

    #[test]
    fn test_transformer_applies_both_sides() {
        let cell = Arc::new(PropertyCell::new(
            "email",
            String::new(),
            Guard::transformer(FnTransformer::new(
                |value: String| value.trim().to_lowercase(),
                |value: &String| format!("<{value}>"),
            )),
        ));

        cell.write("  Bob@Example.COM ".to_string()).unwrap();
        assert_eq!(cell.raw(), "bob@example.com");
        assert_eq!(cell.read(), "<bob@example.com>");
    }

    #[test]
    fn test_observe_receives_snapshot_then_changes() {
        let cell = Arc::new(PropertyCell::new("count", 1i64, Guard::none()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        let subscription = cell.observe(move |value| sink.lock().unwrap().push(*value));

        cell.write(2).unwrap();
        cell.write(3).unwrap();
        subscription.dispose();
        cell.write(4).unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(cell.observer_count(), 0);
    }

    #[test]
    fn test_panicking_observer_is_contained() {
        let cell = Arc::new(PropertyCell::new("count", 0i64, Guard::none()));
        let seen = Arc::new(Mutex::new(Vec::new()));

        cell.observe(|value| {
            if *value > 0 {
                panic!("observer failure");
            }
        })
        .keep();
        let sink = Arc::clone(&seen);
        cell.observe(move |value| sink.lock().unwrap().push(*value)).keep();

        cell.write(5).unwrap();

        assert_eq!(cell.read(), 5);
        assert_eq!(*seen.lock().unwrap(), vec![0, 5]);
    }

    #[test]
    fn test_restore_bypasses_validator() {
        let cell = username();
        let prior: Box<dyn Any + Send + Sync> = Box::new("x".to_string());

        cell.restore(prior.as_ref()).unwrap();
        assert_eq!(cell.read(), "x");
    }

    #[test]
    fn test_restore_rejects_foreign_type() {
        let cell = username();
        let prior: Box<dyn Any + Send + Sync> = Box::new(42u32);

        assert!(matches!(
            cell.restore(prior.as_ref()),
            Err(VaultError::TypeMismatch { .. })
        ));
        assert_eq!(cell.read(), "guest");
    }
}
