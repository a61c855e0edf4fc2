use crate::core::{Result, VaultError};
use crate::property::{Guard, PropertyCell, TrackedCell};
use std::any::{Any, type_name};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{Level, event};

struct RegisteredProperty {
    tracked: Arc<dyn TrackedCell>,
    typed: Arc<dyn Any + Send + Sync>,
}

/// Name-keyed property registry. Property identity is the registration name.
#[derive(Default)]
pub struct PropertyRegistry {
    properties: RwLock<HashMap<String, RegisteredProperty>>,
}

impl PropertyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cell registered under `name`, creating it on first use.
    ///
    /// `initial` and `guard` are only consulted when the cell is created.
    ///
    /// # Errors
    /// `VaultError::TypeMismatch` if `name` is registered with another type.
    pub fn register<T>(
        &self,
        name: &str,
        initial: impl FnOnce() -> T,
        guard: Guard<T>,
    ) -> Result<Arc<PropertyCell<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut properties = self.properties.write()?;

        if let Some(existing) = properties.get(name) {
            return downcast(name, &existing.typed);
        }

        let cell = Arc::new(PropertyCell::new(name, initial(), guard));
        properties.insert(
            name.to_string(),
            RegisteredProperty {
                tracked: cell.clone(),
                typed: cell.clone(),
            },
        );
        event!(Level::DEBUG, property = name, "registered property");
        Ok(cell)
    }

    pub fn get<T>(&self, name: &str) -> Result<Arc<PropertyCell<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let properties = self.properties.read()?;
        let entry = properties
            .get(name)
            .ok_or_else(|| VaultError::UnknownProperty(name.to_string()))?;
        downcast(name, &entry.typed)
    }

    /// Whether `cell` is the cell registered under `name`.
    pub(crate) fn recognizes(&self, name: &str, cell: &Arc<dyn TrackedCell>) -> bool {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .is_some_and(|entry| std::ptr::addr_eq(Arc::as_ptr(&entry.tracked), Arc::as_ptr(cell)))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.properties
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn downcast<T>(name: &str, typed: &Arc<dyn Any + Send + Sync>) -> Result<Arc<PropertyCell<T>>>
where
    T: Clone + Send + Sync + 'static,
{
    Arc::clone(typed)
        .downcast::<PropertyCell<T>>()
        .map_err(|_| VaultError::TypeMismatch {
            property: name.to_string(),
            expected: type_name::<T>(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent() {
        let registry = PropertyRegistry::new();

        let first = registry.register("count", || 1i64, Guard::none()).unwrap();
        let second: Arc<PropertyCell<i64>> = registry
            .register("count", || panic!("initializer must not run twice"), Guard::none())
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.read(), 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_register_with_other_type_fails() {
        let registry = PropertyRegistry::new();
        registry.register("count", || 1i64, Guard::none()).unwrap();

        let err = registry
            .register("count", || "one".to_string(), Guard::none())
            .unwrap_err();
        assert!(matches!(err, VaultError::TypeMismatch { .. }));
    }

    #[test]
    fn test_get_and_recognize() {
        let registry = PropertyRegistry::new();
        let cell = registry.register("name", String::new, Guard::none()).unwrap();

        let found: Arc<PropertyCell<String>> = registry.get("name").unwrap();
        assert!(Arc::ptr_eq(&cell, &found));
        assert!(matches!(
            registry.get::<String>("missing"),
            Err(VaultError::UnknownProperty(_))
        ));

        let tracked: Arc<dyn TrackedCell> = cell.clone();
        assert!(registry.recognizes("name", &tracked));

        let stranger: Arc<dyn TrackedCell> =
            Arc::new(PropertyCell::new("name", String::new(), Guard::none()));
        assert!(!registry.recognizes("name", &stranger));
    }

    #[test]
    fn test_names_sorted() {
        let registry = PropertyRegistry::new();
        registry.register("zeta", || 0u8, Guard::none()).unwrap();
        registry.register("alpha", || 0u8, Guard::none()).unwrap();
        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
    }
}
