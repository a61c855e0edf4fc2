// ============================================================================
// Vault
// ============================================================================
//
// Orchestrates properties, middleware and the active transaction.
//
// `action` is the only way to change a property:
//   1. take the vault lock (reentrant; concurrent callers wait)
//   2. join the active transaction, or start one and publish it
//   3. run the body inside the middleware chain
//   4. commit on success, roll back on failure
//   5. clear the active slot and hand the transaction back to the pool
//
// ============================================================================

pub mod config;
pub mod registry;
pub mod result;
pub mod scope;

pub use config::VaultConfig;
pub use registry::PropertyRegistry;
pub use result::{ActionResult, VaultStats};
pub use scope::ActionScope;

use crate::bridge::Bridge;
use crate::core::{Result, VaultError, panic_message};
use crate::middleware::{Middleware, MiddlewareChain, MiddlewareContext};
use crate::property::{Guard, PropertyCell, Subscription, TrackedCell};
use crate::sync::ReentrantLock;
use crate::transaction::{Transaction, TransactionId, TransactionPool};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{Level, event, info_span};
use uuid::Uuid;

pub struct Vault {
    id: Uuid,
    config: VaultConfig,
    /// Serializes actions
    lock: ReentrantLock,
    registry: PropertyRegistry,
    middleware: MiddlewareChain,
    /// Transaction of the call chain currently holding `lock`
    active: Mutex<Option<Arc<Transaction>>>,
    pool: TransactionPool,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    failures: AtomicU64,
    nested: AtomicU64,
}

/// Clears the active slot on every exit path of an outer action.
struct ActiveSlot<'a> {
    vault: &'a Vault,
}

impl Drop for ActiveSlot<'_> {
    fn drop(&mut self) {
        *self
            .vault
            .active
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl Default for Vault {
    fn default() -> Self {
        Self::new()
    }
}

impl Vault {
    pub fn new() -> Self {
        Self::build(VaultConfig::default())
    }

    /// Create a vault with a custom configuration
    ///
    /// # Errors
    /// `VaultError::Config` if the configuration does not validate.
    pub fn with_config(config: VaultConfig) -> Result<Self> {
        config.validate().map_err(VaultError::Config)?;
        Ok(Self::build(config))
    }

    fn build(config: VaultConfig) -> Self {
        Self {
            id: Uuid::new_v4(),
            lock: ReentrantLock::with_spin_limit(config.spin_limit),
            registry: PropertyRegistry::new(),
            middleware: MiddlewareChain::new(),
            active: Mutex::new(None),
            pool: TransactionPool::new(config.pool_capacity),
            commits: AtomicU64::new(0),
            rollbacks: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            nested: AtomicU64::new(0),
            config,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Setup
    // ------------------------------------------------------------------

    /// Register a property, or return the one already registered under
    /// `name`. The initializer and guard only apply on first registration.
    pub fn register_property<T>(
        &self,
        name: &str,
        initial: impl FnOnce() -> T,
        guard: Guard<T>,
    ) -> Result<Arc<PropertyCell<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.registry.register(name, initial, guard)
    }

    pub fn property<T>(&self, name: &str) -> Result<Arc<PropertyCell<T>>>
    where
        T: Clone + Send + Sync + 'static,
    {
        self.registry.get(name)
    }

    pub fn property_names(&self) -> Vec<String> {
        self.registry.names()
    }

    pub fn registry(&self) -> &PropertyRegistry {
        &self.registry
    }

    /// Append a middleware to the chain.
    pub fn use_middleware(&self, middleware: impl Middleware + 'static) -> &Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    /// Append a shared middleware, keeping a handle for the caller.
    pub fn use_shared(&self, middleware: Arc<dyn Middleware>) -> &Self {
        self.middleware.push(middleware);
        self
    }

    pub fn use_all(&self, middleware: impl IntoIterator<Item = Arc<dyn Middleware>>) -> &Self {
        for entry in middleware {
            self.middleware.push(entry);
        }
        self
    }

    pub fn clear_middleware(&self) {
        self.middleware.clear();
    }

    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }

    pub fn middleware_names(&self) -> Vec<String> {
        self.middleware.names()
    }

    /// Run `effect` now and after every change of `property`.
    pub fn effect<T>(
        &self,
        property: &Arc<PropertyCell<T>>,
        effect: impl Fn(&T) + Send + Sync + 'static,
    ) -> Subscription
    where
        T: Clone + Send + Sync + 'static,
    {
        property.observe(effect)
    }

    pub fn bind_bridge<T>(&self, property: &Arc<PropertyCell<T>>, bridge: Arc<dyn Bridge<T>>)
    where
        T: Clone + Send + Sync + 'static,
    {
        property.bind_bridge(bridge);
    }

    // ------------------------------------------------------------------
    // Actions
    // ------------------------------------------------------------------

    /// Run `body` as one all-or-nothing unit of work.
    ///
    /// Returns `Ok(ActionResult::Success)` after a commit and
    /// `Ok(ActionResult::Error)` after a rollback caused by a business
    /// failure. Fatal conditions (misuse, failed rollback, commit against a
    /// foreign property) are returned as `Err`.
    ///
    /// A call made while this thread is already inside an action joins
    /// the active transaction instead of starting a new one.
    ///
    /// # Examples
    ///
    /// ```
    /// # use rustvault::{Guard, Vault};
    /// let vault = Vault::new();
    /// let balance = vault.register_property("balance", || 100i64, Guard::none()).unwrap();
    ///
    /// let result = vault
    ///     .action(|tx| {
    ///         tx.update(&balance, |b| b - 30)?;
    ///         tx.abort::<()>("card declined")
    ///     })
    ///     .unwrap();
    ///
    /// assert!(result.is_error());
    /// assert_eq!(balance.read(), 100);
    /// ```
    pub fn action<R, F>(&self, body: F) -> Result<ActionResult<R>>
    where
        F: FnOnce(&ActionScope<'_>) -> Result<R>,
    {
        let _lock = self.lock.lock();

        if let Some(active) = self.current_transaction() {
            return self.run_nested(&active, body);
        }

        let txn = Arc::new(self.pool.acquire());
        *self.active.lock()? = Some(Arc::clone(&txn));
        let slot = ActiveSlot { vault: self };

        let span = info_span!("vault.action", vault = %self.config.name, transaction = %txn.id());
        let _entered = span.enter();

        let middleware = self.middleware.snapshot();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let scope = ActionScope::new(self, &txn);
            let mut ctx = MiddlewareContext::new(self, &txn);
            MiddlewareChain::run(&middleware, &mut ctx, || body(&scope))
        }));

        let result = match outcome {
            Ok(outcome) => self.settle(&txn, outcome),
            Err(panic) => {
                event!(Level::ERROR, transaction = %txn.id(), "action panicked; rolling back");
                let rollback = self.roll_back(&txn);
                drop(slot);
                self.pool.recycle(txn);
                // The unwind carries the rollback failure along with the panic.
                if let Err(err) = rollback {
                    resume_unwind(Box::new(format!(
                        "{}; {err}",
                        panic_message(panic.as_ref())
                    )));
                }
                resume_unwind(panic);
            }
        };

        drop(slot);
        self.pool.recycle(txn);
        result
    }

    /// Run an action on tokio's blocking pool and await its result.
    ///
    /// A panic inside the action resumes on the awaiting task.
    pub async fn spawn_action<R, F>(self: &Arc<Self>, body: F) -> Result<ActionResult<R>>
    where
        F: FnOnce(&ActionScope<'_>) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let vault = Arc::clone(self);
        match tokio::task::spawn_blocking(move || vault.action(body)).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => resume_unwind(err.into_panic()),
            Err(err) => Err(VaultError::Execution(format!("action task cancelled: {err}"))),
        }
    }

    /// Write `value` into `property` inside the calling thread's action.
    ///
    /// # Errors
    /// `VaultError::IllegalUse` when called outside of an action,
    /// `VaultError::Validation` when the property's validator rejects `value`.
    pub fn mutate<T>(&self, property: &Arc<PropertyCell<T>>, value: T) -> Result<()>
    where
        T: Clone + Send + Sync + 'static,
    {
        let txn = self.current_transaction().ok_or_else(|| {
            VaultError::IllegalUse(format!(
                "mutate of '{}' outside of an action",
                property.name()
            ))
        })?;

        let tracked: Arc<dyn TrackedCell> = property.clone();
        let first_write = txn.record_first_change(&tracked)?;

        if self.config.trace_mutations {
            event!(
                Level::DEBUG,
                property = property.name(),
                transaction = %txn.id(),
                first_write,
                "mutation"
            );
        }

        property.write(value)
    }

    fn run_nested<R, F>(&self, txn: &Transaction, body: F) -> Result<ActionResult<R>>
    where
        F: FnOnce(&ActionScope<'_>) -> Result<R>,
    {
        self.nested.fetch_add(1, Ordering::Relaxed);
        let scope = ActionScope::new(self, txn);

        match body(&scope) {
            Ok(value) => Ok(ActionResult::Success {
                value,
                transaction: txn.info(),
            }),
            Err(cause) if cause.is_fatal() => Err(cause),
            Err(cause) => {
                event!(
                    Level::WARN,
                    transaction = %txn.id(),
                    error = %cause,
                    "nested action failed; transaction is rollback-only"
                );
                txn.mark_rollback_only(cause.to_string());
                Ok(ActionResult::Error {
                    cause,
                    transaction: txn.info(),
                })
            }
        }
    }

    fn settle<R>(&self, txn: &Transaction, outcome: Result<R>) -> Result<ActionResult<R>> {
        let value = match outcome {
            Ok(value) => value,
            Err(cause) => {
                self.roll_back(txn)?;
                if cause.is_fatal() {
                    return Err(cause);
                }
                return Ok(ActionResult::Error {
                    cause,
                    transaction: txn.info(),
                });
            }
        };

        if let Some(reason) = txn.abort_reason() {
            self.roll_back(txn)?;
            return Ok(ActionResult::Error {
                cause: VaultError::Aborted(reason),
                transaction: txn.info(),
            });
        }

        if let Err(err) = txn.commit(&self.registry) {
            event!(Level::ERROR, transaction = %txn.id(), error = %err, "commit refused");
            self.roll_back(txn)?;
            return Err(err);
        }

        self.commits.fetch_add(1, Ordering::Relaxed);
        event!(
            Level::DEBUG,
            transaction = %txn.id(),
            modified = txn.change_count(),
            "transaction committed"
        );
        Ok(ActionResult::Success {
            value,
            transaction: txn.info(),
        })
    }

    fn roll_back(&self, txn: &Transaction) -> Result<()> {
        match txn.rollback() {
            Ok(()) => {
                self.rollbacks.fetch_add(1, Ordering::Relaxed);
                event!(
                    Level::DEBUG,
                    transaction = %txn.id(),
                    restored = txn.change_count(),
                    "transaction rolled back"
                );
                Ok(())
            }
            Err(err) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
                event!(Level::ERROR, transaction = %txn.id(), error = %err, "rollback failed");
                Err(err)
            }
        }
    }

    /// Active transaction of the calling thread, if it is inside an action.
    fn current_transaction(&self) -> Option<Arc<Transaction>> {
        if !self.lock.is_held_by_current_thread() {
            return None;
        }
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Whether the calling thread is inside an action of this vault.
    pub fn in_action(&self) -> bool {
        self.current_transaction().is_some()
    }

    /// Id of the transaction currently running on any thread.
    pub fn active_transaction_id(&self) -> Option<TransactionId> {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|txn| txn.id())
    }

    pub fn stats(&self) -> VaultStats {
        VaultStats {
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            nested: self.nested.load(Ordering::Relaxed),
            pool: self.pool.stats(),
        }
    }
}

impl fmt::Debug for Vault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vault")
            .field("id", &self.id)
            .field("name", &self.config.name)
            .field("properties", &self.registry.len())
            .field("middleware", &self.middleware.len())
            .field("active", &self.active_transaction_id())
            .finish()
    }
}
