// ============================================================================
// RustVault Library
// ============================================================================
//
// Transactional in-memory state container.
//
// Properties live in a vault. Every change goes through an action, which
// runs inside a transaction wrapped by the middleware chain: either all of
// an action's writes commit, or every touched property is restored.
//
// ============================================================================

//! Transactional reactive state.
//!
//! # Examples
//!
//! ```
//! use rustvault::{Guard, LengthValidator, Vault};
//!
//! # fn main() -> rustvault::Result<()> {
//! let vault = Vault::new();
//! let name = vault.register_property(
//!     "username",
//!     || "guest".to_string(),
//!     Guard::validator(LengthValidator::new(3, 50)),
//! )?;
//!
//! let result = vault.action(|tx| tx.mutate(&name, "ab".to_string()))?;
//! assert!(result.is_error());
//! assert_eq!(name.read(), "guest");
//!
//! vault.action(|tx| tx.mutate(&name, "alice".to_string()))?;
//! assert_eq!(name.read(), "alice");
//! # Ok(())
//! # }
//! ```

pub mod bridge;
pub mod core;
pub mod middleware;
pub mod prelude;
pub mod property;
pub mod sync;
pub mod transaction;
pub mod vault;

// Re-export main types for convenience
pub use core::{Result, VaultError};
pub use vault::{ActionResult, ActionScope, PropertyRegistry, Vault, VaultConfig, VaultStats};

pub use property::{
    FnTransformer, FnValidator, Guard, LengthValidator, PropertyCell, RangeValidator,
    Subscription, Transformer, Validator,
};

pub use transaction::{
    PoolStats, Transaction, TransactionId, TransactionInfo, TransactionPool, TransactionStatus,
};

pub use middleware::{
    Metadata, Middleware, MiddlewareChain, MiddlewareContext, MiddlewarePhase, TimingMiddleware,
    TimingStats, TracingMiddleware,
};

pub use bridge::{Bridge, ChannelBridge, ExternalSink, MemoryBridge};

pub use sync::{ReentrantGuard, ReentrantLock};
