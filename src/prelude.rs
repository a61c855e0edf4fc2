//! Everyday imports for application code.
//!
//! ```
//! use rustvault::prelude::*;
//!
//! let vault = Vault::new();
//! let count = vault.register_property("count", || 0u32, Guard::none()).unwrap();
//! let _ = vault.action(|tx| tx.update(&count, |c| c + 1)).unwrap();
//! assert_eq!(count.read(), 1);
//! ```

pub use crate::{
    ActionResult, ActionScope, Bridge, Guard, LengthValidator, Middleware, MiddlewareContext,
    PropertyCell, RangeValidator, Result, Subscription, Vault, VaultConfig, VaultError,
};

pub mod advanced {
    //! Lower-level building blocks: custom bridges, pooling and the lock.
    pub use crate::{
        ChannelBridge, ExternalSink, MemoryBridge, MiddlewareChain, ReentrantLock, Transaction,
        TransactionPool,
    };
}
