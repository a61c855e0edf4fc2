pub mod reentrant;

pub use reentrant::{DEFAULT_SPIN_LIMIT, ReentrantGuard, ReentrantLock};
