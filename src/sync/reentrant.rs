// ============================================================================
// Reentrant Spin-Yield Lock
// ============================================================================
//
// Mutual exclusion with ownership tracking. The owning thread may acquire
// the lock any number of times and must release it the same number of
// times. Waiters spin briefly and then yield to the scheduler; there is no
// OS-level parking, no fairness and no timeout.
//
// Known limitation: a thread that never releases the lock starves every
// waiter forever.
//
// ============================================================================

use crate::core::{Result, VaultError};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Token 0 is reserved for "no owner".
static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

fn current_thread_token() -> u64 {
    THREAD_TOKEN.with(|token| *token)
}

pub const DEFAULT_SPIN_LIMIT: u32 = 64;

/// Reentrant lock with owner tracking.
///
/// Invariant: `depth > 0` exactly when `owner != 0`. Only the owner
/// touches `depth`.
#[derive(Debug)]
pub struct ReentrantLock {
    owner: AtomicU64,
    depth: AtomicUsize,
    spin_limit: u32,
}

impl Default for ReentrantLock {
    fn default() -> Self {
        Self::new()
    }
}

impl ReentrantLock {
    pub fn new() -> Self {
        Self::with_spin_limit(DEFAULT_SPIN_LIMIT)
    }

    /// Create a lock that busy-spins `spin_limit` times between yields.
    pub fn with_spin_limit(spin_limit: u32) -> Self {
        Self {
            owner: AtomicU64::new(0),
            depth: AtomicUsize::new(0),
            spin_limit,
        }
    }

    /// Block until the lock is free or already held by this thread.
    pub fn acquire(&self) {
        let me = current_thread_token();

        if self.owner.load(Ordering::Acquire) == me {
            self.depth.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let mut spins = 0u32;
        loop {
            if self
                .owner
                .compare_exchange_weak(0, me, Ordering::Acquire, Ordering::Relaxed)
                .is_ok()
            {
                self.depth.store(1, Ordering::Relaxed);
                return;
            }

            if spins < self.spin_limit {
                spins += 1;
                std::hint::spin_loop();
            } else {
                spins = 0;
                std::thread::yield_now();
            }
        }
    }

    /// Try to acquire without waiting. Succeeds when the lock is free or
    /// already owned by this thread.
    pub fn try_acquire(&self) -> bool {
        let me = current_thread_token();

        if self.owner.load(Ordering::Acquire) == me {
            self.depth.fetch_add(1, Ordering::Relaxed);
            return true;
        }

        if self
            .owner
            .compare_exchange(0, me, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.depth.store(1, Ordering::Relaxed);
            return true;
        }

        false
    }

    /// Release one level of ownership.
    ///
    /// # Errors
    /// Returns `VaultError::Lock` if the calling thread does not own the lock.
    pub fn release(&self) -> Result<()> {
        let me = current_thread_token();
        let owner = self.owner.load(Ordering::Acquire);

        if owner == 0 {
            return Err(VaultError::Lock("release called on an unheld lock".into()));
        }
        if owner != me {
            return Err(VaultError::Lock(
                "release called by a thread that does not own the lock".into(),
            ));
        }

        let remaining = self.depth.fetch_sub(1, Ordering::Relaxed) - 1;
        if remaining == 0 {
            self.owner.store(0, Ordering::Release);
        }
        Ok(())
    }

    /// Acquire and return a guard that releases on drop.
    pub fn lock(&self) -> ReentrantGuard<'_> {
        self.acquire();
        ReentrantGuard {
            lock: self,
            _not_send: PhantomData,
        }
    }

    /// Run `body` while holding the lock; released on every exit path,
    /// unwinding included.
    pub fn with_scope<R>(&self, body: impl FnOnce() -> R) -> R {
        let _guard = self.lock();
        body()
    }

    pub fn is_locked(&self) -> bool {
        self.owner.load(Ordering::Acquire) != 0
    }

    pub fn is_held_by_current_thread(&self) -> bool {
        self.owner.load(Ordering::Acquire) == current_thread_token()
    }

    /// Hold count of the calling thread (0 when it is not the owner).
    pub fn depth(&self) -> usize {
        if self.is_held_by_current_thread() {
            self.depth.load(Ordering::Relaxed)
        } else {
            0
        }
    }
}

/// Scoped ownership of a [`ReentrantLock`]. Bound to the acquiring thread.
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct ReentrantGuard<'a> {
    lock: &'a ReentrantLock,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ReentrantGuard<'_> {
    fn drop(&mut self) {
        // The guard only exists on the owning thread.
        let _ = self.lock.release();
    }
}
