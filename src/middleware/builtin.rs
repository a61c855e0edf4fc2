use super::{Middleware, MiddlewareContext};
use crate::core::VaultError;
use chrono::Utc;
use std::sync::{Mutex, PoisonError};
use tracing::{Level, event};

/// Logs the lifecycle of every transaction.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMiddleware;

impl Middleware for TracingMiddleware {
    fn name(&self) -> &str {
        "tracing"
    }

    fn on_start(&self, ctx: &mut MiddlewareContext<'_>) {
        event!(
            Level::DEBUG,
            vault = ctx.vault().name(),
            transaction = %ctx.transaction().id(),
            "action started"
        );
    }

    fn on_complete(&self, ctx: &mut MiddlewareContext<'_>) {
        event!(
            Level::INFO,
            vault = ctx.vault().name(),
            transaction = %ctx.transaction().id(),
            modified = ctx.transaction().change_count(),
            "action completed"
        );
    }

    fn on_error(&self, ctx: &mut MiddlewareContext<'_>, error: &VaultError) {
        event!(
            Level::WARN,
            vault = ctx.vault().name(),
            transaction = %ctx.transaction().id(),
            error = %error,
            "action failed"
        );
    }
}

const STARTED_AT_KEY: &str = "timing.started_at_us";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimingStats {
    pub completed: u64,
    pub errored: u64,
    pub total_micros: u64,
    pub max_micros: u64,
}

impl TimingStats {
    pub fn average_micros(&self) -> u64 {
        let runs = self.completed + self.errored;
        if runs == 0 { 0 } else { self.total_micros / runs }
    }
}

/// Measures wall-clock time of each transaction.
///
/// The start timestamp travels in the transaction's metadata under
/// `timing.started_at_us`.
#[derive(Debug, Default)]
pub struct TimingMiddleware {
    stats: Mutex<TimingStats>,
}

impl TimingMiddleware {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> TimingStats {
        *self.stats.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn finish(&self, ctx: &mut MiddlewareContext<'_>, failed: bool) {
        let Some(started) = ctx.metadata.get(STARTED_AT_KEY).and_then(|value| value.as_i64()) else {
            return;
        };
        let elapsed = Utc::now()
            .timestamp_micros()
            .saturating_sub(started)
            .max(0) as u64;

        let mut stats = self.stats.lock().unwrap_or_else(PoisonError::into_inner);
        if failed {
            stats.errored += 1;
        } else {
            stats.completed += 1;
        }
        stats.total_micros += elapsed;
        stats.max_micros = stats.max_micros.max(elapsed);

        event!(
            Level::DEBUG,
            transaction = %ctx.transaction().id(),
            elapsed_us = elapsed,
            failed,
            "action timed"
        );
    }
}

impl Middleware for TimingMiddleware {
    fn name(&self) -> &str {
        "timing"
    }

    fn on_start(&self, ctx: &mut MiddlewareContext<'_>) {
        ctx.metadata.insert(STARTED_AT_KEY, Utc::now().timestamp_micros());
    }

    fn on_complete(&self, ctx: &mut MiddlewareContext<'_>) {
        self.finish(ctx, false);
    }

    fn on_error(&self, ctx: &mut MiddlewareContext<'_>, _error: &VaultError) {
        self.finish(ctx, true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::MiddlewareChain;
    use crate::transaction::Transaction;
    use crate::vault::Vault;
    use std::sync::Arc;

    #[test]
    fn test_timing_counts_outcomes() {
        let timing = Arc::new(TimingMiddleware::new());
        let entries: Vec<Arc<dyn Middleware>> = vec![timing.clone()];
        let vault = Vault::new();

        let txn = Transaction::new();
        let mut ctx = MiddlewareContext::new(&vault, &txn);
        MiddlewareChain::run(&entries, &mut ctx, || Ok(())).unwrap();
        assert!(ctx.metadata.contains(STARTED_AT_KEY));

        let txn = Transaction::new();
        let mut ctx = MiddlewareContext::new(&vault, &txn);
        let result: crate::core::Result<()> = MiddlewareChain::run(&entries, &mut ctx, || {
            Err(VaultError::aborted("nope"))
        });
        assert!(result.is_err());

        let stats = timing.stats();
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.errored, 1);
        assert!(stats.max_micros >= stats.average_micros());
    }

    #[test]
    fn test_average_of_nothing_is_zero() {
        assert_eq!(TimingStats::default().average_micros(), 0);
    }
}
