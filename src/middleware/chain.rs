use super::{Middleware, MiddlewareContext, MiddlewarePhase};
use crate::core::{Result, VaultError, panic_message};
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{Level, event};

/// Ordered middleware list, composed outermost-first.
///
/// For `[A, B]` a successful unit of work produces
/// `A.start, B.start, B.complete, A.complete`; a failing one produces
/// `A.start, B.start, B.error, A.error`.
#[derive(Default)]
pub struct MiddlewareChain {
    entries: RwLock<Vec<Arc<dyn Middleware>>>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, middleware: Arc<dyn Middleware>) {
        event!(Level::DEBUG, middleware = middleware.name(), "registered middleware");
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(middleware);
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|middleware| middleware.name().to_string())
            .collect()
    }

    /// Copy of the current list, so hooks run without holding the lock.
    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn Middleware>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Run `work` wrapped by `entries`. The result of `work` is returned
    /// unchanged after every terminal hook has fired.
    ///
    /// A panic in `work` or in a hook is reported to the `on_error` hook of
    /// every enclosing middleware as `VaultError::Execution` and then resumes.
    pub(crate) fn run<R>(
        entries: &[Arc<dyn Middleware>],
        ctx: &mut MiddlewareContext<'_>,
        work: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        ctx.set_phase(MiddlewarePhase::Started);
        match catch_unwind(AssertUnwindSafe(|| Self::wrap(entries, ctx, work))) {
            Ok(result) => result,
            Err(panic) => {
                Self::mark_errored(ctx);
                resume_unwind(panic)
            }
        }
    }

    fn wrap<R>(
        entries: &[Arc<dyn Middleware>],
        ctx: &mut MiddlewareContext<'_>,
        work: impl FnOnce() -> Result<R>,
    ) -> Result<R> {
        let Some((outer, inner)) = entries.split_first() else {
            let result = work();
            ctx.set_phase(if result.is_ok() {
                MiddlewarePhase::Completed
            } else {
                MiddlewarePhase::Errored
            });
            return result;
        };

        outer.on_start(ctx);
        let result = match catch_unwind(AssertUnwindSafe(|| Self::wrap(inner, ctx, work))) {
            Ok(result) => result,
            Err(panic) => {
                Self::mark_errored(ctx);
                let error = VaultError::Execution(format!(
                    "action panicked: {}",
                    panic_message(panic.as_ref())
                ));
                outer.on_error(ctx, &error);
                resume_unwind(panic)
            }
        };
        match &result {
            Ok(_) => outer.on_complete(ctx),
            Err(err) => outer.on_error(ctx, err),
        }
        result
    }

    // A hook may panic after the terminal phase was already set.
    fn mark_errored(ctx: &mut MiddlewareContext<'_>) {
        if ctx.phase() == MiddlewarePhase::Started {
            ctx.set_phase(MiddlewarePhase::Errored);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::VaultError;
    use crate::transaction::Transaction;
    use crate::vault::Vault;
    use std::sync::Mutex;

    struct Recorder {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Middleware for Recorder {
        fn name(&self) -> &str {
            self.label
        }

        fn on_start(&self, ctx: &mut MiddlewareContext<'_>) {
            assert_eq!(ctx.phase(), MiddlewarePhase::Started);
            self.log.lock().unwrap().push(format!("{}.start", self.label));
        }

        fn on_complete(&self, ctx: &mut MiddlewareContext<'_>) {
            assert_eq!(ctx.phase(), MiddlewarePhase::Completed);
            self.log.lock().unwrap().push(format!("{}.complete", self.label));
        }

        fn on_error(&self, ctx: &mut MiddlewareContext<'_>, _error: &VaultError) {
            assert_eq!(ctx.phase(), MiddlewarePhase::Errored);
            self.log.lock().unwrap().push(format!("{}.error", self.label));
        }
    }

    fn chain(log: &Arc<Mutex<Vec<String>>>) -> Vec<Arc<dyn Middleware>> {
        vec![
            Arc::new(Recorder { label: "A", log: Arc::clone(log) }),
            Arc::new(Recorder { label: "B", log: Arc::clone(log) }),
        ]
    }

    #[test]
    fn test_onion_order_on_success() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let vault = Vault::new();
        let txn = Transaction::new();
        let mut ctx = MiddlewareContext::new(&vault, &txn);

        let value = MiddlewareChain::run(&chain(&log), &mut ctx, || {
            log.lock().unwrap().push("work".into());
            Ok(7)
        })
        .unwrap();

        assert_eq!(value, 7);
        assert_eq!(
            *log.lock().unwrap(),
            vec!["A.start", "B.start", "work", "B.complete", "A.complete"]
        );
    }

    #[test]
    fn test_error_passes_through_every_hook() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let vault = Vault::new();
        let txn = Transaction::new();
        let mut ctx = MiddlewareContext::new(&vault, &txn);

        let result: Result<()> = MiddlewareChain::run(&chain(&log), &mut ctx, || {
            Err(VaultError::aborted("declined"))
        });

        assert!(matches!(result, Err(VaultError::Aborted(ref reason)) if reason == "declined"));
        assert_eq!(ctx.phase(), MiddlewarePhase::Errored);
        assert_eq!(*log.lock().unwrap(), vec!["A.start", "B.start", "B.error", "A.error"]);
    }

    #[test]
    fn test_empty_chain_runs_work() {
        let vault = Vault::new();
        let txn = Transaction::new();
        let mut ctx = MiddlewareContext::new(&vault, &txn);

        let value = MiddlewareChain::run(&[], &mut ctx, || Ok("done")).unwrap();
        assert_eq!(value, "done");
        assert_eq!(ctx.phase(), MiddlewarePhase::Completed);
    }

    #[test]
    fn test_registry_management() {
        let chain = MiddlewareChain::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        chain.push(Arc::new(Recorder { label: "A", log }));

        assert_eq!(chain.names(), vec!["A".to_string()]);
        chain.clear();
        assert!(chain.is_empty());
    }

    #[test]
    fn test_panic_reaches_every_error_hook() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let vault = Vault::new();
        let txn = Transaction::new();
        let mut ctx = MiddlewareContext::new(&vault, &txn);
        let entries = chain(&log);

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            MiddlewareChain::run(&entries, &mut ctx, || -> Result<()> { panic!("work exploded") })
        }));

        let payload = outcome.unwrap_err();
        assert_eq!(payload.downcast_ref::<&str>(), Some(&"work exploded"));
        assert_eq!(ctx.phase(), MiddlewarePhase::Errored);
        assert_eq!(*log.lock().unwrap(), vec!["A.start", "B.start", "B.error", "A.error"]);
    }

    #[test]
    fn test_panicking_start_hook_still_unwinds_outward() {
        struct Exploding;

        impl Middleware for Exploding {
            fn on_start(&self, _ctx: &mut MiddlewareContext<'_>) {
                panic!("start hook exploded");
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let vault = Vault::new();
        let txn = Transaction::new();
        let mut ctx = MiddlewareContext::new(&vault, &txn);
        let entries: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(Recorder { label: "A", log: Arc::clone(&log) }),
            Arc::new(Exploding),
        ];

        let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
            MiddlewareChain::run(&entries, &mut ctx, || Ok(()))
        }));

        assert!(outcome.is_err());
        assert_eq!(ctx.phase(), MiddlewarePhase::Errored);
        assert_eq!(*log.lock().unwrap(), vec!["A.start", "A.error"]);
    }
}
