use std::fmt;

/// Disposable handle for an observer or bridge registration.
///
/// Detaches when disposed or dropped. Call [`Subscription::keep`] to leave
/// the registration in place for the lifetime of its target.
#[must_use = "dropping a Subscription detaches it immediately"]
pub struct Subscription {
    detach: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(detach: impl FnOnce() + Send + 'static) -> Self {
        Self {
            detach: Some(Box::new(detach)),
        }
    }

    /// A handle with nothing to detach.
    pub fn empty() -> Self {
        Self { detach: None }
    }

    pub fn dispose(mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }

    pub fn keep(mut self) {
        self.detach = None;
    }

    pub fn is_active(&self) -> bool {
        self.detach.is_some()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(detach) = self.detach.take() {
            detach();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}
