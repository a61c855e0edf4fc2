use super::{Bridge, ExternalSink, SinkSet};
use crate::core::{Result, VaultError};
use crate::property::Subscription;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{Level, event};

/// Bridge that moves values through bounded tokio channels.
///
/// Outbound writes never block the committing thread: a full queue makes
/// `publish` decline the value. Inbound values are forwarded to bound cells
/// by a task spawned with [`ChannelBridge::spawn_inbound`].
pub struct ChannelBridge<T> {
    outbound: mpsc::Sender<T>,
    sinks: Arc<SinkSet<T>>,
}

impl<T> ChannelBridge<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a bridge with an outbound queue of `capacity` values. The
    /// returned receiver is the consumer side of that queue.
    pub fn bounded(capacity: usize) -> (Self, mpsc::Receiver<T>) {
        let (outbound, receiver) = mpsc::channel(capacity.max(1));
        let bridge = Self {
            outbound,
            sinks: Arc::new(SinkSet::new()),
        };
        (bridge, receiver)
    }

    /// Forward every value received on `inbound` to the bound cells until
    /// the channel closes. Must be called from within a tokio runtime.
    pub fn spawn_inbound(&self, mut inbound: mpsc::Receiver<T>) -> JoinHandle<usize> {
        let sinks = Arc::clone(&self.sinks);
        tokio::spawn(async move {
            let mut delivered = 0usize;
            while let Some(value) = inbound.recv().await {
                delivered += sinks.deliver(&value);
            }
            event!(Level::DEBUG, delivered, "inbound bridge channel closed");
            delivered
        })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.len()
    }
}

impl<T> Bridge<T> for ChannelBridge<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn publish(&self, value: &T) -> Result<bool> {
        match self.outbound.try_send(value.clone()) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Closed(_)) => {
                Err(VaultError::Bridge("outbound channel closed".into()))
            }
        }
    }

    fn observe(&self, sink: ExternalSink<T>) -> Subscription {
        self.sinks.subscribe(sink)
    }
}
