//! Change notification for the tool list
//!
//! The registry does not know who cares that its contents changed. A single
//! [`ChangeSubscriber`] can be registered on the [`ChangeNotifier`]; every
//! notification is delivered on a spawned task so that a slow or failing
//! subscriber never holds up the watcher or the code that invalidated the
//! registry.

use crate::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

/// Signal that the set of available tools may have changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolListChanged {
    /// Paths whose change caused the notification
    pub paths: Vec<PathBuf>,
    /// Registry generation after the invalidation
    pub generation: u64,
}

/// Receiver of tool list change notifications
#[async_trait]
pub trait ChangeSubscriber: Send + Sync + 'static {
    /// Handle one notification. Errors are logged and otherwise ignored.
    async fn on_change(&self, event: ToolListChanged) -> Result<()>;
}

/// Subscriber forwarding notifications into an unbounded channel
pub struct ChannelSubscriber {
    sender: mpsc::UnboundedSender<ToolListChanged>,
}

impl ChannelSubscriber {
    /// Create a subscriber and the receiving end of its channel
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ToolListChanged>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl ChangeSubscriber for ChannelSubscriber {
    async fn on_change(&self, event: ToolListChanged) -> Result<()> {
        self.sender
            .send(event)
            .map_err(|_| crate::ToolbeltError::Notify("change receiver was dropped".to_string()))
    }
}

/// Holds the one registered change subscriber
#[derive(Clone, Default)]
pub struct ChangeNotifier {
    subscriber: Arc<RwLock<Option<Arc<dyn ChangeSubscriber>>>>,
}

impl ChangeNotifier {
    /// Create a notifier with no subscriber
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the subscriber, replacing any previous one
    pub fn set_subscriber(&self, subscriber: Arc<dyn ChangeSubscriber>) {
        let mut slot = match self.subscriber.write() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        if slot.replace(subscriber).is_some() {
            tracing::debug!("Replaced existing change subscriber");
        }
    }

    /// Register a channel subscriber and return its receiver
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ToolListChanged> {
        let (subscriber, receiver) = ChannelSubscriber::channel();
        self.set_subscriber(Arc::new(subscriber));
        receiver
    }

    /// Whether a subscriber is registered
    pub fn has_subscriber(&self) -> bool {
        self.current().is_some()
    }

    fn current(&self) -> Option<Arc<dyn ChangeSubscriber>> {
        match self.subscriber.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Deliver `event` without waiting for the subscriber.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn notify(&self, event: ToolListChanged) {
        let Some(subscriber) = self.current() else {
            tracing::trace!("No change subscriber registered, dropping notification");
            return;
        };

        tokio::spawn(async move {
            let generation = event.generation;
            match subscriber.on_change(event).await {
                Ok(()) => {
                    tracing::info!("📢 Sent tool list changed notification (generation {})", generation);
                }
                Err(e) => {
                    tracing::error!("❌ Change subscriber failed: {}", e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolbeltError;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::{timeout, Duration};

    struct FailingSubscriber {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl ChangeSubscriber for FailingSubscriber {
        async fn on_change(&self, _event: ToolListChanged) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ToolbeltError::Notify("subscriber exploded".to_string()))
        }
    }

    fn event(generation: u64) -> ToolListChanged {
        ToolListChanged {
            paths: vec![PathBuf::from("/tools/hello.md")],
            generation,
        }
    }

    #[tokio::test]
    async fn test_notify_without_subscriber_is_noop() {
        let notifier = ChangeNotifier::new();
        assert!(!notifier.has_subscriber());
        notifier.notify(event(1));
    }

    #[tokio::test]
    async fn test_channel_subscriber_receives_events() {
        let notifier = ChangeNotifier::new();
        let mut receiver = notifier.subscribe();

        notifier.notify(event(3));

        let received = timeout(Duration::from_secs(5), receiver.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received, event(3));
    }

    #[tokio::test]
    async fn test_new_subscriber_replaces_old() {
        let notifier = ChangeNotifier::new();
        let mut first = notifier.subscribe();
        let mut second = notifier.subscribe();

        notifier.notify(event(1));

        let received = timeout(Duration::from_secs(5), second.recv())
            .await
            .unwrap();
        assert_eq!(received, Some(event(1)));
        // The first subscriber's sender was dropped when it was replaced
        assert_eq!(first.recv().await, None);
    }

    #[tokio::test]
    async fn test_subscriber_failure_is_swallowed() {
        let notifier = ChangeNotifier::new();
        let calls = Arc::new(AtomicUsize::new(0));
        notifier.set_subscriber(Arc::new(FailingSubscriber {
            calls: calls.clone(),
        }));

        notifier.notify(event(1));
        notifier.notify(event(2));

        timeout(Duration::from_secs(5), async {
            while calls.load(Ordering::SeqCst) < 2 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
    }
}
