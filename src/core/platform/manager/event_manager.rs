use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::warn;

use crate::core::platform::container::notification::NotificationRecord;
use crate::core::platform::container::notification_event::{
    NotificationEvent, NotificationEventKind, StateChange,
};

/// Defines the interface for handling notification events asynchronously.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &NotificationEvent) -> Result<(), EventError>;
}

/// Custom error type for event-related operations.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("Handler error: {0}")]
    HandlerError(String),
}

/// Handle returned by a subscription, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Adapts a plain closure into an event handler.
struct FnHandler<F>(F);

#[async_trait]
impl<F> EventHandler for FnHandler<F>
where
    F: Fn(&NotificationEvent) + Send + Sync,
{
    async fn handle(&self, event: &NotificationEvent) -> Result<(), EventError> {
        (self.0)(event);
        Ok(())
    }
}

type Subscribers = HashMap<NotificationEventKind, Vec<(SubscriptionId, Arc<dyn EventHandler>)>>;

/// Fans notification events out to subscribers.
///
/// Handlers run in subscription order after the subscriber table lock is released, so a
/// handler may query or mutate the engine that emitted the event. A failing handler is
/// logged and does not stop delivery to the others.
#[derive(Default)]
pub struct EventEmitter {
    subscribers: RwLock<Subscribers>,
    next_id: AtomicU64,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a handler to one kind of event.
    pub async fn subscribe(&self, kind: NotificationEventKind, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscribers
            .write()
            .await
            .entry(kind)
            .or_default()
            .push((id, handler));
        id
    }

    /// Subscribes a closure to one kind of event.
    pub async fn on<F>(&self, kind: NotificationEventKind, handler: F) -> SubscriptionId
    where
        F: Fn(&NotificationEvent) + Send + Sync + 'static,
    {
        self.subscribe(kind, Arc::new(FnHandler(handler))).await
    }

    /// Subscribes to the genuinely new records of each poll or injection.
    pub async fn on_new_notifications<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&[NotificationRecord]) + Send + Sync + 'static,
    {
        self.on(NotificationEventKind::NewNotifications, move |event| {
            if let NotificationEvent::NewNotifications(records) = event {
                handler(records);
            }
        })
        .await
    }

    /// Subscribes to every store mutation.
    pub async fn on_state_changed<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&StateChange) + Send + Sync + 'static,
    {
        self.on(NotificationEventKind::StateChanged, move |event| {
            if let NotificationEvent::StateChanged(change) = event {
                handler(change);
            }
        })
        .await
    }

    /// Removes a subscription. Returns false if it was already gone.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subscribers = self.subscribers.write().await;
        let mut removed = false;
        for handlers in subscribers.values_mut() {
            let before = handlers.len();
            handlers.retain(|(existing, _)| *existing != id);
            removed |= handlers.len() != before;
        }
        removed
    }

    /// Delivers `event` to its subscribers. Returns how many handled it successfully.
    pub async fn emit(&self, event: NotificationEvent) -> usize {
        let handlers: Vec<Arc<dyn EventHandler>> = {
            let subscribers = self.subscribers.read().await;
            subscribers
                .get(&event.kind())
                .map(|handlers| handlers.iter().map(|(_, handler)| handler.clone()).collect())
                .unwrap_or_default()
        };

        let mut delivered = 0;
        for handler in handlers {
            match handler.handle(&event).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(kind = ?event.kind(), error = %e, "Notification event handler failed"),
            }
        }
        delivered
    }

    /// Gets the number of subscribers for a specific event kind.
    pub async fn subscriber_count(&self, kind: NotificationEventKind) -> usize {
        self.subscribers
            .read()
            .await
            .get(&kind)
            .map(|handlers| handlers.len())
            .unwrap_or(0)
    }
}
