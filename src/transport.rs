//! Push transport seam
//!
//! Reconcilers never talk to a socket directly. They subscribe to an
//! injected [`EventBus`] and get back a [`Subscription`] whose drop
//! deregisters the handler. [`LocalEventBus`] dispatches synchronously in
//! publish order and is what socket/SSE adapters feed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::error::{Result, SyncError};

/// One named event as delivered by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub event: String,
    pub payload: serde_json::Value,
}

impl PushMessage {
    pub fn new(event: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            event: event.into(),
            payload,
        }
    }
}

/// Handler invoked for each matching message
pub type EventHandler = Arc<dyn Fn(&PushMessage) + Send + Sync>;

/// Subscribe/unsubscribe interface over the push transport
pub trait EventBus: Send + Sync {
    /// Register `handler` for `event`. The handler stays registered until
    /// the returned subscription is disposed or dropped.
    fn subscribe(&self, event: &str, handler: EventHandler) -> Subscription;
}

/// Disposer for one registered handler
pub struct Subscription {
    event: String,
    disposer: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(event: impl Into<String>, disposer: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            event: event.into(),
            disposer: Some(Box::new(disposer)),
        }
    }

    pub fn event(&self) -> &str {
        &self.event
    }

    pub fn dispose(mut self) {
        self.run_disposer();
    }

    fn run_disposer(&mut self) {
        if let Some(disposer) = self.disposer.take() {
            disposer();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.run_disposer();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("event", &self.event)
            .field("active", &self.disposer.is_some())
            .finish()
    }
}

type HandlerTable = HashMap<String, Vec<(u64, EventHandler)>>;

#[derive(Default)]
struct BusInner {
    handlers: RwLock<HandlerTable>,
    next_id: AtomicU64,
}

impl BusInner {
    fn unsubscribe(&self, event: &str, id: u64) {
        let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(list) = handlers.get_mut(event) {
            list.retain(|(handler_id, _)| *handler_id != id);
            if list.is_empty() {
                handlers.remove(event);
            }
        }
    }
}

/// In-process event bus
#[derive(Clone, Default)]
pub struct LocalEventBus {
    inner: Arc<BusInner>,
}

impl LocalEventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver a message to every handler registered for its event.
    /// Returns the number of handlers invoked.
    pub fn publish(&self, message: &PushMessage) -> usize {
        // Clone the handler list so handlers may (un)subscribe re-entrantly
        let handlers: Vec<EventHandler> = {
            let table = self.inner.handlers.read().unwrap_or_else(PoisonError::into_inner);
            table
                .get(&message.event)
                .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
                .unwrap_or_default()
        };

        trace!(event = %message.event, handlers = handlers.len(), "Publishing push event");
        for handler in &handlers {
            handler(message);
        }
        handlers.len()
    }

    /// Publish a raw transport frame `{"event": ..., "payload": ...}`
    pub fn publish_raw(&self, raw: &str) -> Result<usize> {
        let message: PushMessage = serde_json::from_str(raw).map_err(|e| SyncError::MalformedEvent {
            event: "frame".to_string(),
            reason: e.to_string(),
        })?;
        Ok(self.publish(&message))
    }

    /// Forward every message of a transport stream until it ends.
    /// Returns the number of messages forwarded.
    pub async fn pump<S>(&self, stream: S) -> usize
    where
        S: Stream<Item = PushMessage>,
    {
        let mut stream = std::pin::pin!(stream);
        let mut forwarded = 0;
        while let Some(message) = stream.next().await {
            self.publish(&message);
            forwarded += 1;
        }
        debug!(forwarded, "Push stream ended");
        forwarded
    }

    /// Forward from a broadcast channel until it closes. Lagged messages
    /// are lost; the next full fetch is the resync point.
    pub async fn pump_broadcast(&self, mut rx: broadcast::Receiver<PushMessage>) -> usize {
        let mut forwarded = 0;
        loop {
            match rx.recv().await {
                Ok(message) => {
                    self.publish(&message);
                    forwarded += 1;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Push receiver lagged; events dropped until next fetch");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
        forwarded
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.inner
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }
}

impl EventBus for LocalEventBus {
    fn subscribe(&self, event: &str, handler: EventHandler) -> Subscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push((id, handler));

        let weak: Weak<BusInner> = Arc::downgrade(&self.inner);
        let event_name = event.to_string();
        Subscription::new(event, move || {
            if let Some(inner) = weak.upgrade() {
                inner.unsubscribe(&event_name, id);
            }
        })
    }
}
