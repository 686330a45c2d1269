//! Event Bus - named-topic pub/sub spine
//!
//! Every state change in the queue, workflow and analysis subsystems
//! is published here; consumers (the WebSocket bridge, tests, loggers)
//! subscribe per topic. Handlers for one publish run concurrently and
//! the publish call returns once all of them have settled. A handler
//! failure is logged and never reaches the publisher.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::join_all;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::types::Event;

type BoxFuture = Pin<Box<dyn Future<Output = eyre::Result<()>> + Send>>;

/// A subscribed event handler
pub type Handler = Arc<dyn Fn(Event) -> BoxFuture + Send + Sync>;

/// Middleware may rewrite the event or short-circuit by returning None
pub type Middleware = Arc<dyn Fn(Event) -> Option<Event> + Send + Sync>;

/// Handle returned by subscribe, used to unsubscribe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriptionId {
    topic: String,
    id: u64,
}

struct BusInner {
    next_id: u64,
    /// Per-topic handler lists; insertion order preserved
    handlers: HashMap<String, Vec<(u64, Handler)>>,
    middleware: Vec<Middleware>,
}

/// Central pub/sub hub
pub struct EventBus {
    inner: RwLock<BusInner>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(BusInner {
                next_id: 0,
                handlers: HashMap::new(),
                middleware: Vec::new(),
            }),
        }
    }

    /// Subscribe a handler to a topic
    pub async fn subscribe<F, Fut>(&self, topic: &str, handler: F) -> SubscriptionId
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = eyre::Result<()>> + Send + 'static,
    {
        let boxed: Handler = Arc::new(move |event| Box::pin(handler(event)) as BoxFuture);

        let mut inner = self.inner.write().await;
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.entry(topic.to_string()).or_default().push((id, boxed));

        debug!(topic, id, "EventBus::subscribe");
        SubscriptionId {
            topic: topic.to_string(),
            id,
        }
    }

    /// Remove a subscription; in-flight deliveries are unaffected
    pub async fn unsubscribe(&self, subscription: &SubscriptionId) {
        let mut inner = self.inner.write().await;
        if let Some(handlers) = inner.handlers.get_mut(&subscription.topic) {
            handlers.retain(|(id, _)| *id != subscription.id);
        }
        debug!(topic = %subscription.topic, id = subscription.id, "EventBus::unsubscribe");
    }

    /// Append middleware to the chain
    pub async fn use_middleware<F>(&self, middleware: F)
    where
        F: Fn(Event) -> Option<Event> + Send + Sync + 'static,
    {
        self.inner.write().await.middleware.push(Arc::new(middleware));
    }

    /// Publish an event to every handler of its topic
    ///
    /// Applies the middleware chain first; any middleware returning
    /// None short-circuits the publish. Handler lists are copied
    /// before iteration so (un)subscription during a live publish
    /// cannot disturb in-flight deliveries.
    pub async fn publish(&self, topic: &str, payload: Value) {
        let event = Event::new(topic, payload);

        // Snapshot middleware and handlers, then release the lock
        let (middleware, handlers) = {
            let inner = self.inner.read().await;
            let handlers = inner.handlers.get(topic).cloned().unwrap_or_default();
            (inner.middleware.clone(), handlers)
        };

        let mut event = event;
        for mw in &middleware {
            match mw(event) {
                Some(rewritten) => event = rewritten,
                None => {
                    debug!(topic, "EventBus::publish: short-circuited by middleware");
                    return;
                }
            }
        }

        if handlers.is_empty() {
            return;
        }

        // Handlers run concurrently as spawned tasks; a panic or error
        // in one is isolated from its peers and from the publisher.
        let tasks: Vec<_> = handlers
            .into_iter()
            .map(|(id, handler)| {
                let event = event.clone();
                let topic = topic.to_string();
                tokio::spawn(async move {
                    if let Err(e) = handler(event).await {
                        warn!(%topic, id, error = %e, "Event handler failed");
                    }
                })
            })
            .collect();

        for result in join_all(tasks).await {
            if let Err(e) = result {
                warn!(topic, error = %e, "Event handler panicked");
            }
        }
    }

    /// Number of handlers currently subscribed to a topic
    pub async fn handler_count(&self, topic: &str) -> usize {
        self.inner.read().await.handlers.get(topic).map(|h| h.len()).unwrap_or(0)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Create an event bus wrapped in an Arc for shared ownership
pub fn create_event_bus() -> Arc<EventBus> {
    Arc::new(EventBus::new())
}

/// Handle for components to publish without owning the bus
///
/// Cheap to clone; merges its scope fields (`projectId`, and
/// `queueItemId` when bound) into every payload it publishes.
#[derive(Clone)]
pub struct EventEmitter {
    bus: Arc<EventBus>,
    project_id: String,
    queue_item_id: Option<String>,
}

impl EventEmitter {
    pub fn new(bus: Arc<EventBus>, project_id: impl Into<String>) -> Self {
        Self {
            bus,
            project_id: project_id.into(),
            queue_item_id: None,
        }
    }

    /// Bind a queue item id that will be merged into every payload
    pub fn for_queue_item(mut self, queue_item_id: impl Into<String>) -> Self {
        self.queue_item_id = Some(queue_item_id.into());
        self
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Publish with the emitter's scope fields merged in
    pub async fn emit(&self, topic: &str, payload: Value) {
        let mut payload = match payload {
            Value::Object(map) => map,
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("data".to_string(), other);
                map
            }
        };
        payload.insert("projectId".to_string(), Value::String(self.project_id.clone()));
        if let Some(id) = &self.queue_item_id {
            payload.insert("queueItemId".to_string(), Value::String(id.clone()));
        }
        self.bus.publish(topic, Value::Object(payload)).await;
    }
}
