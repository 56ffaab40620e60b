//! In-process event bus for deployment events.
//!
//! Each category is a typed [`Topic`]: access-point events carry an
//! [`AccessPoint`], reactor events carry the [`Api`] definition.
//! Delivery is synchronous: [`Topic::publish`] returns once every
//! subscriber registered at publish time has seen the event.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::config::model::{AccessPoint, Api};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    Deploy,
    Update,
    Undeploy,
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Deploy => "DEPLOY",
            Self::Update => "UPDATE",
            Self::Undeploy => "UNDEPLOY",
        })
    }
}

#[derive(Debug, Clone)]
pub struct Event<T> {
    pub kind: EventType,
    pub content: T,
}

impl<T> Event<T> {
    #[must_use]
    pub const fn new(kind: EventType, content: T) -> Self {
        Self { kind, content }
    }
}

pub type Subscription = u64;

type Handler<T> = Arc<dyn Fn(&Event<T>) + Send + Sync>;

pub struct Topic<T> {
    name: &'static str,
    next_id: AtomicU64,
    subscribers: DashMap<Subscription, Handler<T>>,
}

impl<T> Topic<T> {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            next_id: AtomicU64::new(1),
            subscribers: DashMap::new(),
        }
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&Event<T>) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, Arc::new(handler));
        tracing::trace!(topic = self.name, subscription = id, "subscribed");
        id
    }

    /// Returns `false` when the subscription was already gone.
    pub fn unsubscribe(&self, id: Subscription) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            tracing::trace!(topic = self.name, subscription = id, "unsubscribed");
        }
        removed
    }

    pub fn publish(&self, event: &Event<T>) {
        // Snapshot first: handlers may (un)subscribe while being called.
        let handlers: Vec<Handler<T>> = self
            .subscribers
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();

        tracing::debug!(
            topic = self.name,
            kind = %event.kind,
            subscribers = handlers.len(),
            "publishing event"
        );

        for handler in handlers {
            handler(event);
        }
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

struct Topics {
    access_points: Topic<AccessPoint>,
    reactors: Topic<Api>,
}

/// Cheaply cloneable handle to the gateway-wide topics.
#[derive(Clone)]
pub struct EventManager {
    topics: Arc<Topics>,
}

impl Default for EventManager {
    fn default() -> Self {
        Self::new()
    }
}

impl EventManager {
    #[must_use]
    pub fn new() -> Self {
        Self {
            topics: Arc::new(Topics {
                access_points: Topic::new("access-point"),
                reactors: Topic::new("reactor"),
            }),
        }
    }

    #[must_use]
    pub fn access_points(&self) -> &Topic<AccessPoint> {
        &self.topics.access_points
    }

    #[must_use]
    pub fn reactors(&self) -> &Topic<Api> {
        &self.topics.reactors
    }
}
