//! Handler registry keyed by event name.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

pub type Handler = Arc<dyn Fn(&Value) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

struct Registration {
    token: SubscriptionToken,
    handler: Handler,
}

#[derive(Default)]
pub struct EventBus {
    handlers: RwLock<HashMap<String, Vec<Registration>>>,
    next_token: AtomicU64,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, event: &str, handler: F) -> SubscriptionToken
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.subscribe_handler(event, Arc::new(handler))
    }

    /// Register a shared handler. Registering the same handler twice for one
    /// event returns the original token instead of adding a second entry.
    pub fn subscribe_handler(&self, event: &str, handler: Handler) -> SubscriptionToken {
        let mut handlers = self.handlers.write();
        let registrations = handlers.entry(event.to_string()).or_default();

        if let Some(existing) = registrations
            .iter()
            .find(|registration| Arc::ptr_eq(&registration.handler, &handler))
        {
            return existing.token;
        }

        let token = SubscriptionToken(self.next_token.fetch_add(1, Ordering::Relaxed));
        registrations.push(Registration { token, handler });
        debug!(event, "Handler subscribed");
        token
    }

    /// Returns false when the token was already removed.
    pub fn unsubscribe(&self, token: SubscriptionToken) -> bool {
        let mut handlers = self.handlers.write();
        let mut removed = false;
        handlers.retain(|_, registrations| {
            let before = registrations.len();
            registrations.retain(|registration| registration.token != token);
            removed |= registrations.len() != before;
            !registrations.is_empty()
        });
        removed
    }

    /// Invoke every handler registered for `event`. Handlers run outside the
    /// registry lock, so they may subscribe or unsubscribe themselves.
    pub fn dispatch(&self, event: &str, payload: &Value) -> usize {
        let handlers: Vec<Handler> = match self.handlers.read().get(event) {
            Some(registrations) => registrations
                .iter()
                .map(|registration| registration.handler.clone())
                .collect(),
            None => return 0,
        };
        for handler in &handlers {
            handler(payload);
        }
        trace!(event, handlers = handlers.len(), "Dispatched event");
        handlers.len()
    }

    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers.read().get(event).map_or(0, Vec::len)
    }
}
