//! Fan-out of named events to every connected dashboard.
//!
//! Delivery is at-most-once: nothing is stored, nothing is acknowledged, and
//! an event emitted while no client is connected is gone.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::api::metrics::{record_broadcast, set_realtime_connections};

/// Sink the watchers publish to.
pub trait Broadcaster: Send + Sync {
    /// Returns how many clients the event was queued for.
    fn emit(&self, event: &str, payload: &Value) -> usize;
}

/// Frame sent to clients on every transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub event: String,
    pub data: Value,
}

pub struct RealtimeHub {
    sender: broadcast::Sender<Arc<OutboundMessage>>,
    connections: AtomicUsize,
}

impl RealtimeHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            connections: AtomicUsize::new(0),
        }
    }

    /// Register a client. The registration ends when the subscription drops.
    pub fn subscribe(self: &Arc<Self>, transport: &'static str) -> HubSubscription {
        let receiver = self.sender.subscribe();
        let count = self.connections.fetch_add(1, Ordering::SeqCst) + 1;
        set_realtime_connections(count);
        info!(transport, connections = count, "Realtime client connected");
        HubSubscription {
            receiver,
            hub: Arc::clone(self),
            transport,
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }
}

impl Broadcaster for RealtimeHub {
    fn emit(&self, event: &str, payload: &Value) -> usize {
        let message = Arc::new(OutboundMessage {
            event: event.to_string(),
            data: payload.clone(),
        });
        match self.sender.send(message) {
            Ok(receivers) => {
                record_broadcast(event);
                debug!(event, receivers, "Broadcast event");
                receivers
            }
            Err(_) => {
                debug!(event, "No realtime clients connected, event dropped");
                0
            }
        }
    }
}

pub struct HubSubscription {
    receiver: broadcast::Receiver<Arc<OutboundMessage>>,
    hub: Arc<RealtimeHub>,
    transport: &'static str,
}

impl HubSubscription {
    /// Next event for this client. A client that fell behind skips the
    /// events it missed. `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<Arc<OutboundMessage>> {
        loop {
            match self.receiver.recv().await {
                Ok(message) => return Some(message),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(transport = self.transport, skipped, "Realtime client lagging, events skipped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

impl Drop for HubSubscription {
    fn drop(&mut self) {
        let count = self.hub.connections.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        set_realtime_connections(count);
        info!(transport = self.transport, connections = count, "Realtime client disconnected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_emit_without_clients_drops_event() {
        let hub = Arc::new(RealtimeHub::new(8));
        assert_eq!(hub.emit("newOrder", &json!({"documentId": "o1"})), 0);

        // A client that connects later does not see it
        let mut late = hub.subscribe("test");
        hub.emit("newOrder", &json!({"documentId": "o2"}));
        let message = late.recv().await.unwrap();
        assert_eq!(message.data["documentId"], "o2");
    }

    #[tokio::test]
    async fn test_every_client_receives_each_event() {
        let hub = Arc::new(RealtimeHub::new(8));
        let mut first = hub.subscribe("websocket");
        let mut second = hub.subscribe("sse");
        assert_eq!(hub.connection_count(), 2);

        assert_eq!(hub.emit("booking:created", &json!({"documentId": "b1"})), 2);

        for sub in [&mut first, &mut second] {
            let message = sub.recv().await.unwrap();
            assert_eq!(message.event, "booking:created");
            assert_eq!(message.data["documentId"], "b1");
        }
    }

    #[tokio::test]
    async fn test_dropping_subscription_unregisters_client() {
        let hub = Arc::new(RealtimeHub::new(8));
        let sub = hub.subscribe("websocket");
        assert_eq!(hub.connection_count(), 1);
        drop(sub);
        assert_eq!(hub.connection_count(), 0);
        assert_eq!(hub.emit("newContact", &json!({})), 0);
    }

    #[tokio::test]
    async fn test_lagging_client_skips_to_recent_events() {
        let hub = Arc::new(RealtimeHub::new(2));
        let mut sub = hub.subscribe("websocket");
        for i in 0..5 {
            hub.emit("order:updated", &json!({"n": i}));
        }
        let message = sub.recv().await.unwrap();
        assert_eq!(message.data["n"], 3);
    }

    #[test]
    fn test_frame_shape() {
        let frame = OutboundMessage {
            event: "newBooking".to_string(),
            data: json!({"operationType": "insert"}),
        };
        assert_eq!(
            serde_json::to_value(&frame).unwrap(),
            json!({"event": "newBooking", "data": {"operationType": "insert"}})
        );
    }
}
