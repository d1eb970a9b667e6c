//! Reconnecting WebSocket client for staff dashboards.
//!
//! One client per dashboard session. Inbound `{"event", "data"}` frames are
//! dispatched through the [`EventBus`]. A close frame from the server triggers
//! an immediate reconnect; closes that follow one another with no traffic in
//! between, and any other loss of connection, back off exponentially until
//! the attempt budget is spent, after which the client stays in
//! [`ConnectionState::Failed`]. Only a session that received at least one
//! frame restores the budget.

use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::bus::EventBus;
use crate::realtime::hub::OutboundMessage;
use crate::realtime::watcher::shutdown_requested;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("Connection failed: {0}")]
    Connect(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Connecting,
    Connected,
    Reconnecting { attempt: u32 },
    Failed { reason: String },
    Closed,
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(5),
            multiplier: 2,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect attempt `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .max(1)
            .saturating_pow(attempt.saturating_sub(1));
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LastMessage {
    pub event: String,
    pub payload: Value,
    pub received_at: DateTime<Utc>,
}

enum Disconnect {
    Shutdown,
    ServerClosed,
    Dropped(String),
}

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct RealtimeClient {
    url: String,
    policy: ReconnectPolicy,
    bus: Arc<EventBus>,
    state: watch::Sender<ConnectionState>,
    last_message: RwLock<Option<LastMessage>>,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeClient {
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy, bus: Arc<EventBus>) -> Arc<Self> {
        let (state, _) = watch::channel(ConnectionState::Idle);
        let (shutdown, _) = watch::channel(false);
        Arc::new(Self {
            url: url.into(),
            policy,
            bus,
            state,
            last_message: RwLock::new(None),
            shutdown,
            task: Mutex::new(None),
        })
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Start the connection task. Does nothing while one is already running.
    pub fn connect(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        self.shutdown.send_replace(false);
        let shutdown = self.shutdown.subscribe();
        *task = Some(tokio::spawn(Arc::clone(self).run(shutdown)));
    }

    pub async fn disconnect(&self) {
        self.shutdown.send_replace(true);
        let handle = self.task.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                warn!(error = %e, "Realtime client task ended abnormally");
            }
        }
        self.state.send_replace(ConnectionState::Closed);
    }

    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    pub fn current_state(&self) -> ConnectionState {
        self.state.borrow().clone()
    }

    pub fn last_message(&self) -> Option<LastMessage> {
        self.last_message.read().clone()
    }

    /// Decode one text frame, record it and dispatch it to the bus.
    pub fn handle_frame(&self, text: &str) -> Result<usize, TransportError> {
        let frame: OutboundMessage =
            serde_json::from_str(text).map_err(|e| TransportError::MalformedFrame(e.to_string()))?;
        *self.last_message.write() = Some(LastMessage {
            event: frame.event.clone(),
            payload: frame.data.clone(),
            received_at: Utc::now(),
        });
        Ok(self.bus.dispatch(&frame.event, &frame.data))
    }

    fn set_state(&self, next: ConnectionState) {
        debug!(url = %self.url, state = ?next, "Realtime client state changed");
        self.state.send_replace(next);
    }

    async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        self.set_state(ConnectionState::Connecting);
        let mut failures: u32 = 0;
        let mut closes_in_a_row: u32 = 0;
        let mut last_error = String::new();

        loop {
            let connected = tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                connected = connect_async(self.url.as_str()) => connected,
            };

            match connected {
                Ok((socket, _)) => {
                    self.set_state(ConnectionState::Connected);
                    info!(url = %self.url, "Realtime client connected");

                    let (outcome, frames) = self.pump(socket, &mut shutdown).await;
                    if frames > 0 {
                        failures = 0;
                        closes_in_a_row = 0;
                    }
                    match outcome {
                        Disconnect::Shutdown => break,
                        Disconnect::ServerClosed => {
                            closes_in_a_row += 1;
                            if closes_in_a_row == 1 {
                                info!(url = %self.url, "Server closed the connection, reconnecting");
                                self.set_state(ConnectionState::Reconnecting { attempt: 1 });
                                continue;
                            }
                            warn!(
                                url = %self.url,
                                closes = closes_in_a_row,
                                "Server keeps closing the connection without traffic"
                            );
                            last_error = "server closed the connection repeatedly".to_string();
                        }
                        Disconnect::Dropped(reason) => {
                            warn!(url = %self.url, reason = %reason, "Realtime connection lost");
                            last_error = reason;
                        }
                    }
                }
                Err(e) => {
                    let err = TransportError::Connect(e.to_string());
                    warn!(url = %self.url, error = %err, "Realtime connection attempt failed");
                    last_error = err.to_string();
                }
            }

            failures += 1;
            if failures > self.policy.max_attempts {
                error!(
                    url = %self.url,
                    attempts = self.policy.max_attempts,
                    reason = %last_error,
                    "Giving up on realtime connection"
                );
                self.set_state(ConnectionState::Failed { reason: last_error });
                return;
            }

            self.set_state(ConnectionState::Reconnecting { attempt: failures });
            tokio::select! {
                _ = shutdown_requested(&mut shutdown) => break,
                _ = tokio::time::sleep(self.policy.delay_for(failures)) => {}
            }
        }

        self.set_state(ConnectionState::Closed);
    }

    /// Relay frames until the connection ends. Also returns how many frames
    /// arrived, pings included.
    async fn pump(&self, socket: Socket, shutdown: &mut watch::Receiver<bool>) -> (Disconnect, usize) {
        let (mut sender, mut receiver) = socket.split();
        let mut frames = 0;

        loop {
            tokio::select! {
                _ = shutdown_requested(shutdown) => {
                    let _ = sender.send(Message::Close(None)).await;
                    return (Disconnect::Shutdown, frames);
                }
                frame = receiver.next() => match frame {
                    Some(Ok(Message::Close(_))) => return (Disconnect::ServerClosed, frames),
                    Some(Ok(Message::Text(text))) => {
                        frames += 1;
                        if let Err(e) = self.handle_frame(text.as_str()) {
                            warn!(url = %self.url, error = %e, "Ignoring realtime frame");
                        }
                    }
                    Some(Ok(_)) => frames += 1,
                    Some(Err(e)) => return (Disconnect::Dropped(e.to_string()), frames),
                    None => return (Disconnect::Dropped("connection ended".to_string()), frames),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;
    use tokio::time::timeout;
    use tokio_tungstenite::accept_async;

    #[test]
    fn test_backoff_doubles_up_to_cap() {
        let policy = ReconnectPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for(4), Duration::from_secs(5));
        assert_eq!(policy.delay_for(40), Duration::from_secs(5));
    }

    #[test]
    fn test_frames_update_last_message_and_dispatch() {
        let bus = Arc::new(EventBus::new());
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        bus.subscribe("order:created", move |payload| {
            assert_eq!(payload["documentId"], "o9");
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let client = RealtimeClient::new("ws://127.0.0.1:9/socket", ReconnectPolicy::default(), bus);
        assert!(client.last_message().is_none());

        let delivered = client
            .handle_frame(r#"{"event":"order:created","data":{"documentId":"o9"}}"#)
            .unwrap();
        assert_eq!(delivered, 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        let last = client.last_message().unwrap();
        assert_eq!(last.event, "order:created");
        assert_eq!(last.payload, json!({"documentId": "o9"}));

        assert!(matches!(
            client.handle_frame("not json"),
            Err(TransportError::MalformedFrame(_))
        ));
        assert_eq!(client.last_message().unwrap().event, "order:created");
    }

    #[tokio::test]
    async fn test_exhausted_attempts_leave_client_failed() {
        // Bind then drop to get a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let policy = ReconnectPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            multiplier: 2,
        };
        let client = RealtimeClient::new(format!("ws://{}/socket", addr), policy, Arc::new(EventBus::new()));
        let mut state = client.state();
        client.connect();

        timeout(
            Duration::from_secs(5),
            state.wait_for(|s| matches!(s, ConnectionState::Failed { .. })),
        )
        .await
        .unwrap()
        .unwrap();

        // Failed is sticky
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(matches!(client.current_state(), ConnectionState::Failed { .. }));
    }

    #[tokio::test]
    async fn test_server_close_reconnects_immediately() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));

        let server_accepted = accepted.clone();
        tokio::spawn(async move {
            loop {
                let (tcp, _) = listener.accept().await.unwrap();
                let n = server_accepted.fetch_add(1, Ordering::SeqCst) + 1;
                tokio::spawn(async move {
                    let mut ws = accept_async(tcp).await.unwrap();
                    if n == 1 {
                        let frame = json!({"event": "newBooking", "data": {"documentId": "b1"}});
                        ws.send(Message::Text(frame.to_string().into())).await.unwrap();
                        ws.close(None).await.unwrap();
                    }
                    while let Some(Ok(_)) = ws.next().await {}
                });
            }
        });

        let bus = Arc::new(EventBus::new());
        let bookings = Arc::new(AtomicUsize::new(0));
        let counter = bookings.clone();
        bus.subscribe("newBooking", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        // A backoff this long would blow the timeout below
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
            ..ReconnectPolicy::default()
        };
        let client = RealtimeClient::new(format!("ws://{}/socket", addr), policy, bus);
        let mut state = client.state();
        client.connect();

        timeout(Duration::from_secs(5), async {
            while accepted.load(Ordering::SeqCst) < 2 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
        timeout(Duration::from_secs(5), state.wait_for(|s| *s == ConnectionState::Connected))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(bookings.load(Ordering::SeqCst), 1);
        assert_eq!(client.last_message().unwrap().event, "newBooking");

        client.disconnect().await;
        assert_eq!(client.current_state(), ConnectionState::Closed);
    }

    #[tokio::test]
    async fn test_repeated_server_closes_spend_the_budget() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));

        let server_accepted = accepted.clone();
        tokio::spawn(async move {
            loop {
                let (tcp, _) = listener.accept().await.unwrap();
                server_accepted.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut ws = accept_async(tcp).await.unwrap();
                    let _ = ws.close(None).await;
                    while let Some(Ok(_)) = ws.next().await {}
                });
            }
        });

        let policy = ReconnectPolicy {
            max_attempts: 2,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
            multiplier: 2,
        };
        let client = RealtimeClient::new(format!("ws://{}/socket", addr), policy, Arc::new(EventBus::new()));
        let mut state = client.state();
        client.connect();

        timeout(
            Duration::from_secs(5),
            state.wait_for(|s| matches!(s, ConnectionState::Failed { .. })),
        )
        .await
        .unwrap()
        .unwrap();

        // One free reconnect, then one connection per budgeted attempt
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(accepted.load(Ordering::SeqCst), 4);
        match client.current_state() {
            ConnectionState::Failed { reason } => assert!(reason.contains("closed")),
            other => panic!("unexpected state {:?}", other),
        }
    }
}
