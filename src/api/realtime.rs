//! Dashboard transports.
//!
//! `GET /socket` is the WebSocket transport, `GET /socket/sse` the
//! Server-Sent Events fallback. Both stream every hub event as
//! `{"event": name, "data": envelope}` (SSE carries the name in its own
//! `event:` field). Browsers must come from an allowed origin.

use async_stream::stream;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    http::{header, HeaderMap},
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
};
use futures::{SinkExt, Stream, StreamExt};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::error::ApiError;
use crate::realtime::RealtimeHub;
use crate::AppState;

#[derive(Debug, Clone, Copy)]
struct SocketTiming {
    heartbeat: Duration,
    idle_timeout: Duration,
}

/// Requests without an Origin header come from non-browser clients and pass.
pub fn check_origin(headers: &HeaderMap, allowed: &[String]) -> Result<(), ApiError> {
    let Some(origin) = headers.get(header::ORIGIN) else {
        return Ok(());
    };
    let origin = origin
        .to_str()
        .map_err(|_| ApiError::forbidden("Malformed Origin header"))?;
    let origin = origin.trim_end_matches('/');

    if allowed
        .iter()
        .any(|candidate| candidate == "*" || candidate.trim_end_matches('/') == origin)
    {
        Ok(())
    } else {
        warn!(origin, "Rejected realtime connection from disallowed origin");
        Err(ApiError::forbidden("Origin not allowed"))
    }
}

/// GET /socket
pub async fn socket_ws(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Response, ApiError> {
    check_origin(&headers, &state.config.realtime.allowed_origins)?;

    let hub = state.hub.clone();
    let timing = SocketTiming {
        heartbeat: Duration::from_secs(state.config.realtime.heartbeat_interval_secs.max(1)),
        idle_timeout: Duration::from_secs(state.config.realtime.idle_timeout_secs.max(1)),
    };
    Ok(ws
        .on_upgrade(move |socket| handle_socket(socket, hub, timing))
        .into_response())
}

async fn handle_socket(socket: WebSocket, hub: Arc<RealtimeHub>, timing: SocketTiming) {
    let mut subscription = hub.subscribe("websocket");
    let (mut sender, mut receiver) = socket.split();

    let mut heartbeat = interval(timing.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    heartbeat.tick().await;

    let idle = sleep(timing.idle_timeout);
    tokio::pin!(idle);

    loop {
        tokio::select! {
            outbound = subscription.recv() => {
                let Some(message) = outbound else { break };
                let text = match serde_json::to_string(message.as_ref()) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(event = %message.event, error = %e, "Failed to encode realtime frame");
                        continue;
                    }
                };
                if sender.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if sender.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }
            inbound = receiver.next() => match inbound {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {
                    // Any frame, pongs included, proves the client is alive
                    idle.as_mut().reset(Instant::now() + timing.idle_timeout);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Realtime socket error");
                    break;
                }
            },
            _ = &mut idle => {
                info!(idle_secs = timing.idle_timeout.as_secs(), "Closing idle realtime socket");
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
        }
    }
    debug!("Realtime socket handler finished");
}

/// GET /socket/sse
pub async fn socket_sse(
    headers: HeaderMap,
    State(state): State<Arc<AppState>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    if !state.config.realtime.sse_enabled {
        return Err(ApiError::not_found("Event stream transport is disabled"));
    }
    check_origin(&headers, &state.config.realtime.allowed_origins)?;

    let mut subscription = state.hub.subscribe("sse");
    let events = stream! {
        while let Some(message) = subscription.recv().await {
            match Event::default().event(message.event.as_str()).json_data(&message.data) {
                Ok(event) => yield Ok(event),
                Err(e) => warn!(event = %message.event, error = %e, "Failed to encode SSE event"),
            }
        }
    };

    let keep_alive = KeepAlive::new()
        .interval(Duration::from_secs(state.config.realtime.heartbeat_interval_secs.max(1)));
    Ok(Sse::new(events).keep_alive(keep_alive))
}
