//! Prometheus metrics endpoint and HTTP request tracking middleware.
//!
//! This module provides:
//! - A `/metrics` endpoint that returns Prometheus-formatted metrics
//! - Middleware for tracking HTTP request counts and durations
//! - Helper functions for booking and realtime metrics

use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::{MatchedPath, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use std::time::Instant;

use crate::AppState;

pub const HTTP_REQUESTS_TOTAL: &str = "http_requests_total";
pub const HTTP_REQUEST_DURATION_SECONDS: &str = "http_request_duration_seconds";
pub const BOOKINGS_CREATED_TOTAL: &str = "bookings_created_total";
pub const REALTIME_EVENTS_BROADCAST_TOTAL: &str = "realtime_events_broadcast_total";
pub const REALTIME_CONNECTIONS: &str = "realtime_connections";
pub const WATCHER_RESTARTS_TOTAL: &str = "watcher_restarts_total";

/// Install the Prometheus recorder. Call once during startup.
pub fn init_metrics() -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context("Failed to install Prometheus recorder")?;

    describe_counter!(HTTP_REQUESTS_TOTAL, "Total number of HTTP requests received");
    describe_histogram!(HTTP_REQUEST_DURATION_SECONDS, "HTTP request duration in seconds");
    describe_counter!(BOOKINGS_CREATED_TOTAL, "Bookings created, by initial status");
    describe_counter!(
        REALTIME_EVENTS_BROADCAST_TOTAL,
        "Events handed to at least one realtime client, by event name"
    );
    describe_gauge!(REALTIME_CONNECTIONS, "Currently connected dashboard clients");
    describe_counter!(WATCHER_RESTARTS_TOTAL, "Change-feed watcher restarts, by collection");

    Ok(handle)
}

/// GET /metrics
pub async fn metrics_endpoint(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    set_realtime_connections(state.hub.connection_count());

    match state.metrics_handle.as_ref() {
        Some(h) => (StatusCode::OK, h.render()),
        None => (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Metrics not initialized".to_string(),
        ),
    }
}

/// Middleware to track HTTP request metrics.
///
/// Records:
/// - `http_requests_total` counter with method, path, and status labels
/// - `http_request_duration_seconds` histogram with method and path labels
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response {
    let start = Instant::now();

    // Matched route template keeps ids out of the label set
    let path = request
        .extensions()
        .get::<MatchedPath>()
        .map(|mp| mp.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let method = request.method().to_string();

    let response = next.run(request).await;

    let duration = start.elapsed().as_secs_f64();
    let status = response.status().as_u16().to_string();

    counter!(HTTP_REQUESTS_TOTAL, "method" => method.clone(), "path" => path.clone(), "status" => status).increment(1);
    histogram!(HTTP_REQUEST_DURATION_SECONDS, "method" => method, "path" => path).record(duration);

    response
}

pub fn record_booking_created(status: &'static str) {
    counter!(BOOKINGS_CREATED_TOTAL, "status" => status).increment(1);
}

pub fn record_broadcast(event: &str) {
    counter!(REALTIME_EVENTS_BROADCAST_TOTAL, "event" => event.to_string()).increment(1);
}

pub fn set_realtime_connections(count: usize) {
    gauge!(REALTIME_CONNECTIONS).set(count as f64);
}

pub fn record_watcher_restart(collection: &'static str) {
    counter!(WATCHER_RESTARTS_TOTAL, "collection" => collection).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_names() {
        for name in [
            HTTP_REQUESTS_TOTAL,
            BOOKINGS_CREATED_TOTAL,
            REALTIME_EVENTS_BROADCAST_TOTAL,
            WATCHER_RESTARTS_TOTAL,
        ] {
            assert!(name.ends_with("_total"), "{}", name);
        }
        assert!(HTTP_REQUEST_DURATION_SECONDS.ends_with("_seconds"));
    }

    #[test]
    fn test_helpers_without_recorder_are_noops() {
        record_booking_created("pending");
        record_broadcast("newOrder");
        set_realtime_connections(3);
        record_watcher_restart("orders");
    }
}
