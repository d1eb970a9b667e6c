mod barbers;
mod bookings;
mod contacts;
mod customers;
pub mod error;
pub mod metrics;
mod orders;
pub mod realtime;
pub mod validation;

use axum::{
    http::{header::CONTENT_TYPE, HeaderValue, Method},
    middleware,
    routing::{get, patch, post},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::AppState;

pub fn create_router(state: Arc<AppState>) -> Router {
    let api_routes = Router::new()
        // Barbers
        .route("/barbers", get(barbers::list_barbers).post(barbers::create_barber))
        .route("/barbers/:id", get(barbers::get_barber).put(barbers::update_barber))
        // Availability and bookings
        .route("/bookings", post(bookings::create_booking))
        .route("/bookings/available-slots", get(bookings::available_slots))
        .route("/bookings/slot-status", get(bookings::slot_status))
        .route("/bookings/confirm/:token", get(bookings::confirm_booking))
        .route("/bookings/:id/status", patch(bookings::update_booking_status))
        // Storefront and inbox
        .route("/orders", post(orders::create_order))
        .route("/contacts", post(contacts::create_contact))
        .route("/customers", post(customers::create_customer));

    let cors = cors_layer(&state.config.realtime.allowed_origins);

    Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(metrics::metrics_endpoint))
        .route("/socket", get(realtime::socket_ws))
        .route("/socket/sse", get(realtime::socket_sse))
        .nest("/api", api_routes)
        .layer(middleware::from_fn(metrics::metrics_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    if allowed_origins.iter().any(|origin| origin == "*") {
        return cors.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin.trim_end_matches('/')).ok())
        .collect();
    cors.allow_origin(AllowOrigin::list(origins))
}

async fn health_check() -> &'static str {
    "OK"
}
