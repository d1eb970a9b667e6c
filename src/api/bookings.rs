use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

use super::error::ApiError;
use super::validation::validate_create_booking_request;
use crate::db::{Booking, CreateBookingRequest, CreateBookingResponse, UpdateBookingStatusRequest};
use crate::scheduling::{AvailableSlot, SlotListing, SlotStatus};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct SlotQuery {
    pub barber_id: Option<String>,
    pub date: Option<String>,
}

impl SlotQuery {
    fn parts(&self) -> (&str, &str) {
        (
            self.barber_id.as_deref().unwrap_or_default(),
            self.date.as_deref().unwrap_or_default(),
        )
    }
}

/// GET /api/bookings/available-slots?barber_id=&date=
pub async fn available_slots(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<SlotListing<AvailableSlot>>, ApiError> {
    let (barber_id, date) = query.parts();
    Ok(Json(state.engine.list_available_slots(barber_id, date).await?))
}

/// GET /api/bookings/slot-status?barber_id=&date=
pub async fn slot_status(
    State(state): State<Arc<AppState>>,
    Query(query): Query<SlotQuery>,
) -> Result<Json<SlotListing<SlotStatus>>, ApiError> {
    let (barber_id, date) = query.parts();
    Ok(Json(state.engine.slot_status(barber_id, date).await?))
}

pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<CreateBookingResponse>), ApiError> {
    validate_create_booking_request(&req)?;

    let created = state.bookings.create_booking(req).await?;
    Ok((
        StatusCode::CREATED,
        Json(CreateBookingResponse {
            confirmation_required: created.confirmation_token.is_some(),
            booking: created.booking,
        }),
    ))
}

/// GET /api/bookings/confirm/:token - target of the emailed link
pub async fn confirm_booking(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<Booking>, ApiError> {
    Ok(Json(state.bookings.confirm_booking(&token).await?))
}

pub async fn update_booking_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateBookingStatusRequest>,
) -> Result<Json<Booking>, ApiError> {
    Ok(Json(state.bookings.update_status(&id, &req.status).await?))
}
