use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use super::error::ApiError;
use super::validation::{validate_create_barber_request, validate_update_barber_request};
use crate::db::{BarberResponse, CreateBarberRequest, UpdateBarberRequest};
use crate::AppState;

pub async fn list_barbers(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<BarberResponse>>, ApiError> {
    let barbers = state.store.list_barbers(true).await?;
    let barbers = barbers
        .into_iter()
        .map(BarberResponse::try_from)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Json(barbers))
}

pub async fn get_barber(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BarberResponse>, ApiError> {
    let barber = state
        .store
        .get_barber(&id)
        .await?
        .ok_or_else(|| ApiError::not_found("Barber not found"))?;
    Ok(Json(barber.try_into()?))
}

pub async fn create_barber(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateBarberRequest>,
) -> Result<(StatusCode, Json<BarberResponse>), ApiError> {
    validate_create_barber_request(&req)?;

    let barber = state.store.create_barber(&req).await?;
    tracing::info!(barber_id = %barber.id, name = %barber.name, "Barber created");

    Ok((StatusCode::CREATED, Json(barber.try_into()?)))
}

pub async fn update_barber(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateBarberRequest>,
) -> Result<Json<BarberResponse>, ApiError> {
    validate_update_barber_request(&req)?;

    let barber = state
        .store
        .update_barber(&id, &req)
        .await?
        .ok_or_else(|| ApiError::not_found("Barber not found"))?;
    tracing::info!(barber_id = %barber.id, "Barber schedule updated");

    Ok(Json(barber.try_into()?))
}
