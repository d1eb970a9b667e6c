use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use super::error::ApiError;
use super::validation::validate_create_order_request;
use crate::db::{place_order, CreateOrderRequest, OrderWithItems};
use crate::AppState;

/// POST /api/orders - stock is decremented in the same transaction
pub async fn create_order(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderWithItems>), ApiError> {
    validate_create_order_request(&req)?;

    let placed = place_order(&state.db, &req).await?;
    Ok((StatusCode::CREATED, Json(placed)))
}
