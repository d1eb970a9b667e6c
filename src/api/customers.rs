use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use super::error::ApiError;
use super::validation::validate_create_customer_request;
use crate::db::{CreateCustomerRequest, Customer};
use crate::AppState;

/// POST /api/customers - a duplicate email is a 409
pub async fn create_customer(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<Customer>), ApiError> {
    validate_create_customer_request(&req)?;

    let customer = state.store.create_customer(&req).await?;
    tracing::info!(customer_id = %customer.id, "Customer registered");

    Ok((StatusCode::CREATED, Json(customer)))
}
