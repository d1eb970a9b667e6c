use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;

use super::error::ApiError;
use super::validation::validate_create_contact_request;
use crate::db::{Contact, CreateContactRequest};
use crate::AppState;

pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateContactRequest>,
) -> Result<(StatusCode, Json<Contact>), ApiError> {
    validate_create_contact_request(&req)?;

    let contact = state.store.create_contact(&req).await?;
    tracing::info!(contact_id = %contact.id, "Contact message received");

    Ok((StatusCode::CREATED, Json(contact)))
}
