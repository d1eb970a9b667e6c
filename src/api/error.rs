//! Unified API error handling.
//!
//! Every handler failure is returned as
//! `{"error": {"code", "message", "details?"}}` with a matching HTTP status.
//! Domain errors from scheduling, bookings and orders convert here, so
//! handlers can use `?` throughout.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::db::OrderError;
use crate::scheduling::{BookingError, SchedulingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Client errors (4xx)
    BadRequest,
    Forbidden,
    NotFound,
    Conflict,
    ValidationError,

    // Server errors (5xx)
    InternalError,
    ServiceUnavailable,
    DatabaseError,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Conflict => StatusCode::CONFLICT,
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::DatabaseError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not_found",
            ErrorCode::Conflict => "conflict",
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::ServiceUnavailable => "service_unavailable",
            ErrorCode::DatabaseError => "database_error",
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Machine-readable error code
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ErrorDetails>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetails {
    /// Field-level validation errors
    ValidationErrors(HashMap<String, Vec<String>>),
    Generic(HashMap<String, serde_json::Value>),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    status: StatusCode,
    message: String,
    details: Option<ErrorDetails>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code(),
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: ErrorDetails) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_validation_errors(mut self, errors: HashMap<String, Vec<String>>) -> Self {
        self.details = Some(ErrorDetails::ValidationErrors(errors));
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadRequest, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Conflict error (409) - slot taken, stock exhausted or illegal state change
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Validation error (400) with field-level details
    pub fn validation(errors: HashMap<String, Vec<String>>) -> Self {
        let message = if errors.len() == 1 {
            errors
                .values()
                .next()
                .and_then(|v| v.first())
                .cloned()
                .unwrap_or_else(|| "Validation failed".to_string())
        } else {
            format!("Validation failed for {} fields", errors.len())
        };

        Self::new(ErrorCode::ValidationError, message).with_validation_errors(errors)
    }

    pub fn validation_field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = HashMap::new();
        errors.insert(field.to_string(), vec![message.into()]);
        Self::validation(errors)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let response = ErrorResponse {
            error: ErrorBody {
                code: self.code.as_str().to_string(),
                message: self.message,
                details: self.details,
            },
        };

        (self.status, Json(response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

// -------------------------------------------------------------------------
// Conversions from storage and domain errors
// -------------------------------------------------------------------------

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        tracing::error!("Database error: {}", err);

        match &err {
            sqlx::Error::RowNotFound => ApiError::not_found("Resource not found"),
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if msg.contains("UNIQUE constraint failed") {
                    ApiError::conflict("A resource with this identifier already exists")
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    ApiError::bad_request("Referenced resource does not exist")
                } else {
                    ApiError::database("A database error occurred")
                }
            }
            _ => ApiError::database("A database error occurred"),
        }
    }
}

impl From<SchedulingError> for ApiError {
    fn from(err: SchedulingError) -> Self {
        match &err {
            SchedulingError::InvalidDate(_) => ApiError::validation_field("date", err.to_string()),
            SchedulingError::InvalidTime(_) => ApiError::validation_field("time", err.to_string()),
            SchedulingError::MissingBarberId => {
                ApiError::validation_field("barber_id", err.to_string())
            }
            SchedulingError::InvalidWorkingHours(_) => {
                ApiError::validation_field("working_hours", err.to_string())
            }
            SchedulingError::InvalidInterval(_) | SchedulingError::InvalidOffset(_) => {
                tracing::error!(error = %err, "Scheduling misconfigured");
                ApiError::internal("Scheduling is misconfigured")
            }
            SchedulingError::BarberNotFound(_) => ApiError::not_found(err.to_string()),
            SchedulingError::BarberInactive(_) => ApiError::bad_request(err.to_string()),
            SchedulingError::Store(detail) => {
                tracing::error!(error = %detail, "Scheduling store error");
                ApiError::database("A database error occurred")
            }
        }
    }
}

impl From<BookingError> for ApiError {
    fn from(err: BookingError) -> Self {
        match err {
            BookingError::Invalid { field, message } => ApiError::validation_field(field, message),
            BookingError::Scheduling(inner) => inner.into(),
            BookingError::SlotTaken { .. } | BookingError::InvalidTransition { .. } => {
                ApiError::conflict(err.to_string())
            }
            BookingError::NotFound(_) | BookingError::TokenNotFound | BookingError::TokenExpired => {
                ApiError::not_found(err.to_string())
            }
            BookingError::Store(detail) => {
                tracing::error!(error = %detail, "Booking store error");
                ApiError::database("A database error occurred")
            }
        }
    }
}

impl From<OrderError> for ApiError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::Invalid { field, message } => ApiError::validation_field(field, message),
            OrderError::ProductNotFound(_) => ApiError::not_found(err.to_string()),
            OrderError::InsufficientStock {
                ref product_id,
                requested,
                available,
                ..
            } => {
                let details = HashMap::from([
                    ("product_id".to_string(), serde_json::json!(product_id)),
                    ("requested".to_string(), serde_json::json!(requested)),
                    ("available".to_string(), serde_json::json!(available)),
                ]);
                ApiError::conflict(err.to_string()).with_details(ErrorDetails::Generic(details))
            }
            OrderError::Store(detail) => {
                tracing::error!(error = %detail, "Order store error");
                ApiError::database("A database error occurred")
            }
        }
    }
}

/// Collects field errors and turns them into one validation [`ApiError`].
#[derive(Debug, Default)]
pub struct ValidationErrorBuilder {
    errors: HashMap<String, Vec<String>>,
}

impl ValidationErrorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) -> &mut Self {
        self.errors
            .entry(field.into())
            .or_default()
            .push(message.into());
        self
    }

    /// Record the error of a validator, if it failed.
    pub fn check(&mut self, field: &str, result: Result<(), String>) -> &mut Self {
        if let Err(message) = result {
            self.add(field, message);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn build(self) -> Option<ApiError> {
        if self.errors.is_empty() {
            None
        } else {
            Some(ApiError::validation(self.errors))
        }
    }

    pub fn finish(self) -> Result<(), ApiError> {
        match self.build() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduling::BookingStatus;

    #[test]
    fn test_validation_error_single_field() {
        let err = ApiError::validation_field("email", "Email is required");
        assert_eq!(err.code, ErrorCode::ValidationError);
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.message, "Email is required");
    }

    #[test]
    fn test_validation_error_builder() {
        let mut builder = ValidationErrorBuilder::new();
        builder.add("name", "Name is required");
        builder.check("email", Err("Invalid email format".to_string()));
        builder.check("phone", Ok(()));
        builder.add("name", "Name is too short");

        let err = builder.build().unwrap();
        assert!(err.message.contains("2 fields"));
        if let Some(ErrorDetails::ValidationErrors(errors)) = &err.details {
            assert_eq!(errors.get("name").unwrap().len(), 2);
            assert_eq!(errors.get("email").unwrap().len(), 1);
            assert!(!errors.contains_key("phone"));
        } else {
            panic!("Expected ValidationErrors details");
        }
    }

    #[test]
    fn test_booking_errors_map_to_statuses() {
        let cases = [
            (
                BookingError::SlotTaken {
                    date: "2025-06-10".to_string(),
                    time: "14:00".to_string(),
                },
                StatusCode::CONFLICT,
            ),
            (
                BookingError::InvalidTransition {
                    from: BookingStatus::Cancelled,
                    to: BookingStatus::Confirmed,
                },
                StatusCode::CONFLICT,
            ),
            (BookingError::TokenExpired, StatusCode::NOT_FOUND),
            (BookingError::NotFound("k1".to_string()), StatusCode::NOT_FOUND),
            (
                BookingError::Scheduling(SchedulingError::BarberNotFound("b9".to_string())),
                StatusCode::NOT_FOUND,
            ),
            (
                BookingError::Scheduling(SchedulingError::BarberInactive("b2".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (
                BookingError::Scheduling(SchedulingError::InvalidDate("10/06".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (BookingError::Store("disk I/O".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            let label = err.to_string();
            assert_eq!(ApiError::from(err).status, status, "{}", label);
        }
    }

    #[test]
    fn test_insufficient_stock_carries_details() {
        let err = ApiError::from(OrderError::InsufficientStock {
            product_id: "clay".to_string(),
            product_name: "Matte Clay".to_string(),
            requested: 3,
            available: 1,
        });
        assert_eq!(err.status, StatusCode::CONFLICT);
        match err.details {
            Some(ErrorDetails::Generic(details)) => assert_eq!(details["available"], 1),
            other => panic!("unexpected details {:?}", other),
        }
    }
}
