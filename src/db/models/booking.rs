//! Booking records, requests and confirmation tokens.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::scheduling::BookingStatus;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Booking {
    pub id: String,
    pub service: String,
    pub barber_id: String,
    /// UTC instant of local midnight of the booked day
    pub date: String,
    pub time: String,
    pub customer_name: String,
    pub email: String,
    pub phone: String,
    pub user_id: Option<String>,
    pub notes: Option<String>,
    pub status: String,
    pub full_date_time: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Booking {
    pub fn status(&self) -> Result<BookingStatus, String> {
        self.status.parse()
    }
}

/// A validated booking ready to be written.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub id: String,
    pub service: String,
    pub barber_id: String,
    pub date: String,
    pub time: String,
    pub customer_name: String,
    pub email: String,
    pub phone: String,
    pub user_id: Option<String>,
    pub notes: Option<String>,
    pub status: BookingStatus,
    pub full_date_time: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub service: String,
    pub barber_id: String,
    pub date: String,
    pub time: String,
    #[serde(alias = "name")]
    pub customer_name: String,
    pub email: String,
    pub phone: String,
    pub user_id: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateBookingStatusRequest {
    pub status: String,
}

#[derive(Debug, Serialize)]
pub struct CreateBookingResponse {
    pub booking: Booking,
    pub confirmation_required: bool,
}

#[derive(Debug, Clone, FromRow)]
pub struct ConfirmationToken {
    pub token_hash: String,
    pub booking_id: String,
    pub created_at: String,
    pub expires_at: String,
}
