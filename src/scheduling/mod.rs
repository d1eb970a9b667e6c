//! Appointment scheduling: the business calendar, the slot grid, the
//! availability engine and the booking service built on top of it.
//!
//! The engine never touches the database directly. It reads barbers through
//! [`BarberDirectory`] and existing bookings through [`BookingLedger`]; the
//! SQLite store implements both.

pub mod availability;
pub mod booking;
pub mod clock;
pub mod slots;

pub use availability::{AvailabilityEngine, AvailableSlot, SlotListing, SlotSettings, SlotStatus};
pub use booking::{
    BookingError, BookingRepository, BookingService, BookingSettings, ConfirmationNotifier,
    CreatedBooking, LogNotifier, SlotLocks,
};
pub use clock::{BusinessCalendar, Clock, DayRange, FixedClock, SystemClock};
pub use slots::{generate_time_slots, is_within_working_window, TimeOfDay, WorkingWindow};

use async_trait::async_trait;
use chrono::Weekday;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("Invalid working hours: {0}")]
    InvalidWorkingHours(String),

    #[error("Invalid slot interval: {0} minutes")]
    InvalidInterval(u32),

    #[error("Invalid UTC offset: {0} minutes")]
    InvalidOffset(i32),

    #[error("Barber id is required")]
    MissingBarberId,

    #[error("Barber not found: {0}")]
    BarberNotFound(String),

    #[error("Barber is not accepting bookings: {0}")]
    BarberInactive(String),

    #[error("Store error: {0}")]
    Store(String),
}

impl From<sqlx::Error> for SchedulingError {
    fn from(err: sqlx::Error) -> Self {
        SchedulingError::Store(err.to_string())
    }
}

/// Which weekdays a barber takes appointments. Serialized with lowercase
/// English weekday names as keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingDays {
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
}

impl Default for WorkingDays {
    fn default() -> Self {
        Self {
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: true,
            sunday: false,
        }
    }
}

impl WorkingDays {
    pub fn works_on(&self, weekday: Weekday) -> bool {
        match weekday {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }
}

/// Working hours as stored on a barber record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingHours {
    pub start: String,
    pub end: String,
}

/// The slice of a barber record the availability engine reads.
#[derive(Debug, Clone, PartialEq)]
pub struct BarberSchedule {
    pub id: String,
    pub name: String,
    pub is_active: bool,
    pub working_days: WorkingDays,
    pub working_hours: Option<WorkingHours>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
}

impl BookingStatus {
    /// Statuses that hold a slot.
    pub const ACTIVE: [BookingStatus; 2] = [BookingStatus::Pending, BookingStatus::Confirmed];

    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BookingStatus::Completed | BookingStatus::Cancelled)
    }

    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        use BookingStatus::*;
        matches!(
            (*self, next),
            (Pending, Confirmed) | (Confirmed, Completed) | (Pending, Cancelled) | (Confirmed, Cancelled)
        )
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("Unknown booking status: {}", other)),
        }
    }
}

/// A booking as seen by the availability engine.
#[derive(Debug, Clone, PartialEq)]
pub struct BookedSlot {
    pub booking_id: String,
    pub time: String,
    pub status: BookingStatus,
}

#[derive(Debug, Clone)]
pub struct BookingQuery {
    pub barber_id: String,
    pub range: DayRange,
    pub statuses: Vec<BookingStatus>,
}

#[async_trait]
pub trait BarberDirectory: Send + Sync {
    async fn barber_by_id(&self, id: &str) -> Result<Option<BarberSchedule>, SchedulingError>;
}

#[async_trait]
pub trait BookingLedger: Send + Sync {
    async fn find_bookings(&self, query: &BookingQuery) -> Result<Vec<BookedSlot>, SchedulingError>;
}
