use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

use super::clock::{parse_date, weekday_name, BusinessCalendar};
use super::slots::{generate_time_slots, TimeOfDay, WorkingWindow};
use super::{BarberDirectory, BarberSchedule, BookingLedger, BookingQuery, BookingStatus, SchedulingError};
use crate::config::SchedulingConfig;

#[derive(Debug, Clone, Copy)]
pub struct SlotSettings {
    pub interval_minutes: u32,
    pub same_day_buffer_minutes: u32,
    /// Used for barbers without their own working hours.
    pub default_window: WorkingWindow,
}

impl SlotSettings {
    pub fn from_config(config: &SchedulingConfig) -> Result<Self, SchedulingError> {
        Ok(Self {
            interval_minutes: config.slot_interval_minutes,
            same_day_buffer_minutes: config.same_day_buffer_minutes,
            default_window: WorkingWindow::parse(&config.default_open, &config.default_close)?,
        })
    }
}

impl Default for SlotSettings {
    fn default() -> Self {
        Self {
            interval_minutes: 30,
            same_day_buffer_minutes: 30,
            default_window: WorkingWindow::default(),
        }
    }
}

/// Entry of the customer-facing listing. Past slots are left out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailableSlot {
    pub start_time: TimeOfDay,
    pub is_available: bool,
}

/// Entry of the staff-facing listing. Every generated slot is present.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotStatus {
    pub start_time: TimeOfDay,
    #[serde(rename = "isPast")]
    pub is_past: bool,
    #[serde(rename = "isAvailable")]
    pub is_available: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotListing<T> {
    pub barber_id: String,
    pub date: NaiveDate,
    pub weekday: &'static str,
    pub slots: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy)]
struct EvaluatedSlot {
    time: TimeOfDay,
    is_past: bool,
    is_available: bool,
}

struct DayEvaluation {
    barber_id: String,
    date: NaiveDate,
    slots: Vec<EvaluatedSlot>,
    message: Option<String>,
}

impl DayEvaluation {
    fn into_listing<T>(self, map: impl FnMut(EvaluatedSlot) -> Option<T>) -> SlotListing<T> {
        SlotListing {
            barber_id: self.barber_id,
            date: self.date,
            weekday: weekday_name(self.date),
            slots: self.slots.into_iter().filter_map(map).collect(),
            message: self.message,
        }
    }
}

/// Computes bookable slots for a barber on a day and answers point checks.
pub struct AvailabilityEngine {
    directory: Arc<dyn BarberDirectory>,
    ledger: Arc<dyn BookingLedger>,
    calendar: BusinessCalendar,
    settings: SlotSettings,
}

impl AvailabilityEngine {
    pub fn new(
        directory: Arc<dyn BarberDirectory>,
        ledger: Arc<dyn BookingLedger>,
        calendar: BusinessCalendar,
        settings: SlotSettings,
    ) -> Self {
        Self {
            directory,
            ledger,
            calendar,
            settings,
        }
    }

    pub fn calendar(&self) -> &BusinessCalendar {
        &self.calendar
    }

    pub fn settings(&self) -> &SlotSettings {
        &self.settings
    }

    /// Slots a customer can still pick. Past slots of today are removed.
    pub async fn list_available_slots(
        &self,
        barber_id: &str,
        date: &str,
    ) -> Result<SlotListing<AvailableSlot>, SchedulingError> {
        let (barber, date) = self.resolve(barber_id, date).await?;
        let day = self.evaluate_day(&barber, date).await?;
        Ok(day.into_listing(|slot| {
            (!slot.is_past).then_some(AvailableSlot {
                start_time: slot.time,
                is_available: slot.is_available,
            })
        }))
    }

    /// Every slot of the day with its past and booked flags.
    pub async fn slot_status(
        &self,
        barber_id: &str,
        date: &str,
    ) -> Result<SlotListing<SlotStatus>, SchedulingError> {
        let (barber, date) = self.resolve(barber_id, date).await?;
        let day = self.evaluate_day(&barber, date).await?;
        Ok(day.into_listing(|slot| {
            Some(SlotStatus {
                start_time: slot.time,
                is_past: slot.is_past,
                is_available: slot.is_available,
            })
        }))
    }

    /// Point check used before a booking is written.
    ///
    /// Unlike the listings, the closing time itself is outside the window here.
    /// It does not look at the clock; callers reject past times first.
    pub async fn is_slot_available(
        &self,
        barber: &BarberSchedule,
        date: NaiveDate,
        time: TimeOfDay,
    ) -> Result<bool, SchedulingError> {
        if !barber.working_days.works_on(date.weekday()) {
            return Ok(false);
        }

        let window = self.window_for(barber)?;
        if !window.contains(time, false) {
            return Ok(false);
        }

        let booked = self.booked_times(&barber.id, date).await?;
        Ok(!booked.contains(&time))
    }

    /// Look up an active barber and parse the requested day.
    pub async fn resolve(
        &self,
        barber_id: &str,
        date: &str,
    ) -> Result<(BarberSchedule, NaiveDate), SchedulingError> {
        let barber_id = barber_id.trim();
        if barber_id.is_empty() {
            return Err(SchedulingError::MissingBarberId);
        }
        let date = parse_date(date)?;
        let barber = self.active_barber(barber_id).await?;
        Ok((barber, date))
    }

    pub async fn active_barber(&self, barber_id: &str) -> Result<BarberSchedule, SchedulingError> {
        let barber = self
            .directory
            .barber_by_id(barber_id)
            .await?
            .ok_or_else(|| SchedulingError::BarberNotFound(barber_id.to_string()))?;
        if !barber.is_active {
            return Err(SchedulingError::BarberInactive(barber_id.to_string()));
        }
        Ok(barber)
    }

    pub fn window_for(&self, barber: &BarberSchedule) -> Result<WorkingWindow, SchedulingError> {
        match &barber.working_hours {
            Some(hours) => WorkingWindow::parse(&hours.start, &hours.end),
            None => Ok(self.settings.default_window),
        }
    }

    /// Minute of day before which slots count as past, if `date` is today.
    pub fn past_cutoff(&self, date: NaiveDate) -> Option<u32> {
        self.calendar
            .is_today(date)
            .then(|| self.calendar.current_minute_of_day() + self.settings.same_day_buffer_minutes)
    }

    async fn evaluate_day(
        &self,
        barber: &BarberSchedule,
        date: NaiveDate,
    ) -> Result<DayEvaluation, SchedulingError> {
        if !barber.working_days.works_on(date.weekday()) {
            return Ok(DayEvaluation {
                barber_id: barber.id.clone(),
                date,
                slots: Vec::new(),
                message: Some(format!("Barber does not work on {}", weekday_name(date))),
            });
        }

        let window = self.window_for(barber)?;
        let candidates = generate_time_slots(&window, self.settings.interval_minutes)?;
        let booked = self.booked_times(&barber.id, date).await?;
        let cutoff = self.past_cutoff(date);

        let slots = candidates
            .into_iter()
            .map(|time| EvaluatedSlot {
                time,
                is_past: cutoff.is_some_and(|cutoff| time.minutes() < cutoff),
                is_available: !booked.contains(&time),
            })
            .collect::<Vec<_>>();

        debug!(
            barber_id = %barber.id,
            date = %date,
            slots = slots.len(),
            booked = booked.len(),
            "Evaluated barber day"
        );

        Ok(DayEvaluation {
            barber_id: barber.id.clone(),
            date,
            slots,
            message: None,
        })
    }

    async fn booked_times(
        &self,
        barber_id: &str,
        date: NaiveDate,
    ) -> Result<HashSet<TimeOfDay>, SchedulingError> {
        let query = BookingQuery {
            barber_id: barber_id.to_string(),
            range: self.calendar.day_range(date)?,
            statuses: BookingStatus::ACTIVE.to_vec(),
        };
        let bookings = self.ledger.find_bookings(&query).await?;
        // Stored times that do not parse cannot collide with a grid label.
        Ok(bookings
            .iter()
            .filter_map(|booking| TimeOfDay::parse(&booking.time).ok())
            .collect())
    }
}
