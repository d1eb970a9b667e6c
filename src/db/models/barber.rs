//! Barber records and their schedule DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::scheduling::{BarberSchedule, SchedulingError, WorkingDays, WorkingHours};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Barber {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub is_active: i32,
    /// JSON object keyed by weekday name
    pub working_days: String,
    pub work_start: Option<String>,
    pub work_end: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Barber {
    pub fn working_days(&self) -> Result<WorkingDays, SchedulingError> {
        serde_json::from_str(&self.working_days).map_err(|e| {
            SchedulingError::Store(format!("Corrupt working days for barber {}: {}", self.id, e))
        })
    }

    pub fn working_hours(&self) -> Option<WorkingHours> {
        match (&self.work_start, &self.work_end) {
            (Some(start), Some(end)) => Some(WorkingHours {
                start: start.clone(),
                end: end.clone(),
            }),
            _ => None,
        }
    }

    pub fn schedule(&self) -> Result<BarberSchedule, SchedulingError> {
        Ok(BarberSchedule {
            id: self.id.clone(),
            name: self.name.clone(),
            is_active: self.is_active != 0,
            working_days: self.working_days()?,
            working_hours: self.working_hours(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarberResponse {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub is_active: bool,
    pub working_days: WorkingDays,
    pub working_hours: Option<WorkingHours>,
    pub created_at: String,
    pub updated_at: String,
}

impl TryFrom<Barber> for BarberResponse {
    type Error = SchedulingError;

    fn try_from(barber: Barber) -> Result<Self, Self::Error> {
        let working_days = barber.working_days()?;
        let working_hours = barber.working_hours();
        Ok(Self {
            id: barber.id,
            name: barber.name,
            email: barber.email,
            phone: barber.phone,
            bio: barber.bio,
            is_active: barber.is_active != 0,
            working_days,
            working_hours,
            created_at: barber.created_at,
            updated_at: barber.updated_at,
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateBarberRequest {
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    #[serde(default)]
    pub working_days: Option<WorkingDays>,
    pub working_hours: Option<WorkingHours>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Default, Deserialize)]
pub struct UpdateBarberRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub is_active: Option<bool>,
    pub working_days: Option<WorkingDays>,
    pub working_hours: Option<WorkingHours>,
}
