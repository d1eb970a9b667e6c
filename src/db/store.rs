//! SQLite-backed implementation of the scheduling ports plus the plain
//! record writes used by the HTTP handlers.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::models::{
    Barber, Booking, ConfirmationToken, Contact, CreateBarberRequest, CreateContactRequest,
    CreateCustomerRequest, Customer, NewBooking, UpdateBarberRequest,
};
use crate::scheduling::clock::format_timestamp;
use crate::scheduling::{
    BarberDirectory, BarberSchedule, BookedSlot, BookingError, BookingLedger, BookingQuery,
    BookingRepository, BookingStatus, SchedulingError, WorkingDays, WorkingWindow,
};

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

fn now() -> String {
    format_timestamp(Utc::now())
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn list_barbers(&self, active_only: bool) -> Result<Vec<Barber>, sqlx::Error> {
        let sql = if active_only {
            "SELECT * FROM barbers WHERE is_active = 1 ORDER BY name"
        } else {
            "SELECT * FROM barbers ORDER BY name"
        };
        sqlx::query_as::<_, Barber>(sql).fetch_all(&self.pool).await
    }

    pub async fn get_barber(&self, id: &str) -> Result<Option<Barber>, sqlx::Error> {
        sqlx::query_as::<_, Barber>("SELECT * FROM barbers WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn create_barber(&self, req: &CreateBarberRequest) -> Result<Barber, SchedulingError> {
        if let Some(hours) = &req.working_hours {
            WorkingWindow::parse(&hours.start, &hours.end)?;
        }
        let working_days = serde_json::to_string(&req.working_days.unwrap_or_default())
            .map_err(|e| SchedulingError::Store(e.to_string()))?;
        let id = uuid::Uuid::new_v4().to_string();
        let timestamp = now();

        sqlx::query(
            r#"
            INSERT INTO barbers (id, name, email, phone, bio, is_active, working_days, work_start, work_end, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(req.name.trim())
        .bind(&req.email)
        .bind(&req.phone)
        .bind(&req.bio)
        .bind(i32::from(req.is_active.unwrap_or(true)))
        .bind(&working_days)
        .bind(req.working_hours.as_ref().map(|h| h.start.clone()))
        .bind(req.working_hours.as_ref().map(|h| h.end.clone()))
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&self.pool)
        .await?;

        self.get_barber(&id)
            .await?
            .ok_or_else(|| SchedulingError::BarberNotFound(id))
    }

    /// Apply a partial update. `None` when the barber does not exist.
    pub async fn update_barber(
        &self,
        id: &str,
        req: &UpdateBarberRequest,
    ) -> Result<Option<Barber>, SchedulingError> {
        let Some(existing) = self.get_barber(id).await? else {
            return Ok(None);
        };

        let working_days: WorkingDays = match req.working_days {
            Some(days) => days,
            None => existing.working_days()?,
        };
        let (work_start, work_end) = match &req.working_hours {
            Some(hours) => {
                WorkingWindow::parse(&hours.start, &hours.end)?;
                (Some(hours.start.clone()), Some(hours.end.clone()))
            }
            None => (existing.work_start.clone(), existing.work_end.clone()),
        };
        let working_days =
            serde_json::to_string(&working_days).map_err(|e| SchedulingError::Store(e.to_string()))?;

        sqlx::query(
            r#"
            UPDATE barbers
            SET name = ?, email = ?, phone = ?, bio = ?, is_active = ?,
                working_days = ?, work_start = ?, work_end = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(req.name.as_deref().map(str::trim).unwrap_or(&existing.name))
        .bind(req.email.as_ref().or(existing.email.as_ref()))
        .bind(req.phone.as_ref().or(existing.phone.as_ref()))
        .bind(req.bio.as_ref().or(existing.bio.as_ref()))
        .bind(req.is_active.map(i32::from).unwrap_or(existing.is_active))
        .bind(&working_days)
        .bind(work_start)
        .bind(work_end)
        .bind(now())
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(self.get_barber(id).await?)
    }

    pub async fn create_contact(&self, req: &CreateContactRequest) -> Result<Contact, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO contacts (id, name, email, phone, subject, message, status, created_at)
            VALUES (?, ?, ?, ?, ?, ?, 'new', ?)
            "#,
        )
        .bind(&id)
        .bind(req.name.trim())
        .bind(req.email.trim())
        .bind(&req.phone)
        .bind(&req.subject)
        .bind(&req.message)
        .bind(now())
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, Contact>("SELECT * FROM contacts WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await
    }

    pub async fn create_customer(&self, req: &CreateCustomerRequest) -> Result<Customer, sqlx::Error> {
        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, phone, role, created_at)
            VALUES (?, ?, ?, ?, 'customer', ?)
            "#,
        )
        .bind(&id)
        .bind(req.name.trim())
        .bind(req.email.trim().to_lowercase())
        .bind(&req.phone)
        .bind(now())
        .execute(&self.pool)
        .await?;

        sqlx::query_as::<_, Customer>("SELECT * FROM users WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await
    }
}

#[async_trait]
impl BarberDirectory for SqliteStore {
    async fn barber_by_id(&self, id: &str) -> Result<Option<BarberSchedule>, SchedulingError> {
        match self.get_barber(id).await? {
            Some(barber) => Ok(Some(barber.schedule()?)),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl BookingLedger for SqliteStore {
    async fn find_bookings(&self, query: &BookingQuery) -> Result<Vec<BookedSlot>, SchedulingError> {
        if query.statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = vec!["?"; query.statuses.len()].join(", ");
        let sql = format!(
            "SELECT id, time, status FROM bookings \
             WHERE barber_id = ? AND date >= ? AND date <= ? AND status IN ({}) \
             ORDER BY time",
            placeholders
        );

        let mut q = sqlx::query_as::<_, (String, String, String)>(&sql)
            .bind(&query.barber_id)
            .bind(format_timestamp(query.range.start))
            .bind(format_timestamp(query.range.end));
        for status in &query.statuses {
            q = q.bind(status.as_str());
        }

        let rows = q.fetch_all(&self.pool).await?;
        rows.into_iter()
            .map(|(booking_id, time, status)| {
                let status = status.parse().map_err(SchedulingError::Store)?;
                Ok(BookedSlot {
                    booking_id,
                    time,
                    status,
                })
            })
            .collect()
    }
}

#[async_trait]
impl BookingRepository for SqliteStore {
    async fn insert_booking(
        &self,
        booking: &NewBooking,
        confirmation: Option<&ConfirmationToken>,
    ) -> Result<Booking, BookingError> {
        let timestamp = now();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query(
            r#"
            INSERT INTO bookings (
                id, service, barber_id, date, time, customer_name, email, phone,
                user_id, notes, status, full_date_time, created_at, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&booking.id)
        .bind(&booking.service)
        .bind(&booking.barber_id)
        .bind(&booking.date)
        .bind(&booking.time)
        .bind(&booking.customer_name)
        .bind(&booking.email)
        .bind(&booking.phone)
        .bind(&booking.user_id)
        .bind(&booking.notes)
        .bind(booking.status.as_str())
        .bind(&booking.full_date_time)
        .bind(&timestamp)
        .bind(&timestamp)
        .execute(&mut *tx)
        .await;

        match result {
            Ok(_) => {}
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                return Err(BookingError::SlotTaken {
                    date: booking.date.clone(),
                    time: booking.time.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(token) = confirmation {
            sqlx::query(
                "INSERT INTO booking_confirmations (token_hash, booking_id, created_at, expires_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&token.token_hash)
            .bind(&token.booking_id)
            .bind(&token.created_at)
            .bind(&token.expires_at)
            .execute(&mut *tx)
            .await?;
        }

        let inserted = sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
            .bind(&booking.id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(inserted)
    }

    async fn booking_by_id(&self, id: &str) -> Result<Option<Booking>, BookingError> {
        Ok(sqlx::query_as::<_, Booking>("SELECT * FROM bookings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?)
    }

    async fn transition_status(
        &self,
        id: &str,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Option<Booking>, BookingError> {
        let result = sqlx::query("UPDATE bookings SET status = ?, updated_at = ? WHERE id = ? AND status = ?")
            .bind(to.as_str())
            .bind(now())
            .bind(id)
            .bind(from.as_str())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.booking_by_id(id).await
    }

    async fn confirmation_by_hash(&self, token_hash: &str) -> Result<Option<ConfirmationToken>, BookingError> {
        Ok(sqlx::query_as::<_, ConfirmationToken>(
            "SELECT * FROM booking_confirmations WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?)
    }

    async fn delete_confirmation(&self, token_hash: &str) -> Result<(), BookingError> {
        sqlx::query("DELETE FROM booking_confirmations WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
