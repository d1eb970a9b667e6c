//! Booking lifecycle: creation with the race-free slot check, emailed
//! confirmation tokens and status transitions.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate};
use dashmap::DashMap;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

use super::availability::AvailabilityEngine;
use super::clock::{format_timestamp, parse_timestamp};
use super::slots::TimeOfDay;
use super::{BookingStatus, SchedulingError};
use crate::api::metrics::record_booking_created;
use crate::config::SchedulingConfig;
use crate::db::{Booking, ConfirmationToken, CreateBookingRequest, NewBooking};

#[derive(Debug, Error)]
pub enum BookingError {
    #[error("{message}")]
    Invalid { field: &'static str, message: String },

    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    #[error("The {time} slot on {date} is not available")]
    SlotTaken { date: String, time: String },

    #[error("Booking not found: {0}")]
    NotFound(String),

    #[error("Confirmation link is invalid")]
    TokenNotFound,

    #[error("Confirmation link has expired")]
    TokenExpired,

    #[error("Cannot change booking status from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },

    #[error("Store error: {0}")]
    Store(String),
}

impl BookingError {
    fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        BookingError::Invalid {
            field,
            message: message.into(),
        }
    }
}

impl From<sqlx::Error> for BookingError {
    fn from(err: sqlx::Error) -> Self {
        BookingError::Store(err.to_string())
    }
}

/// Persistence the booking service needs beyond the availability ports.
#[async_trait]
pub trait BookingRepository: Send + Sync {
    /// Stores the booking and, when given, its confirmation token as one unit:
    /// either both rows land or neither does. Fails with
    /// [`BookingError::SlotTaken`] when an active booking already holds the
    /// same barber, day and time.
    async fn insert_booking(
        &self,
        booking: &NewBooking,
        confirmation: Option<&ConfirmationToken>,
    ) -> Result<Booking, BookingError>;

    async fn booking_by_id(&self, id: &str) -> Result<Option<Booking>, BookingError>;

    /// Compare-and-set on the status column. `None` when the booking is gone
    /// or no longer in `from`.
    async fn transition_status(
        &self,
        id: &str,
        from: BookingStatus,
        to: BookingStatus,
    ) -> Result<Option<Booking>, BookingError>;

    async fn confirmation_by_hash(&self, token_hash: &str) -> Result<Option<ConfirmationToken>, BookingError>;

    async fn delete_confirmation(&self, token_hash: &str) -> Result<(), BookingError>;
}

/// Delivers the confirmation link to the customer.
#[async_trait]
pub trait ConfirmationNotifier: Send + Sync {
    async fn send_confirmation(&self, booking: &Booking, link: &str);
}

/// Writes confirmation links to the log instead of sending mail.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl ConfirmationNotifier for LogNotifier {
    async fn send_confirmation(&self, booking: &Booking, link: &str) {
        info!(
            booking_id = %booking.id,
            email = %booking.email,
            link = %link,
            "Booking confirmation link issued"
        );
    }
}

/// One async mutex per barber and day, so the availability check and the
/// insert that follows it cannot interleave with another booking for the
/// same chair.
#[derive(Clone, Default)]
pub struct SlotLocks {
    inner: Arc<DashMap<(String, NaiveDate), Arc<Mutex<()>>>>,
}

impl SlotLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, barber_id: &str, date: NaiveDate) -> OwnedMutexGuard<()> {
        let lock = self
            .inner
            .entry((barber_id.to_string(), date))
            .or_default()
            .clone();
        lock.lock_owned().await
    }

    /// Forget locks for days before `today`.
    pub fn prune_before(&self, today: NaiveDate) {
        self.inner.retain(|(_, date), _| *date >= today);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

#[derive(Debug, Clone)]
pub struct BookingSettings {
    pub require_confirmation: bool,
    pub confirmation_ttl: Duration,
    pub public_url: String,
}

impl BookingSettings {
    pub fn from_config(config: &SchedulingConfig) -> Self {
        Self {
            require_confirmation: config.require_email_confirmation,
            confirmation_ttl: Duration::hours(config.confirmation_ttl_hours),
            public_url: config.public_url.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct CreatedBooking {
    pub booking: Booking,
    /// Raw token, only present when the booking awaits confirmation.
    pub confirmation_token: Option<String>,
}

pub struct BookingService {
    engine: Arc<AvailabilityEngine>,
    repository: Arc<dyn BookingRepository>,
    notifier: Arc<dyn ConfirmationNotifier>,
    locks: SlotLocks,
    settings: BookingSettings,
}

impl BookingService {
    pub fn new(
        engine: Arc<AvailabilityEngine>,
        repository: Arc<dyn BookingRepository>,
        notifier: Arc<dyn ConfirmationNotifier>,
        settings: BookingSettings,
    ) -> Self {
        Self {
            engine,
            repository,
            notifier,
            locks: SlotLocks::new(),
            settings,
        }
    }

    pub fn engine(&self) -> &Arc<AvailabilityEngine> {
        &self.engine
    }

    pub async fn create_booking(&self, request: CreateBookingRequest) -> Result<CreatedBooking, BookingError> {
        for (field, value) in [
            ("service", &request.service),
            ("customer_name", &request.customer_name),
            ("email", &request.email),
            ("phone", &request.phone),
        ] {
            if value.trim().is_empty() {
                return Err(BookingError::invalid(field, format!("{} is required", field)));
            }
        }

        let (barber, date) = self.engine.resolve(&request.barber_id, &request.date).await?;
        let time = TimeOfDay::parse(request.time.trim())?;

        let calendar = self.engine.calendar();
        let today = calendar.today();
        if date < today {
            return Err(BookingError::invalid("date", "Cannot book a date in the past"));
        }
        if let Some(cutoff) = self.engine.past_cutoff(date) {
            if time.minutes() < cutoff {
                return Err(BookingError::invalid(
                    "time",
                    format!(
                        "Same-day bookings must start at least {} minutes from now",
                        self.engine.settings().same_day_buffer_minutes
                    ),
                ));
            }
        }

        let status = if self.settings.require_confirmation {
            BookingStatus::Pending
        } else {
            BookingStatus::Confirmed
        };
        let new_booking = NewBooking {
            id: uuid::Uuid::new_v4().to_string(),
            service: request.service.trim().to_string(),
            barber_id: barber.id.clone(),
            date: format_timestamp(calendar.day_range(date)?.start),
            time: time.to_string(),
            customer_name: request.customer_name.trim().to_string(),
            email: request.email.trim().to_string(),
            phone: request.phone.trim().to_string(),
            user_id: request.user_id.filter(|id| !id.trim().is_empty()),
            notes: request.notes,
            status,
            full_date_time: format_timestamp(calendar.combine(date, time)?),
        };

        let confirmation = if status == BookingStatus::Pending {
            let token = generate_token();
            let issued_at = calendar.now_utc();
            let record = ConfirmationToken {
                token_hash: hash_token(&token),
                booking_id: new_booking.id.clone(),
                created_at: format_timestamp(issued_at),
                expires_at: format_timestamp(issued_at + self.settings.confirmation_ttl),
            };
            Some((token, record))
        } else {
            None
        };

        self.locks.prune_before(today);
        let booking = {
            let _guard = self.locks.acquire(&barber.id, date).await;
            if !self.engine.is_slot_available(&barber, date, time).await? {
                return Err(BookingError::SlotTaken {
                    date: date.to_string(),
                    time: time.to_string(),
                });
            }
            self.repository
                .insert_booking(&new_booking, confirmation.as_ref().map(|(_, record)| record))
                .await
                .map_err(|err| match err {
                    BookingError::SlotTaken { .. } => BookingError::SlotTaken {
                        date: date.to_string(),
                        time: time.to_string(),
                    },
                    other => other,
                })?
        };

        record_booking_created(status.as_str());
        info!(
            booking_id = %booking.id,
            barber_id = %booking.barber_id,
            date = %date,
            time = %booking.time,
            status = %status,
            "Booking created"
        );

        let confirmation_token = match confirmation {
            Some((token, _)) => {
                let link = format!(
                    "{}/api/bookings/confirm/{}",
                    self.settings.public_url.trim_end_matches('/'),
                    token
                );
                self.notifier.send_confirmation(&booking, &link).await;
                Some(token)
            }
            None => None,
        };

        Ok(CreatedBooking {
            booking,
            confirmation_token,
        })
    }

    /// Redeem a confirmation token. Tokens are single use.
    pub async fn confirm_booking(&self, token: &str) -> Result<Booking, BookingError> {
        let token_hash = hash_token(token.trim());
        let record = self
            .repository
            .confirmation_by_hash(&token_hash)
            .await?
            .ok_or(BookingError::TokenNotFound)?;

        let now = self.engine.calendar().now_utc();
        let expired = parse_timestamp(&record.expires_at).map_or(true, |expires_at| expires_at <= now);
        if expired {
            self.repository.delete_confirmation(&token_hash).await?;
            debug!(booking_id = %record.booking_id, "Discarded expired confirmation token");
            return Err(BookingError::TokenExpired);
        }

        let booking = self
            .repository
            .booking_by_id(&record.booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(record.booking_id.clone()))?;
        let current = booking.status().map_err(BookingError::Store)?;

        let confirmed = match current {
            BookingStatus::Pending => self
                .repository
                .transition_status(&booking.id, BookingStatus::Pending, BookingStatus::Confirmed)
                .await?
                .ok_or(BookingError::InvalidTransition {
                    from: current,
                    to: BookingStatus::Confirmed,
                })?,
            BookingStatus::Confirmed => booking,
            other => {
                self.repository.delete_confirmation(&token_hash).await?;
                return Err(BookingError::InvalidTransition {
                    from: other,
                    to: BookingStatus::Confirmed,
                });
            }
        };

        self.repository.delete_confirmation(&token_hash).await?;
        info!(booking_id = %confirmed.id, "Booking confirmed by customer");
        Ok(confirmed)
    }

    pub async fn update_status(&self, booking_id: &str, status: &str) -> Result<Booking, BookingError> {
        let next: BookingStatus = status
            .trim()
            .parse()
            .map_err(|message: String| BookingError::invalid("status", message))?;

        let booking = self
            .repository
            .booking_by_id(booking_id)
            .await?
            .ok_or_else(|| BookingError::NotFound(booking_id.to_string()))?;
        let current = booking.status().map_err(BookingError::Store)?;

        if !current.can_transition_to(next) {
            return Err(BookingError::InvalidTransition { from: current, to: next });
        }

        match self.repository.transition_status(booking_id, current, next).await? {
            Some(updated) => {
                info!(booking_id = %booking_id, from = %current, to = %next, "Booking status changed");
                Ok(updated)
            }
            None => {
                warn!(booking_id = %booking_id, "Booking status changed concurrently");
                Err(BookingError::InvalidTransition { from: current, to: next })
            }
        }
    }
}

/// 32 random bytes, hex encoded.
pub fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}

/// Tokens are stored as SHA-256 hex digests only.
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{connect_in_memory, CreateBarberRequest, SqliteStore};
    use crate::scheduling::availability::tests::calendar_at;
    use crate::scheduling::availability::SlotSettings;
    use crate::scheduling::WorkingHours;
    use parking_lot::Mutex as SyncMutex;
    use tokio_test::assert_ok;

    #[derive(Default)]
    struct RecordingNotifier {
        links: SyncMutex<Vec<String>>,
    }

    #[async_trait]
    impl ConfirmationNotifier for RecordingNotifier {
        async fn send_confirmation(&self, _booking: &Booking, link: &str) {
            self.links.lock().push(link.to_string());
        }
    }

    struct Harness {
        service: Arc<BookingService>,
        store: Arc<SqliteStore>,
        notifier: Arc<RecordingNotifier>,
        barber_id: String,
    }

    async fn harness_at(now: &str, require_confirmation: bool) -> Harness {
        let pool = connect_in_memory().await.unwrap();
        let store = Arc::new(SqliteStore::new(pool));
        let barber = store
            .create_barber(&CreateBarberRequest {
                name: "Marco".to_string(),
                email: None,
                phone: None,
                bio: None,
                working_days: None,
                working_hours: Some(WorkingHours {
                    start: "09:00".to_string(),
                    end: "19:00".to_string(),
                }),
                is_active: None,
            })
            .await
            .unwrap();

        let engine = Arc::new(AvailabilityEngine::new(
            store.clone(),
            store.clone(),
            calendar_at(now),
            SlotSettings::default(),
        ));
        let notifier = Arc::new(RecordingNotifier::default());
        let service = Arc::new(BookingService::new(
            engine,
            store.clone(),
            notifier.clone(),
            BookingSettings {
                require_confirmation,
                confirmation_ttl: Duration::hours(24),
                public_url: "https://shop.example/".to_string(),
            },
        ));
        Harness {
            service,
            store,
            notifier,
            barber_id: barber.id,
        }
    }

    fn request(barber_id: &str, date: &str, time: &str) -> CreateBookingRequest {
        CreateBookingRequest {
            service: "Classic cut".to_string(),
            barber_id: barber_id.to_string(),
            date: date.to_string(),
            time: time.to_string(),
            customer_name: "Linh".to_string(),
            email: "linh@example.com".to_string(),
            phone: "+84901234567".to_string(),
            user_id: None,
            notes: None,
        }
    }

    const MONDAY_MORNING: &str = "2025-06-09T10:00:00+07:00";

    #[tokio::test]
    async fn test_create_pending_booking_issues_token() {
        let h = harness_at(MONDAY_MORNING, true).await;

        let created = h
            .service
            .create_booking(request(&h.barber_id, "2025-06-10", "14:00"))
            .await
            .unwrap();

        assert_eq!(created.booking.status, "pending");
        assert_eq!(created.booking.date, "2025-06-09T17:00:00.000Z");
        assert_eq!(created.booking.full_date_time, "2025-06-10T07:00:00.000Z");
        let token = created.confirmation_token.unwrap();
        assert_eq!(token.len(), 64);

        let links = h.notifier.links.lock().clone();
        assert_eq!(links, vec![format!("https://shop.example/api/bookings/confirm/{}", token)]);

        // only the digest is stored
        let stored = h.store.confirmation_by_hash(&hash_token(&token)).await.unwrap();
        assert!(stored.is_some());
        assert!(h.store.confirmation_by_hash(&token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_without_confirmation_is_confirmed() {
        let h = harness_at(MONDAY_MORNING, false).await;
        let created = h
            .service
            .create_booking(request(&h.barber_id, "2025-06-10", "14:00"))
            .await
            .unwrap();
        assert_eq!(created.booking.status, "confirmed");
        assert!(created.confirmation_token.is_none());
        assert!(h.notifier.links.lock().is_empty());
    }

    #[tokio::test]
    async fn test_failed_token_write_leaves_slot_free() {
        let h = harness_at(MONDAY_MORNING, true).await;
        sqlx::query(
            "CREATE TRIGGER reject_confirmations BEFORE INSERT ON booking_confirmations \
             BEGIN SELECT RAISE(ABORT, 'confirmation store offline'); END",
        )
        .execute(h.store.pool())
        .await
        .unwrap();

        let result = h
            .service
            .create_booking(request(&h.barber_id, "2025-06-10", "14:00"))
            .await;
        assert!(matches!(result, Err(BookingError::Store(_))));
        assert!(h.notifier.links.lock().is_empty());

        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM bookings")
            .fetch_one(h.store.pool())
            .await
            .unwrap();
        assert_eq!(rows, 0);

        let listing = h
            .service
            .engine()
            .list_available_slots(&h.barber_id, "2025-06-10")
            .await
            .unwrap();
        assert!(listing.slots.iter().all(|slot| slot.is_available));

        sqlx::query("DROP TRIGGER reject_confirmations")
            .execute(h.store.pool())
            .await
            .unwrap();
        let retried = assert_ok!(
            h.service
                .create_booking(request(&h.barber_id, "2025-06-10", "14:00"))
                .await
        );
        assert!(retried.confirmation_token.is_some());
    }

    #[tokio::test]
    async fn test_booked_slot_is_refused_and_listed_unavailable() {
        let h = harness_at(MONDAY_MORNING, true).await;
        h.service
            .create_booking(request(&h.barber_id, "2025-06-10", "14:00"))
            .await
            .unwrap();

        let second = h
            .service
            .create_booking(request(&h.barber_id, "2025-06-10", "14:00"))
            .await;
        assert!(matches!(second, Err(BookingError::SlotTaken { .. })));

        let listing = h
            .service
            .engine()
            .list_available_slots(&h.barber_id, "2025-06-10")
            .await
            .unwrap();
        let taken: Vec<String> = listing
            .slots
            .iter()
            .filter(|s| !s.is_available)
            .map(|s| s.start_time.to_string())
            .collect();
        assert_eq!(taken, vec!["14:00"]);
    }

    #[tokio::test]
    async fn test_concurrent_requests_for_one_slot_book_once() {
        let h = harness_at(MONDAY_MORNING, true).await;

        let mut handles = Vec::new();
        for _ in 0..5 {
            let service = h.service.clone();
            let req = request(&h.barber_id, "2025-06-10", "15:30");
            handles.push(tokio::spawn(async move { service.create_booking(req).await }));
        }

        let mut ok = 0;
        let mut taken = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => ok += 1,
                Err(BookingError::SlotTaken { .. }) => taken += 1,
                Err(other) => panic!("unexpected error: {}", other),
            }
        }
        assert_eq!(ok, 1);
        assert_eq!(taken, 4);
    }

    #[tokio::test]
    async fn test_closing_time_is_not_bookable() {
        let h = harness_at(MONDAY_MORNING, true).await;
        let result = h
            .service
            .create_booking(request(&h.barber_id, "2025-06-10", "19:00"))
            .await;
        assert!(matches!(result, Err(BookingError::SlotTaken { .. })));
    }

    #[tokio::test]
    async fn test_past_and_buffered_times_are_rejected() {
        // Tuesday 2025-06-10 14:05 local
        let h = harness_at("2025-06-10T14:05:00+07:00", true).await;

        let yesterday = h
            .service
            .create_booking(request(&h.barber_id, "2025-06-09", "15:00"))
            .await;
        assert!(matches!(yesterday, Err(BookingError::Invalid { field: "date", .. })));

        let too_soon = h
            .service
            .create_booking(request(&h.barber_id, "2025-06-10", "14:30"))
            .await;
        assert!(matches!(too_soon, Err(BookingError::Invalid { field: "time", .. })));

        assert!(h
            .service
            .create_booking(request(&h.barber_id, "2025-06-10", "15:00"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_request_errors() {
        let h = harness_at(MONDAY_MORNING, true).await;

        let mut missing_service = request(&h.barber_id, "2025-06-10", "10:00");
        missing_service.service = "  ".to_string();
        assert!(matches!(
            h.service.create_booking(missing_service).await,
            Err(BookingError::Invalid { field: "service", .. })
        ));

        assert!(matches!(
            h.service.create_booking(request("", "2025-06-10", "10:00")).await,
            Err(BookingError::Scheduling(SchedulingError::MissingBarberId))
        ));
        assert!(matches!(
            h.service.create_booking(request("ghost", "2025-06-10", "10:00")).await,
            Err(BookingError::Scheduling(SchedulingError::BarberNotFound(_)))
        ));
        assert!(matches!(
            h.service.create_booking(request(&h.barber_id, "2025/06/10", "10:00")).await,
            Err(BookingError::Scheduling(SchedulingError::InvalidDate(_)))
        ));
        assert!(matches!(
            h.service.create_booking(request(&h.barber_id, "2025-06-10", "10am")).await,
            Err(BookingError::Scheduling(SchedulingError::InvalidTime(_)))
        ));
    }

    #[tokio::test]
    async fn test_confirm_token_once() {
        let h = harness_at(MONDAY_MORNING, true).await;
        let created = h
            .service
            .create_booking(request(&h.barber_id, "2025-06-10", "11:00"))
            .await
            .unwrap();
        let token = created.confirmation_token.unwrap();

        let confirmed = h.service.confirm_booking(&token).await.unwrap();
        assert_eq!(confirmed.status, "confirmed");

        assert!(matches!(
            h.service.confirm_booking(&token).await,
            Err(BookingError::TokenNotFound)
        ));
        assert!(matches!(
            h.service.confirm_booking("not-a-token").await,
            Err(BookingError::TokenNotFound)
        ));
    }

    #[tokio::test]
    async fn test_expired_token_is_deleted_on_discovery() {
        let h = harness_at(MONDAY_MORNING, true).await;
        let created = h
            .service
            .create_booking(request(&h.barber_id, "2025-06-10", "11:00"))
            .await
            .unwrap();
        let token = created.confirmation_token.unwrap();

        // Same store, clock a day and a minute later
        let later = BookingService::new(
            Arc::new(AvailabilityEngine::new(
                h.store.clone(),
                h.store.clone(),
                calendar_at("2025-06-10T10:01:00+07:00"),
                SlotSettings::default(),
            )),
            h.store.clone(),
            h.notifier.clone(),
            BookingSettings {
                require_confirmation: true,
                confirmation_ttl: Duration::hours(24),
                public_url: String::new(),
            },
        );

        assert!(matches!(
            later.confirm_booking(&token).await,
            Err(BookingError::TokenExpired)
        ));
        assert!(h
            .store
            .confirmation_by_hash(&hash_token(&token))
            .await
            .unwrap()
            .is_none());
        let booking = h.store.booking_by_id(&created.booking.id).await.unwrap().unwrap();
        assert_eq!(booking.status, "pending");
    }

    #[tokio::test]
    async fn test_status_transitions() {
        let h = harness_at(MONDAY_MORNING, true).await;
        let id = h
            .service
            .create_booking(request(&h.barber_id, "2025-06-10", "12:00"))
            .await
            .unwrap()
            .booking
            .id;

        assert!(matches!(
            h.service.update_status(&id, "done").await,
            Err(BookingError::Invalid { field: "status", .. })
        ));
        assert!(matches!(
            h.service.update_status(&id, "completed").await,
            Err(BookingError::InvalidTransition { .. })
        ));
        let confirmed = assert_ok!(h.service.update_status(&id, "confirmed").await);
        assert_eq!(confirmed.status, "confirmed");
        let completed = assert_ok!(h.service.update_status(&id, "completed").await);
        assert_eq!(completed.status, "completed");
        assert!(matches!(
            h.service.update_status(&id, "cancelled").await,
            Err(BookingError::InvalidTransition {
                from: BookingStatus::Completed,
                to: BookingStatus::Cancelled
            })
        ));
        assert!(matches!(
            h.service.update_status("missing", "confirmed").await,
            Err(BookingError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_cancelled_booking_frees_its_slot() {
        let h = harness_at(MONDAY_MORNING, true).await;
        let first = h
            .service
            .create_booking(request(&h.barber_id, "2025-06-10", "16:00"))
            .await
            .unwrap();
        h.service.update_status(&first.booking.id, "cancelled").await.unwrap();

        let again = h
            .service
            .create_booking(request(&h.barber_id, "2025-06-10", "16:00"))
            .await
            .unwrap();
        assert_ne!(again.booking.id, first.booking.id);
    }

    #[tokio::test]
    async fn test_slot_locks_prune_past_days() {
        let locks = SlotLocks::new();
        let monday = NaiveDate::from_ymd_opt(2025, 6, 9).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2025, 6, 10).unwrap();
        drop(locks.acquire("b1", monday).await);
        drop(locks.acquire("b1", tuesday).await);
        assert_eq!(locks.len(), 2);

        locks.prune_before(tuesday);
        assert_eq!(locks.len(), 1);
    }

    #[test]
    fn test_token_hashing() {
        let token = generate_token();
        assert_eq!(token.len(), 64);
        assert_ne!(token, generate_token());
        assert_eq!(hash_token("abc"), hash_token("abc"));
        assert_ne!(hash_token(&token), token);
    }
}
