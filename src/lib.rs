pub mod api;
pub mod client;
pub mod config;
pub mod db;
pub mod engine;
pub mod realtime;
pub mod scheduling;
pub mod startup;

pub use db::DbPool;

use config::Config;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::db::SqliteStore;
use crate::realtime::RealtimeHub;
use crate::scheduling::{
    AvailabilityEngine, BookingService, BookingSettings, BusinessCalendar, Clock, LogNotifier,
    SchedulingError, SlotSettings, SystemClock,
};

pub struct AppState {
    pub config: Config,
    pub db: DbPool,
    pub store: Arc<SqliteStore>,
    pub engine: Arc<AvailabilityEngine>,
    pub bookings: Arc<BookingService>,
    pub hub: Arc<RealtimeHub>,
    pub metrics_handle: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(config: Config, db: DbPool) -> Result<Self, SchedulingError> {
        Self::with_clock(config, db, Arc::new(SystemClock))
    }

    /// Build the state against a specific clock; tests pin "now" this way.
    pub fn with_clock(config: Config, db: DbPool, clock: Arc<dyn Clock>) -> Result<Self, SchedulingError> {
        let calendar = BusinessCalendar::new(config.scheduling.utc_offset_minutes, clock)?;
        let settings = SlotSettings::from_config(&config.scheduling)?;
        let store = Arc::new(SqliteStore::new(db.clone()));

        let engine = Arc::new(AvailabilityEngine::new(
            store.clone(),
            store.clone(),
            calendar,
            settings,
        ));
        let bookings = Arc::new(BookingService::new(
            engine.clone(),
            store.clone(),
            Arc::new(LogNotifier),
            BookingSettings::from_config(&config.scheduling),
        ));
        let hub = Arc::new(RealtimeHub::new(config.realtime.channel_capacity));

        Ok(Self {
            config,
            db,
            store,
            engine,
            bookings,
            hub,
            metrics_handle: None,
        })
    }

    /// Set the Prometheus metrics handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics_handle = Some(handle);
        self
    }
}
