//! Business-calendar time handling.
//!
//! Every "is this today" and day-boundary computation goes through a
//! [`BusinessCalendar`], which pins the shop's local time to a fixed UTC
//! offset and reads the current instant from an injectable [`Clock`].

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Timelike, Utc, Weekday,
};
use std::sync::Arc;

use super::slots::TimeOfDay;
use super::SchedulingError;

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock frozen at one instant. Used by tests and replay tooling.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Inclusive pair of UTC instants covering one local calendar day
/// (00:00:00.000 to 23:59:59.999 local time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Clone)]
pub struct BusinessCalendar {
    offset: FixedOffset,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for BusinessCalendar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusinessCalendar")
            .field("offset", &self.offset)
            .finish()
    }
}

impl BusinessCalendar {
    pub fn new(utc_offset_minutes: i32, clock: Arc<dyn Clock>) -> Result<Self, SchedulingError> {
        let offset = FixedOffset::east_opt(utc_offset_minutes * 60)
            .ok_or(SchedulingError::InvalidOffset(utc_offset_minutes))?;
        Ok(Self { offset, clock })
    }

    pub fn offset(&self) -> FixedOffset {
        self.offset
    }

    pub fn now_utc(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn now_local(&self) -> DateTime<FixedOffset> {
        self.clock.now().with_timezone(&self.offset)
    }

    pub fn today(&self) -> NaiveDate {
        self.now_local().date_naive()
    }

    pub fn is_today(&self, date: NaiveDate) -> bool {
        self.today() == date
    }

    /// Minutes elapsed since local midnight.
    pub fn current_minute_of_day(&self) -> u32 {
        let now = self.now_local();
        now.hour() * 60 + now.minute()
    }

    pub fn day_range(&self, date: NaiveDate) -> Result<DayRange, SchedulingError> {
        let start = self.local_instant(date, NaiveTime::MIN)?;
        let end = start + Duration::days(1) - Duration::milliseconds(1);
        Ok(DayRange { start, end })
    }

    /// UTC instant of `time` on local calendar day `date`.
    pub fn combine(&self, date: NaiveDate, time: TimeOfDay) -> Result<DateTime<Utc>, SchedulingError> {
        let naive_time = NaiveTime::from_hms_opt(time.hour(), time.minute(), 0)
            .ok_or_else(|| SchedulingError::InvalidTime(time.to_string()))?;
        self.local_instant(date, naive_time)
    }

    fn local_instant(&self, date: NaiveDate, time: NaiveTime) -> Result<DateTime<Utc>, SchedulingError> {
        date.and_time(time)
            .and_local_timezone(self.offset)
            .single()
            .map(|local| local.with_timezone(&Utc))
            .ok_or_else(|| SchedulingError::InvalidDate(date.to_string()))
    }
}

/// Parse a strict `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> Result<NaiveDate, SchedulingError> {
    let value = value.trim();
    if value.len() != 10 {
        return Err(SchedulingError::InvalidDate(value.to_string()));
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| SchedulingError::InvalidDate(value.to_string()))
}

/// English lowercase weekday name, matching the keys of a barber's working days.
pub fn weekday_name(date: NaiveDate) -> &'static str {
    match date.weekday() {
        Weekday::Mon => "monday",
        Weekday::Tue => "tuesday",
        Weekday::Wed => "wednesday",
        Weekday::Thu => "thursday",
        Weekday::Fri => "friday",
        Weekday::Sat => "saturday",
        Weekday::Sun => "sunday",
    }
}

/// Storage format for instants. Fixed width, so stored values compare lexically.
pub fn format_timestamp(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn calendar_at(rfc3339: &str) -> BusinessCalendar {
        let now = DateTime::parse_from_rfc3339(rfc3339).unwrap().with_timezone(&Utc);
        BusinessCalendar::new(420, Arc::new(FixedClock(now))).unwrap()
    }

    #[test]
    fn test_today_follows_business_offset_not_utc() {
        // 18:30 UTC on the 9th is already 01:30 on the 10th in UTC+7
        let calendar = calendar_at("2025-06-09T18:30:00Z");
        assert_eq!(calendar.today(), NaiveDate::from_ymd_opt(2025, 6, 10).unwrap());
        assert_eq!(calendar.current_minute_of_day(), 90);
    }

    #[test]
    fn test_day_range_is_local_midnight_to_last_millisecond() {
        let calendar = calendar_at("2025-06-10T00:00:00Z");
        let range = calendar
            .day_range(NaiveDate::from_ymd_opt(2025, 6, 10).unwrap())
            .unwrap();
        assert_eq!(range.start, Utc.with_ymd_and_hms(2025, 6, 9, 17, 0, 0).unwrap());
        assert_eq!(format_timestamp(range.end), "2025-06-10T16:59:59.999Z");
    }

    #[test]
    fn test_combine_date_and_time() {
        let calendar = calendar_at("2025-06-10T00:00:00Z");
        let instant = calendar
            .combine(
                NaiveDate::from_ymd_opt(2025, 6, 10).unwrap(),
                TimeOfDay::parse("14:30").unwrap(),
            )
            .unwrap();
        assert_eq!(format_timestamp(instant), "2025-06-10T07:30:00.000Z");
    }

    #[test]
    fn test_offset_is_configurable() {
        let now = Utc.with_ymd_and_hms(2025, 6, 9, 18, 30, 0).unwrap();
        let utc = BusinessCalendar::new(0, Arc::new(FixedClock(now))).unwrap();
        assert_eq!(utc.today(), NaiveDate::from_ymd_opt(2025, 6, 9).unwrap());
        assert!(BusinessCalendar::new(24 * 60, Arc::new(SystemClock)).is_err());
    }

    #[test]
    fn test_parse_date_is_strict() {
        assert!(parse_date("2025-06-10").is_ok());
        assert!(parse_date("2025-6-10").is_err());
        assert!(parse_date("10/06/2025").is_err());
        assert!(parse_date("2025-02-30").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn test_weekday_names() {
        assert_eq!(weekday_name(NaiveDate::from_ymd_opt(2025, 6, 10).unwrap()), "tuesday");
        assert_eq!(weekday_name(NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()), "sunday");
    }

    #[test]
    fn test_timestamps_round_trip_through_storage_format() {
        let instant = Utc.with_ymd_and_hms(2025, 6, 10, 7, 30, 0).unwrap();
        assert_eq!(parse_timestamp(&format_timestamp(instant)), Some(instant));
    }
}
